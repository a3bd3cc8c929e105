//! Placement and compatibility attributes for allocation requests.

use std::fmt;

const ON_HOST: u32 = 1 << 0;
const NIC_COMPATIBLE: u32 = 1 << 1;
const GPU_COMPATIBLE: u32 = 1 << 2;

/// Describes where memory from a request may legally be used.
///
/// Plain value; combine two requests' constraints with [`merge`](Self::merge).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllocatorAttributes {
    bits: u32,
}

impl AllocatorAttributes {
    /// Attributes with every flag cleared.
    pub const fn new() -> Self {
        Self { bits: 0 }
    }

    /// Rebuild attributes from their packed form. Unknown bits are dropped.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            bits: bits & (ON_HOST | NIC_COMPATIBLE | GPU_COMPATIBLE),
        }
    }

    /// Packed representation.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    const fn with(self, flag: u32, value: bool) -> Self {
        if value {
            Self { bits: self.bits | flag }
        } else {
            Self { bits: self.bits & !flag }
        }
    }

    /// Builder pattern: memory must be addressable from the host.
    pub const fn with_on_host(self, value: bool) -> Self {
        self.with(ON_HOST, value)
    }

    /// Builder pattern: memory must be usable by the network interface.
    pub const fn with_nic_compatible(self, value: bool) -> Self {
        self.with(NIC_COMPATIBLE, value)
    }

    /// Builder pattern: memory must be usable by a GPU.
    pub const fn with_gpu_compatible(self, value: bool) -> Self {
        self.with(GPU_COMPATIBLE, value)
    }

    pub const fn on_host(&self) -> bool {
        self.bits & ON_HOST != 0
    }

    pub const fn nic_compatible(&self) -> bool {
        self.bits & NIC_COMPATIBLE != 0
    }

    pub const fn gpu_compatible(&self) -> bool {
        self.bits & GPU_COMPATIBLE != 0
    }

    /// Union of both sets of constraints.
    pub const fn merge(&self, other: &Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// Single-line rendering used in logs.
    pub fn debug_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AllocatorAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AllocatorAttributes(on_host={} nic_compatible={} gpu_compatible={})",
            u8::from(self.on_host()),
            u8::from(self.nic_compatible()),
            u8::from(self.gpu_compatible())
        )
    }
}
