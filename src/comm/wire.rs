//! Fixed little-endian wire records for ghost attribute exchange.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;

/// A `(global_id, value)` pair carried between ranks.
///
/// All fields are stored pre-LE with `.to_le()` and decoded with `.from_le()`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WireVertexDatum {
    pub gid_le: u64,
    pub value_le: u64,
}

const_assert_eq!(std::mem::size_of::<WireVertexDatum>(), 16);

impl WireVertexDatum {
    pub fn new(gid: u64, value: u64) -> Self {
        Self {
            gid_le: gid.to_le(),
            value_le: value.to_le(),
        }
    }

    #[inline]
    pub fn gid(&self) -> u64 {
        u64::from_le(self.gid_le)
    }

    #[inline]
    pub fn value(&self) -> u64 {
        u64::from_le(self.value_le)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_what_it_encodes() {
        let d = WireVertexDatum::new(0x0102_0304_0506_0708, 42);
        assert_eq!(d.gid(), 0x0102_0304_0506_0708);
        assert_eq!(d.value(), 42);
        let bytes: &[u8] = bytemuck::bytes_of(&d);
        assert_eq!(bytes[0], 0x08);
        assert_eq!(bytes[8], 42);
    }
}
