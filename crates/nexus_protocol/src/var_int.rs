use std::io::Read;

use byteorder::ReadBytesExt;
use thiserror::Error;

/// A `u32` encoded with variable length, used for frame length prefixes.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct VarInt(pub u32);

impl VarInt {
    /// The maximum number of bytes a varint occupies on the wire.
    pub const MAX_SIZE: usize = 5;

    /// Returns the exact number of bytes this varint writes.
    pub fn written_size(self) -> usize {
        match self.0 {
            0 => 1,
            n => (31 - n.leading_zeros() as usize) / 7 + 1,
        }
    }

    /// Decodes from a reader, distinguishing "need more bytes" from
    /// "impossible value" so the frame decoder can retain short reads.
    pub fn decode_partial(mut r: impl Read) -> Result<u32, VarIntDecodeError> {
        let mut val = 0u32;
        for i in 0..Self::MAX_SIZE {
            let byte = r.read_u8().map_err(|_| VarIntDecodeError::Incomplete)?;
            val |= u32::from(byte & 0b0111_1111) << (i * 7);
            if byte & 0b1000_0000 == 0 {
                if i == Self::MAX_SIZE - 1 && byte > 0b0000_1111 {
                    return Err(VarIntDecodeError::TooLarge);
                }
                return Ok(val);
            }
        }
        Err(VarIntDecodeError::TooLarge)
    }

    pub fn encode(self, buf: &mut impl Extend<u8>) {
        let mut n = self.0;
        loop {
            let byte = (n & 0b0111_1111) as u8;
            n >>= 7;
            if n == 0 {
                buf.extend([byte]);
                return;
            }
            buf.extend([byte | 0b1000_0000]);
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum VarIntDecodeError {
    #[error("incomplete varint")]
    Incomplete,
    #[error("varint is too large")]
    TooLarge,
}

impl From<u32> for VarInt {
    fn from(n: u32) -> Self {
        VarInt(n)
    }
}

impl From<VarInt> for u32 {
    fn from(n: VarInt) -> Self {
        n.0
    }
}
