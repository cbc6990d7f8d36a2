//! Wire protocol for the Nexus servers: frame codec, session cipher, bit-level
//! reader/writer, opcodes, and the message structs exchanged with the client.
//!
//! Frames are `length:varint` `opcode:u16le` `payload`. After the world
//! handshake every frame travels sealed inside [`Opcode::Encrypted`]: the
//! outer payload is the cipher stream applied to `inner_opcode:u16le ++
//! inner_payload`.

pub mod bits;
pub mod codec;
pub mod crypt;
pub mod opcode;
pub mod packets;
pub mod var_int;

use thiserror::Error;

pub use crate::bits::{BitReader, BitWriter};
pub use crate::codec::{FrameDecoder, FrameEncoder, PacketFrame};
pub use crate::crypt::SessionCipher;
pub use crate::opcode::Opcode;
pub use crate::var_int::VarInt;

/// Hard upper bound on a single frame's declared length, in bytes.
pub const MAX_FRAME_SIZE: usize = 8192;

/// Errors produced while framing, unsealing, or decoding packets.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),
    #[error("frame length {len} exceeds the {max} byte limit")]
    TruncatedOrOversized { len: usize, max: usize },
    #[error("unexpected end of payload")]
    UnexpectedEof,
    #[error("malformed string payload")]
    MalformedString,
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),
    #[error("opcode {0:?} is not valid in the current connection state")]
    OutOfState(Opcode),
    #[error("plaintext frame received after the session cipher was armed")]
    UnexpectedPlaintext,
    #[error("encrypted wrapper nested inside an encrypted frame")]
    NestedEncryption,
}

/// A wire message with a fixed opcode and a bit-stream payload.
pub trait Message: Sized {
    const OPCODE: Opcode;

    fn encode_payload(&self, w: &mut BitWriter);

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError>;

    /// Serializes the payload (without framing).
    fn to_payload(&self) -> Vec<u8> {
        let mut w = BitWriter::new();
        self.encode_payload(&mut w);
        w.finish()
    }

    /// Parses a payload, requiring every byte to be consumed.
    fn from_payload(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = BitReader::new(payload);
        let msg = Self::decode_payload(&mut r)?;
        if r.remaining_bits() >= 8 {
            return Err(ProtocolError::MalformedFrame("trailing payload bytes"));
        }
        Ok(msg)
    }
}
