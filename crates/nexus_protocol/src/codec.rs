//! Frame codec: length-prefixed frames over an append-only byte buffer, with
//! the session cipher applied to sealed frames once the handshake completes.

use bytes::{Buf, BufMut, BytesMut};

use crate::var_int::VarIntDecodeError;
use crate::{Message, Opcode, ProtocolError, SessionCipher, VarInt, MAX_FRAME_SIZE};

/// One decoded frame: the (possibly unsealed) opcode and its payload.
#[derive(Debug)]
pub struct PacketFrame {
    /// Raw opcode value. Unknown values are preserved so the connection can
    /// apply its permissive unknown-opcode policy.
    pub opcode: u16,
    pub body: BytesMut,
}

impl PacketFrame {
    /// Decodes the body as message `M`, checking the opcode matches.
    pub fn decode<M: Message>(&self) -> Result<M, ProtocolError> {
        if self.opcode != M::OPCODE.to_u16() {
            return Err(ProtocolError::MalformedFrame("opcode mismatch"));
        }
        M::from_payload(&self.body)
    }
}

#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    cipher: Option<SessionCipher>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends received bytes to the internal buffer.
    pub fn queue_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pops the next complete frame, leaving any partial frame buffered for
    /// the next read. Sealed frames are decrypted and unwrapped one level.
    pub fn try_next_frame(&mut self) -> Result<Option<PacketFrame>, ProtocolError> {
        let r = &self.buf[..];

        let frame_len = match VarInt::decode_partial(r) {
            Ok(len) => len as usize,
            Err(VarIntDecodeError::Incomplete) => return Ok(None),
            Err(VarIntDecodeError::TooLarge) => {
                return Err(ProtocolError::MalformedFrame("impossible length prefix"))
            }
        };

        if frame_len < 2 {
            return Err(ProtocolError::MalformedFrame("length shorter than an opcode"));
        }
        if frame_len > MAX_FRAME_SIZE {
            return Err(ProtocolError::TruncatedOrOversized {
                len: frame_len,
                max: MAX_FRAME_SIZE,
            });
        }

        let len_len = VarInt(frame_len as u32).written_size();
        if self.buf.len() - len_len < frame_len {
            // Not enough data arrived yet.
            return Ok(None);
        }

        self.buf.advance(len_len);
        let mut body = self.buf.split_to(frame_len);
        let opcode = body.get_u16_le();

        if opcode == Opcode::Encrypted.to_u16() {
            let Some(cipher) = &mut self.cipher else {
                return Err(ProtocolError::MalformedFrame(
                    "sealed frame before the cipher was armed",
                ));
            };
            cipher.apply(&mut body);
            if body.len() < 2 {
                return Err(ProtocolError::UnexpectedEof);
            }
            let inner = body.get_u16_le();
            if inner == Opcode::Encrypted.to_u16() {
                return Err(ProtocolError::NestedEncryption);
            }
            return Ok(Some(PacketFrame { opcode: inner, body }));
        }

        if self.cipher.is_some() {
            return Err(ProtocolError::UnexpectedPlaintext);
        }

        Ok(Some(PacketFrame { opcode, body }))
    }

    /// Arms the session cipher. All frames from here on must arrive sealed.
    ///
    /// # Panics
    ///
    /// Panics if the cipher is already armed.
    pub fn enable_encryption(&mut self, cipher: SessionCipher) {
        assert!(self.cipher.is_none(), "cipher is already armed");
        self.cipher = Some(cipher);
    }
}

#[derive(Default)]
pub struct FrameEncoder {
    buf: BytesMut,
    cipher: Option<SessionCipher>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one frame. Once the cipher is armed the frame is sealed inside
    /// an [`Opcode::Encrypted`] wrapper.
    pub fn append_frame(&mut self, opcode: Opcode, payload: &[u8]) -> Result<(), ProtocolError> {
        self.append_raw(opcode.to_u16(), payload)
    }

    /// Appends a frame with an arbitrary opcode value, including ones this
    /// build does not know. Packet-capture replay tooling uses this.
    pub fn append_raw(&mut self, opcode: u16, payload: &[u8]) -> Result<(), ProtocolError> {
        match &mut self.cipher {
            Some(cipher) => {
                let mut inner = Vec::with_capacity(payload.len() + 2);
                inner.extend_from_slice(&opcode.to_le_bytes());
                inner.extend_from_slice(payload);
                if inner.len() + 2 > MAX_FRAME_SIZE {
                    return Err(ProtocolError::TruncatedOrOversized {
                        len: inner.len() + 2,
                        max: MAX_FRAME_SIZE,
                    });
                }
                cipher.apply(&mut inner);
                Self::raw_frame(&mut self.buf, Opcode::Encrypted.to_u16(), &inner);
            }
            None => {
                if payload.len() + 2 > MAX_FRAME_SIZE {
                    return Err(ProtocolError::TruncatedOrOversized {
                        len: payload.len() + 2,
                        max: MAX_FRAME_SIZE,
                    });
                }
                Self::raw_frame(&mut self.buf, opcode, payload);
            }
        }
        Ok(())
    }

    pub fn append_message<M: Message>(&mut self, msg: &M) -> Result<(), ProtocolError> {
        self.append_frame(M::OPCODE, &msg.to_payload())
    }

    /// Takes all frames written so far.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }

    /// Arms the session cipher. All frames from here on are sealed.
    ///
    /// # Panics
    ///
    /// Panics if the cipher is already armed.
    pub fn enable_encryption(&mut self, cipher: SessionCipher) {
        assert!(self.cipher.is_none(), "cipher is already armed");
        self.cipher = Some(cipher);
    }

    fn raw_frame(buf: &mut BytesMut, opcode: u16, payload: &[u8]) {
        VarInt(payload.len() as u32 + 2).encode(buf);
        buf.put_u16_le(opcode);
        buf.extend_from_slice(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [7; 16];

    #[test]
    fn frame_round_trip() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(Opcode::ClientKeepalive, &[1, 2, 3, 4]).unwrap();
        enc.append_frame(Opcode::ClientChat, b"hello").unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(&bytes);

        let first = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(first.opcode, Opcode::ClientKeepalive.to_u16());
        assert_eq!(&first.body[..], &[1, 2, 3, 4]);

        let second = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(second.opcode, Opcode::ClientChat.to_u16());
        assert_eq!(&second.body[..], b"hello");

        assert!(dec.try_next_frame().unwrap().is_none());
    }

    #[test]
    fn partial_frames_are_retained() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(Opcode::ClientChat, &[9; 100]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        for chunk in bytes.chunks(7) {
            dec.queue_bytes(chunk);
        }
        // Everything queued: exactly one frame comes out.
        let frame = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(frame.body.len(), 100);

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(&bytes[..bytes.len() / 2]);
        assert!(dec.try_next_frame().unwrap().is_none());
        dec.queue_bytes(&bytes[bytes.len() / 2..]);
        assert!(dec.try_next_frame().unwrap().is_some());
    }

    #[test]
    fn oversized_frame_rejected_on_decode() {
        let mut raw = BytesMut::new();
        VarInt(MAX_FRAME_SIZE as u32 + 1).encode(&mut raw);
        raw.put_u16_le(Opcode::ClientChat.to_u16());

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(&raw);
        assert!(matches!(
            dec.try_next_frame(),
            Err(ProtocolError::TruncatedOrOversized { .. })
        ));
    }

    #[test]
    fn oversized_frame_rejected_on_encode() {
        let mut enc = FrameEncoder::new();
        assert!(matches!(
            enc.append_frame(Opcode::ClientChat, &[0; MAX_FRAME_SIZE]),
            Err(ProtocolError::TruncatedOrOversized { .. })
        ));
    }

    #[test]
    fn sealed_round_trip() {
        let mut enc = FrameEncoder::new();
        enc.enable_encryption(SessionCipher::new(&KEY));
        enc.append_frame(Opcode::ClientChat, b"sealed words").unwrap();
        enc.append_frame(Opcode::ClientKeepalive, &[0xaa]).unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        dec.enable_encryption(SessionCipher::new(&KEY));
        dec.queue_bytes(&bytes);

        let first = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(first.opcode, Opcode::ClientChat.to_u16());
        assert_eq!(&first.body[..], b"sealed words");

        let second = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(second.opcode, Opcode::ClientKeepalive.to_u16());
        assert_eq!(&second.body[..], &[0xaa]);
    }

    #[test]
    fn plaintext_after_arming_is_rejected() {
        let mut enc = FrameEncoder::new();
        enc.append_frame(Opcode::ClientChat, b"plain").unwrap();
        let bytes = enc.take();

        let mut dec = FrameDecoder::new();
        dec.enable_encryption(SessionCipher::new(&KEY));
        dec.queue_bytes(&bytes);
        assert!(matches!(
            dec.try_next_frame(),
            Err(ProtocolError::UnexpectedPlaintext)
        ));
    }

    #[test]
    fn unknown_opcodes_pass_through() {
        let mut raw = BytesMut::new();
        VarInt(2 + 3).encode(&mut raw);
        raw.put_u16_le(0x0269);
        raw.extend_from_slice(&[1, 2, 3]);

        let mut dec = FrameDecoder::new();
        dec.queue_bytes(&raw);
        let frame = dec.try_next_frame().unwrap().unwrap();
        assert_eq!(frame.opcode, 0x0269);
        assert!(Opcode::from_u16(frame.opcode).is_none());
    }
}
