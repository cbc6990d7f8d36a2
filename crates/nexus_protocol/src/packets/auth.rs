use crate::{BitReader, BitWriter, Message, Opcode, ProtocolError};

/// First packet on the auth port: build number, account email, and the SRP6
/// client public key with its proof.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClientHelloAuth {
    pub build: u32,
    pub email: String,
    pub a_pub: Vec<u8>,
    pub m1: [u8; 32],
}

impl Message for ClientHelloAuth {
    const OPCODE: Opcode = Opcode::ClientHelloAuth;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.build), 32);
        w.packed_wide_string(&self.email);
        w.uint(self.a_pub.len() as u64, 16);
        w.bytes(&self.a_pub);
        w.bytes(&self.m1);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let build = r.uint(32)? as u32;
        let email = r.packed_wide_string()?;
        let a_len = r.uint(16)? as usize;
        let a_pub = r.bytes(a_len)?;
        let mut m1 = [0u8; 32];
        m1.copy_from_slice(&r.bytes(32)?);
        Ok(Self { build, email, a_pub, m1 })
    }
}

/// Successful authentication: the session token to present to the realm
/// server, and the server's SRP6 proof.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerAuthAccept {
    pub session_token: [u8; 16],
    pub m2: [u8; 32],
}

impl Message for ServerAuthAccept {
    const OPCODE: Opcode = Opcode::ServerAuthAccept;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.bytes(&self.session_token);
        w.bytes(&self.m2);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let mut session_token = [0u8; 16];
        session_token.copy_from_slice(&r.bytes(16)?);
        let mut m2 = [0u8; 32];
        m2.copy_from_slice(&r.bytes(32)?);
        Ok(Self { session_token, m2 })
    }
}

/// Authentication refusal. The code values are client-visible and fixed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerAuthDeny {
    pub code: u8,
}

impl Message for ServerAuthDeny {
    const OPCODE: Opcode = Opcode::ServerAuthDeny;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.code), 8);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { code: r.uint(8)? as u8 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trip() {
        let msg = ClientHelloAuth {
            build: 16042,
            email: "cassian@dominion.example".into(),
            a_pub: vec![0xab; 256],
            m1: [0x5c; 32],
        };
        assert_eq!(ClientHelloAuth::from_payload(&msg.to_payload()).unwrap(), msg);
    }

    #[test]
    fn accept_round_trip() {
        let msg = ServerAuthAccept {
            session_token: [3; 16],
            m2: [9; 32],
        };
        assert_eq!(ServerAuthAccept::from_payload(&msg.to_payload()).unwrap(), msg);
    }

    #[test]
    fn truncated_hello_fails() {
        let msg = ClientHelloAuth {
            build: 1,
            email: "a@b".into(),
            a_pub: vec![1, 2, 3],
            m1: [0; 32],
        };
        let payload = msg.to_payload();
        assert!(matches!(
            ClientHelloAuth::from_payload(&payload[..payload.len() - 4]),
            Err(ProtocolError::UnexpectedEof)
        ));
    }
}
