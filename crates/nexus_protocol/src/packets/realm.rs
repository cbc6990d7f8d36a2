use crate::{BitReader, BitWriter, Message, Opcode, ProtocolError};

/// Presents the session token issued by the auth server.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientRealmSession {
    pub session_token: [u8; 16],
}

impl Message for ClientRealmSession {
    const OPCODE: Opcode = Opcode::ClientRealmSession;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.bytes(&self.session_token);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let mut session_token = [0u8; 16];
        session_token.copy_from_slice(&r.bytes(16)?);
        Ok(Self { session_token })
    }
}

/// Account identity plus the key the world server will expect. The realm
/// name is a bit-packed wide string; the address is NUL-terminated ASCII.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerRealmInfo {
    pub account_id: u64,
    pub realm_id: u32,
    pub realm_name: String,
    pub realm_address: String,
    pub session_key: [u8; 16],
}

impl Message for ServerRealmInfo {
    const OPCODE: Opcode = Opcode::ServerRealmInfo;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.account_id, 64);
        w.uint(u64::from(self.realm_id), 32);
        w.packed_wide_string(&self.realm_name);
        w.ascii_string(&self.realm_address);
        w.bytes(&self.session_key);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let account_id = r.uint(64)?;
        let realm_id = r.uint(32)? as u32;
        let realm_name = r.packed_wide_string()?;
        let realm_address = r.ascii_string()?;
        let mut session_key = [0u8; 16];
        session_key.copy_from_slice(&r.bytes(16)?);
        Ok(Self {
            account_id,
            realm_id,
            realm_name,
            realm_address,
            session_key,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientRealmListRequest;

impl Message for ClientRealmListRequest {
    const OPCODE: Opcode = Opcode::ClientRealmListRequest;

    fn encode_payload(&self, _w: &mut BitWriter) {}

    fn decode_payload(_r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RealmListEntry {
    pub realm_id: u32,
    pub name: String,
    pub online: u32,
    pub address: String,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerRealmList {
    pub realms: Vec<RealmListEntry>,
}

impl Message for ServerRealmList {
    const OPCODE: Opcode = Opcode::ServerRealmList;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.realms.len() as u64, 8);
        for realm in &self.realms {
            w.uint(u64::from(realm.realm_id), 32);
            w.packed_wide_string(&realm.name);
            w.uint(u64::from(realm.online), 32);
            w.ascii_string(&realm.address);
        }
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let count = r.uint(8)? as usize;
        let realms = (0..count)
            .map(|_| {
                let realm_id = r.uint(32)? as u32;
                let name = r.packed_wide_string()?;
                let online = r.uint(32)? as u32;
                let address = r.ascii_string()?;
                Ok(RealmListEntry {
                    realm_id,
                    name,
                    online,
                    address,
                })
            })
            .collect::<Result<_, ProtocolError>>()?;
        Ok(Self { realms })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientRealmSelect {
    pub realm_id: u32,
}

impl Message for ClientRealmSelect {
    const OPCODE: Opcode = Opcode::ClientRealmSelect;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.realm_id), 32);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { realm_id: r.uint(32)? as u32 })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerRealmSelectResult {
    pub ok: bool,
    pub address: String,
}

impl Message for ServerRealmSelectResult {
    const OPCODE: Opcode = Opcode::ServerRealmSelectResult;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.bit(self.ok);
        w.ascii_string(&self.address);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let ok = r.bit()?;
        let address = r.ascii_string()?;
        Ok(Self { ok, address })
    }
}
