use crate::{BitReader, BitWriter, Message, Opcode, ProtocolError};

/// Chat channels. Unknown integers decode to `Say`; that loss is deliberate
/// so stray client values degrade to local chat instead of dropping frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u16)]
pub enum ChatChannel {
    Say = 0,
    Yell = 1,
    Emote = 2,
    Whisper = 3,
    Zone = 4,
    System = 5,
}

impl ChatChannel {
    pub const ALL: &'static [ChatChannel] = &[
        ChatChannel::Say,
        ChatChannel::Yell,
        ChatChannel::Emote,
        ChatChannel::Whisper,
        ChatChannel::Zone,
        ChatChannel::System,
    ];

    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => ChatChannel::Yell,
            2 => ChatChannel::Emote,
            3 => ChatChannel::Whisper,
            4 => ChatChannel::Zone,
            5 => ChatChannel::System,
            _ => ChatChannel::Say,
        }
    }

    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Hearing range in world units, or `None` for unbounded channels.
    pub fn broadcast_range(self) -> Option<f32> {
        match self {
            ChatChannel::Say | ChatChannel::Emote => Some(30.0),
            ChatChannel::Yell => Some(100.0),
            ChatChannel::Whisper | ChatChannel::Zone | ChatChannel::System => None,
        }
    }
}

/// One movement sub-command inside an entity command packet.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum EntityCommand {
    SetPosition { x: f32, y: f32, z: f32 },
    SetVelocity { x: f32, y: f32, z: f32 },
    SetRotation { rotation: f32 },
    SetState { state: u32 },
}

impl EntityCommand {
    fn encode(&self, w: &mut BitWriter) {
        match *self {
            EntityCommand::SetPosition { x, y, z } => {
                w.uint(0, 8);
                w.f32(x);
                w.f32(y);
                w.f32(z);
            }
            EntityCommand::SetVelocity { x, y, z } => {
                w.uint(1, 8);
                w.f32(x);
                w.f32(y);
                w.f32(z);
            }
            EntityCommand::SetRotation { rotation } => {
                w.uint(2, 8);
                w.f32(rotation);
            }
            EntityCommand::SetState { state } => {
                w.uint(3, 8);
                w.uint(u64::from(state), 32);
            }
        }
    }

    fn decode(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        match r.uint(8)? {
            0 => Ok(EntityCommand::SetPosition {
                x: r.f32()?,
                y: r.f32()?,
                z: r.f32()?,
            }),
            1 => Ok(EntityCommand::SetVelocity {
                x: r.f32()?,
                y: r.f32()?,
                z: r.f32()?,
            }),
            2 => Ok(EntityCommand::SetRotation { rotation: r.f32()? }),
            3 => Ok(EntityCommand::SetState { state: r.uint(32)? as u32 }),
            _ => Err(ProtocolError::MalformedFrame("unknown entity sub-command")),
        }
    }
}

/// World handshake: the realm-issued identity and a proof over the session
/// key. The key itself never travels on this port.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClientHelloWorld {
    pub account_id: u64,
    pub key_proof: [u8; 32],
}

impl Message for ClientHelloWorld {
    const OPCODE: Opcode = Opcode::ClientHelloWorld;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.account_id, 64);
        w.bytes(&self.key_proof);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let account_id = r.uint(64)?;
        let mut key_proof = [0u8; 32];
        key_proof.copy_from_slice(&r.bytes(32)?);
        Ok(Self { account_id, key_proof })
    }
}

/// Accepts the world handshake. Every frame after this one is sealed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerHelloWorld {
    pub ok: bool,
}

impl Message for ServerHelloWorld {
    const OPCODE: Opcode = Opcode::ServerHelloWorld;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.bit(self.ok);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { ok: r.bit()? })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientCharacterListRequest;

impl Message for ClientCharacterListRequest {
    const OPCODE: Opcode = Opcode::ClientCharacterListRequest;

    fn encode_payload(&self, _w: &mut BitWriter) {}

    fn decode_payload(_r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CharacterSummary {
    pub character_id: u64,
    pub name: String,
    pub level: u16,
    pub faction: u8,
    pub zone_id: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerCharacterList {
    pub characters: Vec<CharacterSummary>,
}

impl Message for ServerCharacterList {
    const OPCODE: Opcode = Opcode::ServerCharacterList;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.characters.len() as u64, 8);
        for c in &self.characters {
            w.uint(c.character_id, 64);
            w.packed_wide_string(&c.name);
            w.uint(u64::from(c.level), 16);
            w.uint(u64::from(c.faction), 8);
            w.uint(u64::from(c.zone_id), 32);
        }
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let count = r.uint(8)? as usize;
        let characters = (0..count)
            .map(|_| {
                Ok(CharacterSummary {
                    character_id: r.uint(64)?,
                    name: r.packed_wide_string()?,
                    level: r.uint(16)? as u16,
                    faction: r.uint(8)? as u8,
                    zone_id: r.uint(32)? as u32,
                })
            })
            .collect::<Result<_, ProtocolError>>()?;
        Ok(Self { characters })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientCharacterSelect {
    pub character_id: u64,
}

impl Message for ClientCharacterSelect {
    const OPCODE: Opcode = Opcode::ClientCharacterSelect;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.character_id, 64);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { character_id: r.uint(64)? })
    }
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ServerWorldEnter {
    pub guid: u64,
    pub zone_id: u32,
    pub instance_id: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
}

impl Message for ServerWorldEnter {
    const OPCODE: Opcode = Opcode::ServerWorldEnter;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
        w.uint(u64::from(self.zone_id), 32);
        w.uint(u64::from(self.instance_id), 32);
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.z);
        w.f32(self.rotation);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            guid: r.uint(64)?,
            zone_id: r.uint(32)? as u32,
            instance_id: r.uint(32)? as u32,
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            rotation: r.f32()?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientEnteredWorld;

impl Message for ClientEnteredWorld {
    const OPCODE: Opcode = Opcode::ClientEnteredWorld;

    fn encode_payload(&self, _w: &mut BitWriter) {}

    fn decode_payload(_r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self)
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ClientEntityCommand {
    pub commands: Vec<EntityCommand>,
}

impl Message for ClientEntityCommand {
    const OPCODE: Opcode = Opcode::ClientEntityCommand;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.commands.len() as u64, 8);
        for cmd in &self.commands {
            cmd.encode(w);
        }
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let count = r.uint(8)? as usize;
        let commands = (0..count)
            .map(|_| EntityCommand::decode(r))
            .collect::<Result<_, _>>()?;
        Ok(Self { commands })
    }
}

/// Rebroadcast of another entity's movement.
#[derive(Clone, PartialEq, Debug)]
pub struct ServerEntityCommand {
    pub guid: u64,
    pub commands: Vec<EntityCommand>,
}

impl Message for ServerEntityCommand {
    const OPCODE: Opcode = Opcode::ServerEntityCommand;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
        w.uint(self.commands.len() as u64, 8);
        for cmd in &self.commands {
            cmd.encode(w);
        }
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let guid = r.uint(64)?;
        let count = r.uint(8)? as usize;
        let commands = (0..count)
            .map(|_| EntityCommand::decode(r))
            .collect::<Result<_, _>>()?;
        Ok(Self { guid, commands })
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct ServerEntitySpawn {
    pub guid: u64,
    pub kind: u8,
    pub display_info: u32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rotation: f32,
    pub health: u32,
    pub max_health: u32,
    pub level: u16,
    pub name: String,
}

impl Message for ServerEntitySpawn {
    const OPCODE: Opcode = Opcode::ServerEntitySpawn;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
        w.uint(u64::from(self.kind), 8);
        w.uint(u64::from(self.display_info), 32);
        w.f32(self.x);
        w.f32(self.y);
        w.f32(self.z);
        w.f32(self.rotation);
        w.uint(u64::from(self.health), 32);
        w.uint(u64::from(self.max_health), 32);
        w.uint(u64::from(self.level), 16);
        w.packed_wide_string(&self.name);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            guid: r.uint(64)?,
            kind: r.uint(8)? as u8,
            display_info: r.uint(32)? as u32,
            x: r.f32()?,
            y: r.f32()?,
            z: r.f32()?,
            rotation: r.f32()?,
            health: r.uint(32)? as u32,
            max_health: r.uint(32)? as u32,
            level: r.uint(16)? as u16,
            name: r.packed_wide_string()?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerEntityDespawn {
    pub guid: u64,
}

impl Message for ServerEntityDespawn {
    const OPCODE: Opcode = Opcode::ServerEntityDespawn;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { guid: r.uint(64)? })
    }
}

/// Client chat. `target_name` is only meaningful on the whisper channel.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ClientChat {
    pub channel: u16,
    pub target_name: String,
    pub text: String,
}

impl Message for ClientChat {
    const OPCODE: Opcode = Opcode::ClientChat;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.channel), 16);
        w.packed_wide_string(&self.target_name);
        w.packed_wide_string(&self.text);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            channel: r.uint(16)? as u16,
            target_name: r.packed_wide_string()?,
            text: r.packed_wide_string()?,
        })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerChat {
    pub channel: u16,
    pub from_guid: u64,
    pub from_name: String,
    pub text: String,
}

impl Message for ServerChat {
    const OPCODE: Opcode = Opcode::ServerChat;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.channel), 16);
        w.uint(self.from_guid, 64);
        w.packed_wide_string(&self.from_name);
        w.packed_wide_string(&self.text);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            channel: r.uint(16)? as u16,
            from_guid: r.uint(64)?,
            from_name: r.packed_wide_string()?,
            text: r.packed_wide_string()?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerWhisperResult {
    pub code: u8,
}

impl ServerWhisperResult {
    pub const DELIVERED: u8 = 0;
    pub const OFFLINE: u8 = 1;
    pub const WRONG_FACTION: u8 = 2;
    pub const IGNORED: u8 = 3;
}

impl Message for ServerWhisperResult {
    const OPCODE: Opcode = Opcode::ServerWhisperResult;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.code), 8);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { code: r.uint(8)? as u8 })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientSpellCast {
    pub spell_id: u32,
    pub target_guid: u64,
}

impl Message for ClientSpellCast {
    const OPCODE: Opcode = Opcode::ClientSpellCast;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.spell_id), 32);
        w.uint(self.target_guid, 64);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            spell_id: r.uint(32)? as u32,
            target_guid: r.uint(64)?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerSpellResult {
    pub caster_guid: u64,
    pub spell_id: u32,
    pub target_guid: u64,
    pub effect_kind: u8,
    pub amount: u32,
    pub critical: bool,
}

impl ServerSpellResult {
    pub const KIND_DAMAGE: u8 = 0;
    pub const KIND_HEAL: u8 = 1;
    pub const KIND_ABSORB: u8 = 2;
    pub const KIND_STAT: u8 = 3;
    pub const KIND_PERIODIC_DAMAGE: u8 = 4;
    pub const KIND_PERIODIC_HEAL: u8 = 5;
    pub const KIND_INTERRUPTED: u8 = 255;
}

impl Message for ServerSpellResult {
    const OPCODE: Opcode = Opcode::ServerSpellResult;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.caster_guid, 64);
        w.uint(u64::from(self.spell_id), 32);
        w.uint(self.target_guid, 64);
        w.uint(u64::from(self.effect_kind), 8);
        w.uint(u64::from(self.amount), 32);
        w.bit(self.critical);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            caster_guid: r.uint(64)?,
            spell_id: r.uint(32)? as u32,
            target_guid: r.uint(64)?,
            effect_kind: r.uint(8)? as u8,
            amount: r.uint(32)? as u32,
            critical: r.bit()?,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerBuffUpdate {
    pub guid: u64,
    pub buff_id: u32,
    pub spell_id: u32,
    pub applied: bool,
    pub duration_ms: u32,
}

impl Message for ServerBuffUpdate {
    const OPCODE: Opcode = Opcode::ServerBuffUpdate;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
        w.uint(u64::from(self.buff_id), 32);
        w.uint(u64::from(self.spell_id), 32);
        w.bit(self.applied);
        w.uint(u64::from(self.duration_ms), 32);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            guid: r.uint(64)?,
            buff_id: r.uint(32)? as u32,
            spell_id: r.uint(32)? as u32,
            applied: r.bit()?,
            duration_ms: r.uint(32)? as u32,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerHealthUpdate {
    pub guid: u64,
    pub health: u32,
    pub max_health: u32,
}

impl Message for ServerHealthUpdate {
    const OPCODE: Opcode = Opcode::ServerHealthUpdate;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
        w.uint(u64::from(self.health), 32);
        w.uint(u64::from(self.max_health), 32);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            guid: r.uint(64)?,
            health: r.uint(32)? as u32,
            max_health: r.uint(32)? as u32,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientNpcInteract {
    pub guid: u64,
}

impl Message for ClientNpcInteract {
    const OPCODE: Opcode = Opcode::ClientNpcInteract;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.guid, 64);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { guid: r.uint(64)? })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientLootRequest {
    pub corpse_guid: u64,
}

impl Message for ClientLootRequest {
    const OPCODE: Opcode = Opcode::ClientLootRequest;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.corpse_guid, 64);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { corpse_guid: r.uint(64)? })
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ServerLootResponse {
    pub corpse_guid: u64,
    pub items: Vec<(u32, u32)>,
}

impl Message for ServerLootResponse {
    const OPCODE: Opcode = Opcode::ServerLootResponse;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(self.corpse_guid, 64);
        w.uint(self.items.len() as u64, 8);
        for &(item_id, qty) in &self.items {
            w.uint(u64::from(item_id), 32);
            w.uint(u64::from(qty), 32);
        }
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        let corpse_guid = r.uint(64)?;
        let count = r.uint(8)? as usize;
        let items = (0..count)
            .map(|_| Ok((r.uint(32)? as u32, r.uint(32)? as u32)))
            .collect::<Result<_, ProtocolError>>()?;
        Ok(Self { corpse_guid, items })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ClientKeepalive {
    pub seq: u32,
}

impl Message for ClientKeepalive {
    const OPCODE: Opcode = Opcode::ClientKeepalive;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.seq), 32);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { seq: r.uint(32)? as u32 })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerKeepalive {
    pub seq: u32,
}

impl Message for ServerKeepalive {
    const OPCODE: Opcode = Opcode::ServerKeepalive;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.seq), 32);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { seq: r.uint(32)? as u32 })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ServerDisconnectNotice {
    pub reason: u8,
}

impl Message for ServerDisconnectNotice {
    const OPCODE: Opcode = Opcode::ServerDisconnectNotice;

    fn encode_payload(&self, w: &mut BitWriter) {
        w.uint(u64::from(self.reason), 8);
    }

    fn decode_payload(r: &mut BitReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { reason: r.uint(8)? as u8 })
    }
}
