//! Entity identifiers: 56-bit process-monotonic serial with the entity kind
//! packed into the high byte.

use bitfield_struct::bitfield;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EntityKind {
    Player = 1,
    Creature = 2,
    Pet = 3,
    Corpse = 4,
    Gadget = 5,
}

impl EntityKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(EntityKind::Player),
            2 => Some(EntityKind::Creature),
            3 => Some(EntityKind::Pet),
            4 => Some(EntityKind::Corpse),
            5 => Some(EntityKind::Gadget),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

#[bitfield(u64)]
#[derive(PartialEq, Eq, Hash)]
pub struct Guid {
    #[bits(56)]
    pub serial: u64,
    #[bits(8)]
    pub kind_tag: u8,
}

impl Guid {
    pub fn new_for(kind: EntityKind, serial: u64) -> Self {
        Guid::new().with_serial(serial).with_kind_tag(kind.tag())
    }

    pub fn kind(self) -> Option<EntityKind> {
        EntityKind::from_tag(self.kind_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_lives_in_the_high_byte() {
        let guid = Guid::new_for(EntityKind::Corpse, 0x00ab_cdef_0123_4567);
        let raw: u64 = guid.into_bits();
        assert_eq!(raw >> 56, u64::from(EntityKind::Corpse.tag()));
        assert_eq!(guid.serial(), 0x00ab_cdef_0123_4567);
        assert_eq!(guid.kind(), Some(EntityKind::Corpse));
    }

    #[test]
    fn round_trips_through_u64() {
        let guid = Guid::new_for(EntityKind::Player, 42);
        assert_eq!(Guid::from_bits(guid.into_bits()), guid);
    }
}
