/// Classic UDP message size limit without EDNS
pub const DEFAULT_UDP_PAYLOAD: u16 = 512;

/// DNS Opcode constants from RFC 1035
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Opcode {
    QUERY = 0,
    IQUERY = 1,
    STATUS = 2,
    UNASSIGNED3 = 3,
    NOTIFY = 4,
    UPDATE = 5,
    DSO = 6,
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::QUERY,
            1 => Opcode::IQUERY,
            2 => Opcode::STATUS,
            4 => Opcode::NOTIFY,
            5 => Opcode::UPDATE,
            6 => Opcode::DSO,
            _ => Opcode::UNASSIGNED3,
        }
    }
}
