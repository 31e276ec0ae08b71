use serde::{Deserialize, Serialize};

/// Lifecycle state of a lease as persisted in the `state` column.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum LeaseState {
    #[default]
    Default,
    Declined,
    /// Terminal: the lease expired and has been fully processed.
    ExpiredReclaimed,
    Released,
    Registered,
}

impl LeaseState {
    pub const ALL: [LeaseState; 5] = [
        LeaseState::Default,
        LeaseState::Declined,
        LeaseState::ExpiredReclaimed,
        LeaseState::Released,
        LeaseState::Registered,
    ];

    pub fn code(self) -> i32 {
        match self {
            LeaseState::Default => 0,
            LeaseState::Declined => 1,
            LeaseState::ExpiredReclaimed => 2,
            LeaseState::Released => 3,
            LeaseState::Registered => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LeaseState::Default),
            1 => Some(LeaseState::Declined),
            2 => Some(LeaseState::ExpiredReclaimed),
            3 => Some(LeaseState::Released),
            4 => Some(LeaseState::Registered),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeaseState::Default => "default",
            LeaseState::Declined => "declined",
            LeaseState::ExpiredReclaimed => "expired-reclaimed",
            LeaseState::Released => "released",
            LeaseState::Registered => "registered",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LeaseState::ExpiredReclaimed)
    }

    /// States that count towards assigned/declined statistics.
    pub fn is_counted(self) -> bool {
        matches!(self, LeaseState::Default | LeaseState::Declined)
    }
}

/// Kind of address a lease binds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LeaseType {
    /// Non-temporary IPv6 address.
    #[default]
    Na,
    /// Temporary IPv6 address.
    Ta,
    /// Delegated IPv6 prefix.
    Pd,
    /// IPv4 address.
    V4,
}

impl LeaseType {
    pub fn code(self) -> i32 {
        match self {
            LeaseType::Na => 0,
            LeaseType::Ta => 1,
            LeaseType::Pd => 2,
            LeaseType::V4 => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(LeaseType::Na),
            1 => Some(LeaseType::Ta),
            2 => Some(LeaseType::Pd),
            3 => Some(LeaseType::V4),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeaseType::Na => "IA_NA",
            LeaseType::Ta => "IA_TA",
            LeaseType::Pd => "IA_PD",
            LeaseType::V4 => "V4",
        }
    }
}
