use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

/// Caller role as announced by the upstream UI in `X-User-Role`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Hr,
    Manager,
    Employee,
}

/// How much of the employee directory a role may see.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DataScope {
    All,
    Team,
    Own,
}

impl Role {
    pub fn from_header(value: &str) -> Option<Self> {
        value.trim().parse().ok()
    }

    pub fn data_scope(self) -> DataScope {
        match self {
            Role::Admin | Role::Hr => DataScope::All,
            Role::Manager => DataScope::Team,
            Role::Employee => DataScope::Own,
        }
    }
}
