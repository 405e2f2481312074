use strum_macros::{Display, EnumString};

/// Caller role as asserted by the upstream gateway.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Supervisor,
    Employee,
}

impl Role {
    /// Zone management, permission decisions and reports.
    pub fn can_supervise(self) -> bool {
        matches!(self, Role::Admin | Role::Supervisor)
    }
}
