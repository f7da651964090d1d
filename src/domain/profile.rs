use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Participant kinds in the internship programme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Intern,
    Supervisor,
    Coordinator,
}

impl Role {
    /// The role a participant of this kind exchanges direct messages with.
    #[must_use]
    pub const fn counterpart(self) -> Self {
        match self {
            Self::Intern => Self::Supervisor,
            Self::Supervisor | Self::Coordinator => Self::Intern,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Intern => "intern",
            Self::Supervisor => "supervisor",
            Self::Coordinator => "coordinator",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "intern" => Ok(Self::Intern),
            "supervisor" => Ok(Self::Supervisor),
            "coordinator" => Ok(Self::Coordinator),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A participant profile. Read-only from this crate's perspective; profile
/// management belongs to the hosting application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub display_name: String,
    pub role: Role,
    pub contact_number: Option<String>,
}
