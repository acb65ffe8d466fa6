//! Entry mode switch.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Which side of the link this process plays. Selected once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Captures the device position and publishes it.
    Reporter,
    /// Reads the latest position and follows live updates.
    #[default]
    Observer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reporter => "reporter",
            Self::Observer => "observer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    /// Accepts the canonical names plus the `partner` / `admin` view names
    /// used by links handed out to the two parties.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reporter" | "partner" => Ok(Self::Reporter),
            "observer" | "admin" => Ok(Self::Observer),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_and_view_names() {
        assert_eq!("reporter".parse::<Role>().unwrap(), Role::Reporter);
        assert_eq!("Partner".parse::<Role>().unwrap(), Role::Reporter);
        assert_eq!("observer".parse::<Role>().unwrap(), Role::Observer);
        assert_eq!(" admin ".parse::<Role>().unwrap(), Role::Observer);
        assert!("viewer".parse::<Role>().is_err());
    }

    #[test]
    fn defaults_to_observer() {
        assert_eq!(Role::default(), Role::Observer);
    }
}
