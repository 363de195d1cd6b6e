use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Joins a master id and a date in an occurrence id: `<masterId>_<YYYY-MM-DD>`.
/// Never legal inside a [`MasterId`].
pub const OCCURRENCE_ID_SEPARATOR: char = '_';

/// Identifier of a master shift (UUIDv7, time-sortable for easier log correlation).
///
/// Construction goes through [`MasterId::new`] or [`MasterId::parse`], so a
/// value of this type never contains [`OCCURRENCE_ID_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MasterId(String);

impl MasterId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(CoreError::InvalidId("master id must not be empty".into()));
        }
        if s.contains(OCCURRENCE_ID_SEPARATOR) {
            return Err(CoreError::InvalidId(format!(
                "master id must not contain '{OCCURRENCE_ID_SEPARATOR}': {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MasterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for MasterId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<MasterId> for String {
    fn from(id: MasterId) -> Self {
        id.0
    }
}

impl std::str::FromStr for MasterId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Owning tenant. Every store read is filtered by it.
    TenantId
);
string_id!(
    /// A worker who can be assigned to shifts.
    OperatorId
);
string_id!(
    /// A client location where a shift takes place.
    SiteId
);
