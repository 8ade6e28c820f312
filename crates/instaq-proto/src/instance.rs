//! Object identities.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifies one object: a type name plus a numeric id.
///
/// Two instances are equal when both the type and the id match, so the same id
/// under two different types names two different objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instance {
    /// Name of the instance's type.
    pub type_name: String,
    /// Numeric id, unique within the type's main table.
    pub id: i64,
}

impl Instance {
    /// Create a new instance identity.
    pub fn new(type_name: impl Into<String>, id: i64) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }

    /// Get the type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Get the id.
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.id)
    }
}

impl FromStr for Instance {
    type Err = Error;

    /// Parse the `Type.id` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (type_name, id) = s
            .rsplit_once('.')
            .ok_or_else(|| Error::InvalidInstance(s.to_string()))?;
        if type_name.is_empty() {
            return Err(Error::InvalidInstance(s.to_string()));
        }
        let id = id
            .parse::<i64>()
            .map_err(|_| Error::InvalidInstance(s.to_string()))?;
        Ok(Self::new(type_name, id))
    }
}
