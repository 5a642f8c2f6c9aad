//! Logical record keys
//!
//! A [`Key`] identifies one synchronized record. Keys made of exactly three
//! `_`-separated parts (`resource_id_subresource`) address a nested backend
//! resource; every other shape addresses a top-level resource verbatim.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Stable logical identifier of a synchronized record
///
/// Parsed once at the boundary so the rest of the engine never splits strings.
///
/// # Example
///
/// ```
/// use offsync_core::domain::Key;
///
/// let key = Key::parse("goal_42_progress").unwrap();
/// assert_eq!(key.endpoint(), "/goals/42/progress");
///
/// let key = Key::parse("settings").unwrap();
/// assert_eq!(key.endpoint(), "/settings");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// `resource_id_subresource`
    Structured {
        resource: String,
        id: String,
        subresource: String,
    },
    /// Any other well-formed key
    Plain(String),
}

impl Key {
    /// Parse a logical key
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidKey`] for blank keys and keys containing
    /// `/` or whitespace, which cannot be mapped onto an endpoint.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Err(DomainError::InvalidKey("key must not be blank".to_string()));
        }
        if raw.contains('/') || raw.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidKey(format!(
                "key must not contain '/' or whitespace: {raw}"
            )));
        }

        let parts: Vec<&str> = raw.split('_').collect();
        match parts.as_slice() {
            [resource, id, subresource]
                if !resource.is_empty() && !id.is_empty() && !subresource.is_empty() =>
            {
                Ok(Self::Structured {
                    resource: (*resource).to_string(),
                    id: (*id).to_string(),
                    subresource: (*subresource).to_string(),
                })
            }
            _ => Ok(Self::Plain(raw.to_string())),
        }
    }

    /// Remote endpoint this key maps to
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self {
            Self::Structured {
                resource,
                id,
                subresource,
            } => format!("/{resource}s/{id}/{subresource}"),
            Self::Plain(raw) => format!("/{raw}"),
        }
    }

    /// Resource family of the key (the part before the first `_`)
    ///
    /// Used to select per-resource merge behaviour.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::Structured { resource, .. } => resource,
            Self::Plain(raw) => raw.split('_').next().unwrap_or(raw),
        }
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structured {
                resource,
                id,
                subresource,
            } => write!(f, "{resource}_{id}_{subresource}"),
            Self::Plain(raw) => f.write_str(raw),
        }
    }
}

impl FromStr for Key {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Key {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}
