use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry-assigned identifier of a monitored target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub i64);

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord user snowflake of the member who registered a target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Discord role snowflake pinged when a target posts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl fmt::Display for RoleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-stable identifier of a published item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const MAX_HANDLE_LEN: usize = 64;

/// Remote account name, without the leading `@`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExternalHandle(String);

impl ExternalHandle {
    pub fn parse(s: &str) -> Result<Self, HandleError> {
        let trimmed = s.trim();
        let handle = trimmed.strip_prefix('@').unwrap_or(trimmed);
        if handle.is_empty() {
            return Err(HandleError::Empty);
        }
        if handle.len() > MAX_HANDLE_LEN {
            return Err(HandleError::TooLong(handle.len()));
        }
        if let Some(c) = handle
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(HandleError::InvalidChar(c));
        }
        Ok(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl TryFrom<String> for ExternalHandle {
    type Error = HandleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExternalHandle> for String {
    fn from(value: ExternalHandle) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("handle is empty")]
    Empty,
    #[error("handle is {0} characters long (max {MAX_HANDLE_LEN})")]
    TooLong(usize),
    #[error("handle contains invalid character {0:?}")]
    InvalidChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_strips_at_and_whitespace() {
        let h = ExternalHandle::parse("  @some.creator_1 ").unwrap();
        assert_eq!(h.as_str(), "some.creator_1");
        assert_eq!(h.to_string(), "@some.creator_1");
    }

    #[test]
    fn handle_rejects_bad_input() {
        assert_eq!(ExternalHandle::parse("@"), Err(HandleError::Empty));
        assert_eq!(
            ExternalHandle::parse("a/b"),
            Err(HandleError::InvalidChar('/'))
        );
        let long = "x".repeat(65);
        assert_eq!(ExternalHandle::parse(&long), Err(HandleError::TooLong(65)));
    }

    #[test]
    fn handle_deserializes_through_parse() {
        let h: ExternalHandle = serde_json::from_str("\"@creator\"").unwrap();
        assert_eq!(h.as_str(), "creator");
        assert!(serde_json::from_str::<ExternalHandle>("\"bad handle\"").is_err());
    }
}
