//! Identifier newtypes shared by every Leasehold component

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::MAX_IDENTIFIER_LEN;
use crate::error::LockError;

/// Unix epoch milliseconds
pub type Timestamp = i64;

fn validate_identifier(kind: &str, value: &str) -> Result<(), LockError> {
    if value.trim().is_empty() {
        return Err(LockError::invalid_argument(format!(
            "{} must not be empty",
            kind
        )));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(LockError::invalid_argument(format!(
            "{} exceeds {} bytes",
            kind, MAX_IDENTIFIER_LEN
        )));
    }
    Ok(())
}

/// Name of a protected resource; the key into the lease store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LockName(String);

impl LockName {
    pub fn new(name: impl Into<String>) -> Result<Self, LockError> {
        let name = name.into();
        validate_identifier("lock name", &name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LockName {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for LockName {
    type Error = LockError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LockName> for String {
    fn from(value: LockName) -> Self {
        value.0
    }
}

impl Display for LockName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a client requesting ownership.
///
/// Not unique across restarts: a restarted process may reuse its id, which is
/// why ownership checks always compare the fencing token as well.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HolderId(String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Result<Self, LockError> {
        let id = id.into();
        validate_identifier("holder id", &id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for HolderId {
    type Error = LockError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for HolderId {
    type Error = LockError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<HolderId> for String {
    fn from(value: HolderId) -> Self {
        value.0
    }
}

impl Display for HolderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strictly increasing number issued once per successful lease grant
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FencingToken(u64);

impl FencingToken {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for FencingToken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for FencingToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_name_validation() {
        assert!(LockName::new("db-migration").is_ok());
        assert!(matches!(
            LockName::new(""),
            Err(LockError::InvalidArgument(_))
        ));
        assert!(matches!(
            LockName::new("   "),
            Err(LockError::InvalidArgument(_))
        ));
        assert!(LockName::new("x".repeat(MAX_IDENTIFIER_LEN)).is_ok());
        assert!(LockName::new("x".repeat(MAX_IDENTIFIER_LEN + 1)).is_err());
    }

    #[test]
    fn test_holder_id_validation() {
        assert!(HolderId::new("worker-1").is_ok());
        assert!(HolderId::new("").is_err());
    }

    #[test]
    fn test_serde_rejects_empty_names() {
        let name: LockName = serde_json::from_str("\"orders\"").unwrap();
        assert_eq!(name.as_str(), "orders");
        assert!(serde_json::from_str::<LockName>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"orders\"");
    }

    #[test]
    fn test_fencing_token_ordering() {
        let t1 = FencingToken::new(1);
        let t2 = FencingToken::from(2);
        assert!(t1 < t2);
        assert_eq!(t2.value(), 2);
        assert_eq!(t2.to_string(), "2");
        assert_eq!(serde_json::to_string(&t2).unwrap(), "2");
    }
}
