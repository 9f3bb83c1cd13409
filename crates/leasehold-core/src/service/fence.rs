//! Fencing-token validation for resources protected by a lock
//!
//! A resource remembers the highest token it has accepted and refuses
//! anything older. Equal tokens are accepted so a holder may write more
//! than once under the same grant.

use dashmap::DashMap;
use leasehold_common::FencingToken;
use tracing::warn;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("fencing token {token} is older than the highest seen token {highest_seen}")]
pub struct FenceRejection {
    pub token: FencingToken,
    pub highest_seen: FencingToken,
}

#[derive(Debug, Default)]
pub struct FenceValidator {
    highest: DashMap<String, FencingToken>,
}

impl FenceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` for `resource` unless a newer token was already seen
    pub fn check_and_record(&self, resource: &str, token: FencingToken) -> Result<(), FenceRejection> {
        let mut entry = self.highest.entry(resource.to_string()).or_insert(token);
        if token < *entry {
            let rejection = FenceRejection {
                token,
                highest_seen: *entry,
            };
            warn!(resource, %token, highest_seen = %rejection.highest_seen, "Rejected stale fencing token");
            return Err(rejection);
        }
        *entry = token;
        Ok(())
    }

    pub fn highest_seen(&self, resource: &str) -> Option<FencingToken> {
        self.highest.get(resource).map(|entry| *entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_older_tokens() {
        let validator = FenceValidator::new();

        assert!(validator.check_and_record("db", FencingToken::new(1)).is_ok());
        assert!(validator.check_and_record("db", FencingToken::new(1)).is_ok());
        assert!(validator.check_and_record("db", FencingToken::new(3)).is_ok());

        let rejection = validator
            .check_and_record("db", FencingToken::new(2))
            .unwrap_err();
        assert_eq!(rejection.token, FencingToken::new(2));
        assert_eq!(rejection.highest_seen, FencingToken::new(3));
        assert_eq!(validator.highest_seen("db"), Some(FencingToken::new(3)));
    }

    #[test]
    fn test_resources_are_independent() {
        let validator = FenceValidator::new();
        validator.check_and_record("a", FencingToken::new(10)).unwrap();

        assert!(validator.check_and_record("b", FencingToken::new(1)).is_ok());
        assert_eq!(validator.highest_seen("c"), None);
    }
}
