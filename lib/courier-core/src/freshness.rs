//! Per-build freshness tokens
//!
//! Some proxies skip reloading a configuration that is byte-identical to the
//! one they already run. The status virtual host carries one route whose name
//! and path come from a fresh token on every build so that no two snapshots
//! are ever identical. Everything that needs such a token goes through
//! [`FreshnessSource`], so the workaround can be swapped out in one place.

use uuid::Uuid;

/// Source of a value that differs on every call
pub trait FreshnessSource: Send + Sync {
    fn token(&self) -> String;
}

/// Random UUID v4 tokens in simple (unhyphenated) form
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomFreshness;

impl FreshnessSource for RandomFreshness {
    fn token(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_tokens_differ() {
        let source = RandomFreshness;
        let a = source.token();
        let b = source.token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
    }
}
