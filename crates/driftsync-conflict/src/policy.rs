//! Per-path resolution policy
//!
//! Maps conflicted paths to strategies through an ordered rule list of glob
//! patterns. First matching rule wins; otherwise the configured default
//! strategy applies.

use driftsync_core::domain::{LocalPath, ResolutionStrategy};
use glob::Pattern;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Invalid policy pattern '{pattern}': {reason}")]
pub struct PolicyPatternError {
    pub pattern: String,
    pub reason: String,
}

/// One glob rule mapping paths to a strategy
#[derive(Debug, Clone)]
struct PolicyRule {
    pattern: Pattern,
    strategy: ResolutionStrategy,
}

/// Ordered conflict policy: rules first, default last
#[derive(Debug, Clone)]
pub struct ConflictPolicy {
    rules: Vec<PolicyRule>,
    default: ResolutionStrategy,
}

impl ConflictPolicy {
    pub fn new(default: ResolutionStrategy) -> Self {
        Self {
            rules: Vec::new(),
            default,
        }
    }

    /// Appends a rule; rules are evaluated in insertion order
    pub fn add_rule(
        &mut self,
        pattern: &str,
        strategy: ResolutionStrategy,
    ) -> Result<(), PolicyPatternError> {
        let compiled = Pattern::new(pattern).map_err(|e| PolicyPatternError {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.rules.push(PolicyRule {
            pattern: compiled,
            strategy,
        });
        Ok(())
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default
    }

    /// The strategy for `path`: first matching rule, else the default
    pub fn strategy_for(&self, path: &LocalPath) -> ResolutionStrategy {
        let path_str = path.as_ref().to_string_lossy();
        for rule in &self.rules {
            if rule.pattern.matches(&path_str) {
                return rule.strategy;
            }
        }
        self.default
    }
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self::new(ResolutionStrategy::AskUser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn path(p: &str) -> LocalPath {
        LocalPath::new(PathBuf::from(p)).unwrap()
    }

    #[test]
    fn test_default_when_no_rules_match() {
        let policy = ConflictPolicy::new(ResolutionStrategy::KeepNewer);
        assert_eq!(
            policy.strategy_for(&path("/home/user/sync/a.txt")),
            ResolutionStrategy::KeepNewer
        );
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let mut policy = ConflictPolicy::new(ResolutionStrategy::AskUser);
        policy
            .add_rule("**/*.log", ResolutionStrategy::KeepNewer)
            .unwrap();
        policy
            .add_rule("**/important/**", ResolutionStrategy::KeepBoth)
            .unwrap();

        assert_eq!(
            policy.strategy_for(&path("/home/user/sync/app.log")),
            ResolutionStrategy::KeepNewer
        );
        assert_eq!(
            policy.strategy_for(&path("/home/user/sync/important/doc.txt")),
            ResolutionStrategy::KeepBoth
        );
        // A log inside important/ still hits the earlier log rule.
        assert_eq!(
            policy.strategy_for(&path("/home/user/sync/important/x.log")),
            ResolutionStrategy::KeepNewer
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut policy = ConflictPolicy::default();
        assert!(policy
            .add_rule("[unclosed", ResolutionStrategy::KeepLocal)
            .is_err());
    }
}
