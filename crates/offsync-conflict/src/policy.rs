//! Strategy policy for automatic conflict resolution
//!
//! Maps logical keys to a [`ResolutionStrategy`]. Rules are matched using
//! glob patterns over the key string in first-match-wins order; keys no rule
//! matches use the process-wide default.

use glob::Pattern;
use tracing::{debug, trace, warn};

use offsync_core::config::{ConflictsConfig, StrategyRule};
use offsync_core::domain::{Key, ResolutionStrategy};

use crate::error::ConflictError;

/// Validates a rule's glob pattern
pub fn validate_rule(rule: &StrategyRule) -> Result<(), ConflictError> {
    Pattern::new(&rule.pattern).map_err(|e| ConflictError::InvalidPattern {
        pattern: rule.pattern.clone(),
        reason: e.to_string(),
    })?;
    Ok(())
}

/// Engine that evaluates strategy rules
#[derive(Debug, Clone)]
pub struct StrategyPolicy {
    rules: Vec<(Pattern, ResolutionStrategy)>,
    default_strategy: ResolutionStrategy,
}

impl StrategyPolicy {
    /// Creates a policy from the default strategy and a list of rules
    ///
    /// Invalid rules are logged and skipped.
    pub fn new(default_strategy: ResolutionStrategy, rules: &[StrategyRule]) -> Self {
        let compiled_rules: Vec<(Pattern, ResolutionStrategy)> = rules
            .iter()
            .filter_map(|rule| match Pattern::new(&rule.pattern) {
                Ok(pattern) => Some((pattern, rule.strategy)),
                Err(e) => {
                    warn!(
                        pattern = %rule.pattern,
                        error = %e,
                        "Skipping invalid strategy rule pattern"
                    );
                    None
                }
            })
            .collect();

        debug!(
            rules_count = compiled_rules.len(),
            default = %default_strategy,
            "StrategyPolicy initialized"
        );

        Self {
            rules: compiled_rules,
            default_strategy,
        }
    }

    /// A policy that applies `strategy` to every key
    pub fn uniform(strategy: ResolutionStrategy) -> Self {
        Self::new(strategy, &[])
    }

    pub fn from_config(config: &ConflictsConfig) -> Self {
        Self::new(config.default_strategy, &config.rules)
    }

    /// Evaluates the policy for `key`
    pub fn evaluate(&self, key: &Key) -> ResolutionStrategy {
        let key = key.to_string();
        for (pattern, strategy) in &self.rules {
            if pattern.matches(&key) {
                trace!(
                    key = %key,
                    pattern = %pattern,
                    strategy = %strategy,
                    "Strategy rule matched"
                );
                return *strategy;
            }
        }

        trace!(
            key = %key,
            default = %self.default_strategy,
            "No strategy rule matched, using default"
        );
        self.default_strategy
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default_strategy
    }

    pub fn rules_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for StrategyPolicy {
    fn default() -> Self {
        Self::uniform(ResolutionStrategy::default())
    }
}
