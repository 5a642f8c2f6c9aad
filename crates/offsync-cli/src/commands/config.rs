//! `offsync config show|validate|path`
//!
//! `show` prints the effective configuration (file values over defaults);
//! `validate` also compiles every strategy rule pattern.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;

use offsync_conflict::policy::validate_rule;
use offsync_core::config::Config;

use crate::output::Output;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show,
    /// Validate the configuration
    Validate,
    /// Print the configuration file path
    Path,
}

/// Every problem with `config`, including unparseable strategy patterns
pub fn check(config: &Config) -> Vec<String> {
    let mut problems: Vec<String> = config
        .validate()
        .iter()
        .map(ToString::to_string)
        .collect();

    for (index, rule) in config.conflicts.rules.iter().enumerate() {
        if let Err(e) = validate_rule(rule) {
            problems.push(format!("conflicts.rules[{}]: {}", index, e));
        }
    }
    problems
}

impl ConfigCommand {
    pub fn execute(&self, config: &Config, path: &Path, out: Output) -> Result<()> {

        match self {
            ConfigCommand::Show => {
                out.json(config)?;
                if !out.is_json() {
                    out.success(&format!("Configuration ({})", path.display()));
                    for line in serde_yaml::to_string(config)?.lines() {
                        out.line(line);
                    }
                }
            }
            ConfigCommand::Validate => {
                let problems = check(config);
                out.json(&serde_json::json!({
                    "valid": problems.is_empty(),
                    "errors": problems,
                }))?;
                if problems.is_empty() {
                    out.success("Configuration is valid");
                } else if !out.is_json() {
                    for problem in &problems {
                        out.error(problem);
                    }
                }
                if !problems.is_empty() {
                    anyhow::bail!("{} configuration error(s)", problems.len());
                }
            }
            ConfigCommand::Path => {
                out.json(&serde_json::json!({ "path": path }))?;
                if !out.is_json() {
                    println!("{}", path.display());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use offsync_core::config::{ConfigBuilder, StrategyRule};
    use offsync_core::domain::ResolutionStrategy;

    use super::*;

    #[test]
    fn test_check_default_config() {
        assert!(check(&Config::default()).is_empty());
    }

    #[test]
    fn test_check_reports_bad_pattern() {
        let mut config = ConfigBuilder::new().build();
        config.conflicts.rules.push(StrategyRule {
            pattern: "goal_[".into(),
            strategy: ResolutionStrategy::Manual,
        });

        let problems = check(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].starts_with("conflicts.rules[0]"));
    }

    #[test]
    fn test_check_reads_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "sync:\n  max_retries: 0\n").unwrap();

        let config = Config::load(&path).unwrap();
        let problems = check(&config);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("max_retries"));
    }
}
