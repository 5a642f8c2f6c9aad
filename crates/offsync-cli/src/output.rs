//! Terminal output for `offsync` commands
//!
//! Every command writes through an [`Output`]. In human mode status lines go
//! to the terminal and structured results are skipped; with `--json` only
//! structured results (and errors) are printed, one document each.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy)]
pub struct Output {
    format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// A completed action
    pub fn success(&self, message: &str) {
        if !self.is_json() {
            println!("\u{2713} {}", message);
        }
    }

    /// Something the operator should look at; printed in both modes
    pub fn warn(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("\u{26a0} {}", message),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"level": "warning", "message": message}))
            }
        }
    }

    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Human => eprintln!("\u{2717} {}", message),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"level": "error", "message": message}))
            }
        }
    }

    /// Free-form detail line
    pub fn line(&self, message: &str) {
        if !self.is_json() {
            println!("  {}", message);
        }
    }

    /// `label: value` in an aligned details block
    pub fn field(&self, label: &str, value: &str) {
        if !self.is_json() {
            println!("  {:<20} {}", format!("{}:", label), value);
        }
    }

    /// The command's structured result; only printed with `--json`
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<()> {
        if self.is_json() {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }
}

/// Formats epoch millis for humans; 0 means never
pub fn format_millis(millis: i64) -> String {
    if millis <= 0 {
        return "never".to_string();
    }
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| millis.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "never");
        assert_eq!(format_millis(1_700_000_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_json_mode() {
        assert!(Output::new(OutputFormat::Json).is_json());
        assert!(!Output::new(OutputFormat::Human).is_json());
    }
}
