//! Pipeline configuration.
//!
//! Handles YAML configuration loading with per-field defaults. Command-line
//! flags are applied on top of the loaded values by the binary.

use crate::classifier::{
    Classifier, ClassifierAdapter, CommandClassifier, LexiconClassifier,
    DEFAULT_MAX_INPUT_CHARS,
};
use crate::metrics::{AggregateOptions, DEFAULT_EXAMPLES_PER_LABEL, DEFAULT_TOP_K};
use crate::runner::RunnerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Classification backend selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    /// Built-in financial lexicon scorer
    #[default]
    Lexicon,
    /// External command invoked once per record
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl ClassifierConfig {
    /// Build the configured backend
    #[must_use]
    pub fn build(&self) -> Box<dyn Classifier> {
        match self {
            Self::Lexicon => Box::new(LexiconClassifier::new()),
            Self::Command {
                command,
                args,
                timeout_ms,
            } => Box::new(CommandClassifier::new(
                command.clone(),
                args.clone(),
                Duration::from_millis(*timeout_ms),
            )),
        }
    }

    /// Parse a `--classifier-cmd` command line into a command backend
    ///
    /// # Errors
    ///
    /// Returns an error if the command line is empty or cannot be split.
    pub fn from_command_line(line: &str) -> Result<Self, ConfigError> {
        let mut parts = shell_words::split(line)
            .map_err(|e| ConfigError::InvalidValue {
                field: "classifier.command",
                reason: e.to_string(),
            })?
            .into_iter();

        let command = parts.next().ok_or_else(|| ConfigError::InvalidValue {
            field: "classifier.command",
            reason: "empty command line".to_string(),
        })?;

        Ok(Self::Command {
            command,
            args: parts.collect(),
            timeout_ms: default_timeout_ms(),
        })
    }
}

const fn default_timeout_ms() -> u64 {
    30_000
}

/// Full pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Corpus file (two columns, no header, Latin-1)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
    /// Directory receiving all exported files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Classify only a seeded random sample of this size
    #[serde(default)]
    pub sample_size: Option<usize>,
    /// Seed for sampling
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Records kept in the top-confidence list
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Example texts kept per predicted label
    #[serde(default = "default_examples_per_label")]
    pub examples_per_label: usize,
    /// Model input limit in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Label used when classification fails
    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,
    /// Confidence used when classification fails
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
    /// Inference worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

fn default_data_path() -> PathBuf {
    crate::corpus::default_data_path()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}
const fn default_seed() -> u64 {
    42
}
const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
const fn default_examples_per_label() -> usize {
    DEFAULT_EXAMPLES_PER_LABEL
}
const fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}
fn default_fallback_label() -> String {
    "NEUTRAL".to_string()
}
const fn default_fallback_confidence() -> f64 {
    0.5
}
const fn default_workers() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            output_dir: default_output_dir(),
            sample_size: None,
            seed: default_seed(),
            top_k: default_top_k(),
            examples_per_label: default_examples_per_label(),
            max_input_chars: default_max_input_chars(),
            fallback_label: default_fallback_label(),
            fallback_confidence: default_fallback_confidence(),
            workers: default_workers(),
            classifier: ClassifierConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or fails validation.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidValue {
                field: "top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_input_chars == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_input_chars",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.fallback_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "fallback_confidence",
                reason: format!("{} is outside [0, 1]", self.fallback_confidence),
            });
        }
        if self.fallback_label.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "fallback_label",
                reason: "must not be empty".to_string(),
            });
        }
        if let ClassifierConfig::Command { command, .. } = &self.classifier {
            if command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "classifier.command",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Runner settings derived from this configuration
    #[must_use]
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            workers: self.workers,
            fallback_label: self.fallback_label.clone(),
            fallback_confidence: self.fallback_confidence,
        }
    }

    /// Aggregation settings derived from this configuration
    #[must_use]
    pub const fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            top_k: self.top_k,
            examples_per_label: self.examples_per_label,
        }
    }

    /// Classifier adapter for the configured backend
    #[must_use]
    pub fn adapter(&self) -> ClassifierAdapter {
        ClassifierAdapter::new(self.classifier.build()).with_max_input_chars(self.max_input_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.data_path, PathBuf::from("data/all-data.csv"));
        assert_eq!(config.output_dir, PathBuf::from("results"));
        assert!(config.sample_size.is_none());
        assert_eq!(config.seed, 42);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_input_chars, 512);
        assert_eq!(config.fallback_label, "NEUTRAL");
        assert!((config.fallback_confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.workers, 1);
        assert_eq!(config.classifier, ClassifierConfig::Lexicon);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let config = PipelineConfig::from_yaml("sample_size: 500\ntop_k: 5\n").unwrap();
        assert_eq!(config.sample_size, Some(500));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.workers, 1);
    }

    #[test]
    fn test_from_yaml_command_classifier() {
        let yaml = r"
classifier:
  kind: command
  command: python3
  args: [score.py, --model, distilbert]
workers: 4
";
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.workers, 4);
        match &config.classifier {
            ClassifierConfig::Command {
                command,
                args,
                timeout_ms,
            } => {
                assert_eq!(command, "python3");
                assert_eq!(args.len(), 3);
                assert_eq!(*timeout_ms, 30_000);
            }
            ClassifierConfig::Lexicon => panic!("expected command classifier"),
        }
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(matches!(
            PipelineConfig::from_yaml("top_k: [1, 2]"),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        for yaml in [
            "top_k: 0",
            "workers: 0",
            "max_input_chars: 0",
            "fallback_confidence: 1.5",
            "fallback_label: ''",
        ] {
            let result = PipelineConfig::from_yaml(yaml);
            assert!(
                matches!(result, Err(ConfigError::InvalidValue { .. })),
                "{yaml} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "output_dir: out\nseed: 7\n").unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.seed, 7);
    }

    #[test]
    fn test_load_missing_file() {
        let result = PipelineConfig::load("/nonexistent/pipeline.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_classifier_from_command_line() {
        let config = ClassifierConfig::from_command_line("./model --json").unwrap();
        assert_eq!(
            config,
            ClassifierConfig::Command {
                command: "./model".to_string(),
                args: vec!["--json".to_string()],
                timeout_ms: 30_000,
            }
        );
        assert!(ClassifierConfig::from_command_line("   ").is_err());
    }

    #[test]
    fn test_derived_settings() {
        let config = PipelineConfig {
            workers: 3,
            top_k: 5,
            max_input_chars: 128,
            ..PipelineConfig::default()
        };
        assert_eq!(config.runner_config().workers, 3);
        assert_eq!(config.aggregate_options().top_k, 5);
        let adapter = config.adapter();
        assert_eq!(adapter.max_input_chars(), 128);
        assert_eq!(adapter.name(), "lexicon");
    }
}
