//! Runner configuration
//!
//! Settings come from an optional `integ.toml` and are then overridden by
//! command-line flags.

use crate::error::{IntegError, IntegResult};
use integ_suite::{DiscoveryOptions, Language};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name
pub const CONFIG_FILE: &str = "integ.toml";

/// Regions used when none are configured
pub const DEFAULT_REGIONS: [&str; 3] = ["us-east-1", "us-east-2", "us-west-2"];

/// Runner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Root directory searched for tests
    pub directory: PathBuf,
    /// Snapshot-phase parallelism
    pub max_workers: usize,
    /// Regions tests are deployed to
    pub parallel_regions: Vec<String>,
    /// Credential profiles tests are deployed with
    pub profiles: Vec<String>,
    /// Destroy stacks after deploying
    pub clean: bool,
    /// Synth only, never deploy
    pub dry_run: bool,
    /// Deploy the snapshot before the change
    pub update_workflow: bool,
    /// Verbosity level
    pub verbosity: u8,
    /// Keep output of failed snapshot tests
    pub inspect_failures: bool,
    /// Run integration tests for every unit
    pub force: bool,
    /// Run integration tests for units failing the snapshot phase
    pub update_on_failed: bool,
    /// Deployment CLI executable
    pub cdk_cli: String,
    /// Language presets
    pub language: Vec<String>,
    /// Custom test file patterns
    pub test_regex: Option<Vec<String>>,
    /// Custom app command template
    pub app: Option<String>,
    /// Tests to run
    pub tests: Option<Vec<String>>,
    /// Tests to skip
    pub exclude: Option<Vec<String>>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("test"),
            max_workers: std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
            parallel_regions: DEFAULT_REGIONS.iter().map(|r| (*r).to_string()).collect(),
            profiles: Vec::new(),
            clean: true,
            dry_run: false,
            update_workflow: true,
            verbosity: 0,
            inspect_failures: false,
            force: false,
            update_on_failed: false,
            cdk_cli: "cdk".to_string(),
            language: vec![
                "javascript".to_string(),
                "typescript".to_string(),
                "python".to_string(),
                "go".to_string(),
            ],
            test_regex: None,
            app: None,
            tests: None,
            exclude: None,
        }
    }
}

/// Values given on the command line; `None` keeps the configured value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    /// `--directory`
    pub directory: Option<PathBuf>,
    /// `--max-workers`
    pub max_workers: Option<usize>,
    /// `--parallel-regions`
    pub parallel_regions: Option<Vec<String>>,
    /// `--profiles`
    pub profiles: Option<Vec<String>>,
    /// `--no-clean`
    pub no_clean: bool,
    /// `--dry-run`
    pub dry_run: bool,
    /// `--disable-update-workflow`
    pub disable_update_workflow: bool,
    /// `--verbose` count
    pub verbosity: u8,
    /// `--inspect-failures`
    pub inspect_failures: bool,
    /// `--force`
    pub force: bool,
    /// `--update-on-failed`
    pub update_on_failed: bool,
    /// `--language`
    pub language: Option<Vec<String>>,
    /// `--test-regex`
    pub test_regex: Option<Vec<String>>,
    /// `--app`
    pub app: Option<String>,
    /// Positional test names
    pub tests: Option<Vec<String>>,
    /// `--exclude`
    pub exclude: Option<Vec<String>>,
}

impl RunnerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; a missing file yields the defaults
    ///
    /// # Errors
    /// IO errors other than "not found", and TOML errors
    pub fn load(path: impl AsRef<Path>) -> IntegResult<Self> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(IntegError::io_error(path, e)),
        };
        toml::from_str(&text)
            .map_err(|e| IntegError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply command-line overrides
    #[must_use]
    pub fn merge_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(directory) = cli.directory {
            self.directory = directory;
        }
        if let Some(max_workers) = cli.max_workers {
            self.max_workers = max_workers;
        }
        if let Some(regions) = cli.parallel_regions {
            self.parallel_regions = regions;
        }
        if let Some(profiles) = cli.profiles {
            self.profiles = profiles;
        }
        self.clean &= !cli.no_clean;
        self.dry_run |= cli.dry_run;
        self.update_workflow &= !cli.disable_update_workflow;
        self.verbosity = self.verbosity.max(cli.verbosity);
        self.inspect_failures |= cli.inspect_failures;
        self.force |= cli.force;
        self.update_on_failed |= cli.update_on_failed;
        if let Some(language) = cli.language {
            self.language = language;
        }
        if cli.test_regex.is_some() {
            self.test_regex = cli.test_regex;
        }
        if cli.app.is_some() {
            self.app = cli.app;
        }
        if cli.tests.is_some() {
            self.tests = cli.tests;
        }
        if cli.exclude.is_some() {
            self.exclude = cli.exclude;
        }
        self
    }

    /// Validate values that serde cannot
    ///
    /// # Errors
    /// `Config` for an empty region list or zero workers
    pub fn validate(&self) -> IntegResult<()> {
        if self.parallel_regions.is_empty() {
            return Err(IntegError::Config("at least one region is required".to_string()));
        }
        if self.max_workers == 0 {
            return Err(IntegError::Config("max_workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Discovery options for this configuration
    ///
    /// # Errors
    /// `Suite(UnknownLanguage)` for an unknown language preset
    pub fn discovery_options(&self) -> IntegResult<DiscoveryOptions> {
        let languages = self
            .language
            .iter()
            .map(|l| l.parse::<Language>())
            .collect::<Result<Vec<_>, _>>()?;
        let mut options = DiscoveryOptions::new().with_languages(languages);
        if let Some(patterns) = &self.test_regex {
            options = options.with_test_regex(patterns.clone());
        }
        if let Some(app) = &self.app {
            options = options.with_app(app.clone());
        }
        if let Some(tests) = &self.tests {
            options = options.with_tests(tests.clone());
        }
        if let Some(exclude) = &self.exclude {
            options = options.with_exclude(exclude.clone());
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.directory, PathBuf::from("test"));
        assert_eq!(config.parallel_regions.len(), 3);
        assert!(config.clean);
        assert!(config.update_workflow);
        assert!(!config.dry_run);
        assert!(config.max_workers >= 1);
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RunnerConfig::load(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, RunnerConfig::default());
    }

    #[test]
    fn loads_partial_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            "directory = \"integ\"\nparallel_regions = [\"eu-west-1\"]\nclean = false\n",
        )
        .unwrap();
        let config = RunnerConfig::load(&path).unwrap();
        assert_eq!(config.directory, PathBuf::from("integ"));
        assert_eq!(config.parallel_regions, vec!["eu-west-1".to_string()]);
        assert!(!config.clean);
        assert_eq!(config.cdk_cli, "cdk");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "paralel_regions = []\n").unwrap();
        assert!(matches!(RunnerConfig::load(&path), Err(IntegError::Config(_))));
    }

    #[test]
    fn cli_overrides_config() {
        let config = RunnerConfig::default().merge_cli(CliOverrides {
            parallel_regions: Some(vec!["ap-south-1".to_string()]),
            no_clean: true,
            disable_update_workflow: true,
            verbosity: 2,
            tests: Some(vec!["integ.a".to_string()]),
            ..CliOverrides::default()
        });
        assert_eq!(config.parallel_regions, vec!["ap-south-1".to_string()]);
        assert!(!config.clean);
        assert!(!config.update_workflow);
        assert_eq!(config.verbosity, 2);

        let options = config.discovery_options().unwrap();
        assert_eq!(options.tests, vec!["integ.a".to_string()]);
        assert_eq!(options.languages.len(), 4);
    }

    #[test]
    fn unknown_language_is_an_error() {
        let config = RunnerConfig {
            language: vec!["cobol".to_string()],
            ..RunnerConfig::default()
        };
        assert!(config.discovery_options().is_err());
    }

    #[test]
    fn empty_regions_are_invalid() {
        let config = RunnerConfig {
            parallel_regions: Vec::new(),
            ..RunnerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
