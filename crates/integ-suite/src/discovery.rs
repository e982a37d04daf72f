//! Test unit discovery
//!
//! Walks a directory tree and turns every file matching a language preset
//! (or a custom pattern) into a [`TestUnit`].

use crate::error::{SuiteError, SuiteResult};
use crate::unit::{TestUnit, DEFAULT_APP_COMMAND, SNAPSHOT_SUFFIX, TEMP_OUTPUT_PREFIX};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Directory names never descended into
const SKIPPED_DIRECTORIES: &[&str] = &["node_modules", "cdk.out"];

/// Test language preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// `integ.*.js`
    Javascript,
    /// `integ.*.ts`, declaration files excluded
    Typescript,
    /// `integ_*.py`
    Python,
    /// `integ_*.go`
    Go,
}

impl Language {
    /// Every preset
    pub const ALL: [Self; 4] = [Self::Javascript, Self::Typescript, Self::Python, Self::Go];

    /// File name pattern of the preset
    #[must_use]
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Javascript => r"^integ\..*\.js$",
            Self::Typescript => r"^integ\..*\.ts$",
            Self::Python => r"^integ_.*\.py$",
            Self::Go => r"^integ_.*\.go$",
        }
    }

    /// App command of the preset
    #[must_use]
    pub fn app_command(self) -> &'static str {
        match self {
            Self::Javascript => "node {filePath}",
            Self::Typescript => "node -r ts-node/register {filePath}",
            Self::Python => "python {filePath}",
            Self::Go => "go run {filePath}",
        }
    }

    fn accepts(self, file_name: &str) -> bool {
        // regex has no lookbehind; `.d.ts` is excluded here instead
        !(self == Self::Typescript && file_name.ends_with(".d.ts"))
    }
}

impl FromStr for Language {
    type Err = SuiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Ok(Self::Javascript),
            "typescript" | "ts" => Ok(Self::Typescript),
            "python" | "py" => Ok(Self::Python),
            "go" => Ok(Self::Go),
            _ => Err(SuiteError::UnknownLanguage(s.to_string())),
        }
    }
}

#[derive(Debug)]
struct Matcher {
    regex: Regex,
    language: Option<Language>,
    app_command: String,
}

/// Discovery options
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryOptions {
    /// Language presets used when no custom pattern is set
    pub languages: Vec<Language>,
    /// Custom file name patterns (override the presets)
    pub test_regex: Vec<String>,
    /// Custom app command template
    pub app: Option<String>,
    /// Keep only units matching these names
    pub tests: Vec<String>,
    /// Drop units matching these names
    pub exclude: Vec<String>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            languages: Language::ALL.to_vec(),
            test_regex: Vec::new(),
            app: None,
            tests: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl DiscoveryOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set language presets
    #[inline]
    #[must_use]
    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    /// Set custom patterns
    #[inline]
    #[must_use]
    pub fn with_test_regex(mut self, patterns: Vec<String>) -> Self {
        self.test_regex = patterns;
        self
    }

    /// Set custom app command
    #[inline]
    #[must_use]
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    /// Keep only matching units
    #[inline]
    #[must_use]
    pub fn with_tests(mut self, tests: Vec<String>) -> Self {
        self.tests = tests;
        self
    }

    /// Drop matching units
    #[inline]
    #[must_use]
    pub fn with_exclude(mut self, exclude: Vec<String>) -> Self {
        self.exclude = exclude;
        self
    }

    fn matchers(&self) -> SuiteResult<Vec<Matcher>> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| SuiteError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
        };

        if self.test_regex.is_empty() {
            self.languages
                .iter()
                .map(|&language| {
                    Ok(Matcher {
                        regex: compile(language.pattern())?,
                        language: Some(language),
                        app_command: self
                            .app
                            .clone()
                            .unwrap_or_else(|| language.app_command().to_string()),
                    })
                })
                .collect()
        } else {
            let app_command = self
                .app
                .clone()
                .unwrap_or_else(|| DEFAULT_APP_COMMAND.to_string());
            self.test_regex
                .iter()
                .map(|pattern| {
                    Ok(Matcher {
                        regex: compile(pattern)?,
                        language: None,
                        app_command: app_command.clone(),
                    })
                })
                .collect()
        }
    }
}

/// Discover test units under `root`, sorted by path
///
/// # Errors
/// - `InvalidPattern` for a bad custom pattern
/// - `NoMatchingTests` if requested names match nothing
/// - `Io` if the tree cannot be read
pub fn discover(root: impl AsRef<Path>, options: &DiscoveryOptions) -> SuiteResult<Vec<TestUnit>> {
    let root = root.as_ref();
    let matchers = options.matchers()?;

    let mut files = Vec::new();
    walk(root, &mut files)?;
    files.sort();

    let mut units: Vec<TestUnit> = files
        .into_iter()
        .filter_map(|path| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let matcher = matchers.iter().find(|m| {
                m.regex.is_match(&name) && m.language.map_or(true, |l| l.accepts(&name))
            })?;
            Some(TestUnit::new(path, root, Some(matcher.app_command.clone())))
        })
        .collect();

    if !options.tests.is_empty() {
        let missing: Vec<String> = options
            .tests
            .iter()
            .filter(|name| !units.iter().any(|u| u.matches(name)))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(SuiteError::NoMatchingTests(missing));
        }
        units.retain(|u| options.tests.iter().any(|name| u.matches(name)));
    }

    if !options.exclude.is_empty() {
        units.retain(|u| !options.exclude.iter().any(|name| u.matches(name)));
    }

    tracing::info!(root = %root.display(), count = units.len(), "discovered test units");
    Ok(units)
}

fn walk(directory: &Path, files: &mut Vec<PathBuf>) -> SuiteResult<()> {
    let entries = fs::read_dir(directory).map_err(|e| SuiteError::io_error(directory, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| SuiteError::io_error(directory, e))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .map_err(|e| SuiteError::io_error(&path, e))?;
        if file_type.is_dir() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_skipped_directory(&name) {
                walk(&path, files)?;
            }
        } else if file_type.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn is_skipped_directory(name: &str) -> bool {
    name.starts_with('.')
        || SKIPPED_DIRECTORIES.contains(&name)
        || name.ends_with(SNAPSHOT_SUFFIX)
        || name.starts_with(TEMP_OUTPUT_PREFIX.trim_end_matches('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn names(units: &[TestUnit]) -> Vec<String> {
        units.iter().map(|u| u.normalized_test_name().to_string()).collect()
    }

    #[test]
    fn language_from_str() {
        assert_eq!("TypeScript".parse::<Language>().unwrap(), Language::Typescript);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn discovers_presets_and_skips_directories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "integ.a.js");
        touch(dir.path(), "sub/integ.b.ts");
        touch(dir.path(), "sub/integ.b.d.ts");
        touch(dir.path(), "py/integ_c.py");
        touch(dir.path(), "node_modules/integ.x.js");
        touch(dir.path(), ".hidden/integ.y.js");
        touch(dir.path(), "integ.a.js.snapshot/integ.z.js");
        touch(dir.path(), "cdk-integ.out.integ.a.js.snapshot/integ.w.js");
        touch(dir.path(), "helper.js");

        let units = discover(dir.path(), &DiscoveryOptions::new()).unwrap();
        assert_eq!(names(&units), vec!["integ.a", "py/integ_c", "sub/integ.b"]);
        assert_eq!(units[1].app_command(), "python integ_c.py");
    }

    #[test]
    fn custom_pattern_overrides_presets() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "integ.a.js");
        touch(dir.path(), "test-main.sh");
        let options = DiscoveryOptions::new()
            .with_test_regex(vec![r"^test-.*\.sh$".to_string()])
            .with_app("bash {filePath}");
        let units = discover(dir.path(), &options).unwrap();
        assert_eq!(names(&units), vec!["test-main"]);
        assert_eq!(units[0].app_command(), "bash test-main.sh");
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let dir = TempDir::new().unwrap();
        let options = DiscoveryOptions::new().with_test_regex(vec!["(".to_string()]);
        assert!(matches!(
            discover(dir.path(), &options),
            Err(SuiteError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn name_filter_and_exclude() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "integ.a.js");
        touch(dir.path(), "integ.b.js");

        let only_a = DiscoveryOptions::new().with_tests(vec!["integ.a.js".to_string()]);
        assert_eq!(names(&discover(dir.path(), &only_a).unwrap()), vec!["integ.a"]);

        let not_a = DiscoveryOptions::new().with_exclude(vec!["integ.a".to_string()]);
        assert_eq!(names(&discover(dir.path(), &not_a).unwrap()), vec!["integ.b"]);

        let missing = DiscoveryOptions::new().with_tests(vec!["integ.c.js".to_string()]);
        assert!(matches!(
            discover(dir.path(), &missing),
            Err(SuiteError::NoMatchingTests(names)) if names == vec!["integ.c.js".to_string()]
        ));
    }
}
