//! Discoverable test unit

use std::path::{Component, Path, PathBuf};

/// App command used when none is configured
pub const DEFAULT_APP_COMMAND: &str = "node {filePath}";

/// Placeholder replaced by the test file name in app commands
pub const FILE_PATH_PLACEHOLDER: &str = "{filePath}";

/// Suffix of snapshot directories
pub const SNAPSHOT_SUFFIX: &str = ".snapshot";

/// Prefix of temporary synth output directories
pub const TEMP_OUTPUT_PREFIX: &str = "cdk-integ.out.";

/// One discovered test file and the paths derived from it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestUnit {
    file_name: PathBuf,
    discovery_root: PathBuf,
    app_command: String,
    directory: PathBuf,
    normalized_test_name: String,
    snapshot_dir: PathBuf,
    temporary_output_dir: PathBuf,
}

impl TestUnit {
    /// Create a unit for `file_name` found under `discovery_root`
    ///
    /// `app_command` may contain `{filePath}`; [`DEFAULT_APP_COMMAND`] is
    /// used when absent.
    #[must_use]
    pub fn new(
        file_name: impl Into<PathBuf>,
        discovery_root: impl Into<PathBuf>,
        app_command: Option<String>,
    ) -> Self {
        let file_name = file_name.into();
        let discovery_root = discovery_root.into();
        let directory = file_name
            .parent()
            .map_or_else(PathBuf::new, Path::to_path_buf);
        let base = file_name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let relative = file_name
            .strip_prefix(&discovery_root)
            .unwrap_or(&file_name)
            .with_extension("");
        let normalized_test_name = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        Self {
            snapshot_dir: directory.join(format!("{base}{SNAPSHOT_SUFFIX}")),
            temporary_output_dir: directory.join(format!("{TEMP_OUTPUT_PREFIX}{base}{SNAPSHOT_SUFFIX}")),
            app_command: app_command.unwrap_or_else(|| DEFAULT_APP_COMMAND.to_string()),
            file_name,
            discovery_root,
            directory,
            normalized_test_name,
        }
    }

    /// Path of the test file
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &Path {
        &self.file_name
    }

    /// Root the unit was discovered under
    #[inline]
    #[must_use]
    pub fn discovery_root(&self) -> &Path {
        &self.discovery_root
    }

    /// Directory containing the test file
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Relative path without extension, `/`-separated
    #[inline]
    #[must_use]
    pub fn normalized_test_name(&self) -> &str {
        &self.normalized_test_name
    }

    /// Committed snapshot directory
    #[inline]
    #[must_use]
    pub fn snapshot_dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Scratch output directory for synth and deploy
    #[inline]
    #[must_use]
    pub fn temporary_output_dir(&self) -> &Path {
        &self.temporary_output_dir
    }

    /// Base name of the test file
    #[must_use]
    pub fn base_name(&self) -> String {
        self.file_name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// App command template as configured
    #[inline]
    #[must_use]
    pub fn app_command_template(&self) -> &str {
        &self.app_command
    }

    /// App command with `{filePath}` resolved, run from [`Self::directory`]
    #[must_use]
    pub fn app_command(&self) -> String {
        self.app_command
            .replace(FILE_PATH_PLACEHOLDER, &self.base_name())
    }

    /// Whether a snapshot has been committed
    #[must_use]
    pub fn has_snapshot(&self) -> bool {
        self.snapshot_dir.is_dir()
    }

    /// Whether `name` refers to this unit
    ///
    /// Matches the file name, the path relative to the root, or the
    /// normalized name.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        let relative = self
            .file_name
            .strip_prefix(&self.discovery_root)
            .unwrap_or(&self.file_name);
        self.base_name() == name
            || relative == Path::new(name)
            || self.file_name == Path::new(name)
            || self.normalized_test_name == name
    }
}
