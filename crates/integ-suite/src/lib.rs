//! Test unit discovery and test suite model
//!
//! # Core Concepts
//!
//! - [`TestUnit`]: one discovered test file and its derived paths
//! - [`discover`]: language-preset or pattern based discovery
//! - [`TestSuite`]: declared (`integ.json`) or legacy-inferred test cases
//! - [`TestCase`] / [`TestOptions`]: per-case stacks, hooks and deploy/destroy options
//! - [`LegacySuite`]: inference from a `!cdk-integ` directive

#![warn(unreachable_pub)]

mod case;
mod discovery;
mod error;
mod legacy;
mod suite;
mod unit;

pub use case::{
    CdkCommandOptions, CommandAction, CommandOptions, ErrorExpectation, Hooks, TestCase,
    TestOptions,
};
pub use discovery::{discover, DiscoveryOptions, Language};
pub use error::{SuiteError, SuiteResult};
pub use legacy::{LegacyDirective, LegacySuite, ALL_STACKS, DIRECTIVE_MARKER, PRAGMA_PREFIX};
pub use suite::{
    IntegManifest, ManifestSuite, TestSuite, INTEG_MANIFEST_FILE, INTEG_MANIFEST_VERSION,
};
pub use unit::{TestUnit, DEFAULT_APP_COMMAND, FILE_PATH_PLACEHOLDER};
