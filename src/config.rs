use crate::error::TplError;
use path_clean::PathClean;
use std::path::{Path, PathBuf};

/// Environment variable holding the template glob
pub const GLOB_VAR: &str = "TPL_GLOB";
/// Environment variable enabling streaming mode when set to "1"
pub const STREAM_VAR: &str = "STREAM";

/// Process-wide settings, read once before any template is loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessConfig {
    /// Absolute glob pattern matching the template files
    pub glob: PathBuf,
    /// Render once per element of a JSON array on stdin instead of from flags
    pub streaming: bool,
}

impl ProcessConfig {
    /// Load the configuration from the process environment
    pub fn from_env() -> Result<Self, TplError> {
        let cwd = std::env::current_dir()?;
        Self::from_lookup(&cwd, |key| std::env::var(key).ok())
    }

    /// Load the configuration through `lookup`, resolving a relative glob against `cwd`
    pub fn from_lookup<F>(cwd: &Path, lookup: F) -> Result<Self, TplError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let glob = lookup(GLOB_VAR)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| TplError::Config {
                var: GLOB_VAR.to_string(),
            })?;

        let streaming = lookup(STREAM_VAR).as_deref() == Some("1");

        Ok(Self {
            glob: absolute_glob(cwd, &glob),
            streaming,
        })
    }

    /// The glob as a string pattern for the loader
    pub fn glob_pattern(&self) -> String {
        self.glob.to_string_lossy().into_owned()
    }
}

/// Resolve a glob pattern to an absolute, lexically cleaned path
fn absolute_glob(cwd: &Path, pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    if path.is_absolute() {
        path.clean()
    } else {
        cwd.join(path).clean()
    }
}
