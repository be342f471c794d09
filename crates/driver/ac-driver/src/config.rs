//! Compilation options and `Acorn.toml` loading

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "Acorn.toml";

/// Options of one compilation session
///
/// Every field may be set in `Acorn.toml`; command-line flags override the
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Module identifier written to the IR header
    pub module_name: String,
    /// Worker threads for per-unit checking and lowering; `None` uses every core
    pub jobs: Option<usize>,
    /// Where `build` writes the textual IR
    pub output: PathBuf,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "acorn".to_string(),
            jobs: None,
            output: PathBuf::from("build/output.ll"),
        }
    }
}

impl CompileOptions {
    /// Parses options from TOML text
    ///
    /// # Errors
    ///
    /// Fails on malformed TOML, unknown keys or mistyped values.
    pub fn from_toml(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text).context("invalid compile options")?;
        if options.jobs == Some(0) {
            anyhow::bail!("`jobs` must be at least 1");
        }
        Ok(options)
    }

    /// Reads options from a configuration file
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let options =
            Self::from_toml(&text).with_context(|| format!("in {}", path.display()))?;
        debug!("loaded options from {}: {options:?}", path.display());
        Ok(options)
    }

    /// Loads `Acorn.toml` from `dir`, or the defaults when there is none
    ///
    /// # Errors
    ///
    /// Fails only if the file exists but cannot be loaded.
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(CompileOptions::from_toml("").unwrap(), CompileOptions::default());
    }

    #[test]
    fn test_partial_override() {
        let options = CompileOptions::from_toml("module_name = \"demo\"\njobs = 2\n").unwrap();
        assert_eq!(options.module_name, "demo");
        assert_eq!(options.jobs, Some(2));
        assert_eq!(options.output, PathBuf::from("build/output.ll"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let error = CompileOptions::from_toml("backend = \"llvm\"").unwrap_err();
        assert!(format!("{error:#}").contains("backend"));
    }

    #[test]
    fn test_zero_jobs_rejected() {
        assert!(CompileOptions::from_toml("jobs = 0").is_err());
    }
}
