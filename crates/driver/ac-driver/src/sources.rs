//! Loading serialized units and their source text

use ac_ast::SourceUnit;
use ac_span::FileId;
use anyhow::{Context, Result};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// Source text of a unit, used only for rendering diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path shown in reports
    pub path: PathBuf,
    /// Full text
    pub text: String,
}

/// Source text by unit name
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: FxHashMap<String, SourceFile>,
}

impl SourceMap {
    /// Records the text of `unit`
    pub fn insert(&mut self, unit: &str, path: PathBuf, text: String) {
        self.files.insert(unit.to_string(), SourceFile { path, text });
    }

    /// Text of `unit`, if known
    #[must_use]
    pub fn get(&self, unit: &str) -> Option<&SourceFile> {
        self.files.get(unit)
    }

    /// Number of units with known text
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether no text is known
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Units read from disk, with whatever source text they point at
#[derive(Debug, Clone, Default)]
pub struct LoadedUnits {
    /// Units in argument order; unit `i` uses `FileId(i)`
    pub units: Vec<SourceUnit>,
    /// Source text for diagnostics
    pub sources: SourceMap,
}

/// Reads JSON-serialized units
///
/// The `path` recorded in a unit is resolved relative to its JSON file. A
/// missing source file only degrades diagnostics and is logged.
///
/// # Errors
///
/// Fails if a unit file cannot be read or is not a valid unit.
pub fn load_units(paths: &[PathBuf]) -> Result<LoadedUnits> {
    let mut loaded = LoadedUnits::default();
    for (index, path) in paths.iter().enumerate() {
        let mut unit = read_unit(path)?;
        unit.file = FileId(index as u32);

        if let Some(source) = &unit.path {
            let source = match path.parent() {
                Some(dir) => dir.join(source),
                None => source.clone(),
            };
            match std::fs::read_to_string(&source) {
                Ok(text) => loaded.sources.insert(&unit.name, source, text),
                Err(error) => warn!("cannot read source of `{}` at {}: {error}", unit.name, source.display()),
            }
        }

        debug!("loaded unit `{}` ({} items) from {}", unit.name, unit.items.len(), path.display());
        loaded.units.push(unit);
    }
    Ok(loaded)
}

fn read_unit(path: &Path) -> Result<SourceUnit> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid unit", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_assigns_file_ids_and_reads_text() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = SourceUnit::new("main", FileId(7));
        unit.path = Some(PathBuf::from("main.acorn"));
        std::fs::write(dir.path().join("main.json"), serde_json::to_string(&unit).unwrap()).unwrap();
        std::fs::write(dir.path().join("main.acorn"), "fn main() {}").unwrap();
        let other = SourceUnit::new("util", FileId(0));
        std::fs::write(dir.path().join("util.json"), serde_json::to_string(&other).unwrap()).unwrap();

        let loaded =
            load_units(&[dir.path().join("main.json"), dir.path().join("util.json")]).unwrap();
        assert_eq!(loaded.units[0].file, FileId(0));
        assert_eq!(loaded.units[1].file, FileId(1));
        assert_eq!(loaded.sources.len(), 1);
        assert_eq!(loaded.sources.get("main").unwrap().text, "fn main() {}");
    }

    #[test]
    fn test_invalid_json_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let error = load_units(&[path]).unwrap_err();
        assert!(error.to_string().contains("broken.json"));
    }

    #[test]
    fn test_missing_source_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut unit = SourceUnit::new("main", FileId(0));
        unit.path = Some(PathBuf::from("gone.acorn"));
        let path = dir.path().join("main.json");
        std::fs::write(&path, serde_json::to_string(&unit).unwrap()).unwrap();

        let loaded = load_units(&[path]).unwrap();
        assert_eq!(loaded.units.len(), 1);
        assert!(loaded.sources.is_empty());
    }
}
