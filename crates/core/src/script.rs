//! Script files, run options, and script discovery.

use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::CoreError;

/// Extension (case-insensitive) of files picked up by [`discover_scripts`].
pub const SCRIPT_EXTENSION: &str = "sql";

/// Name of the directory failed scripts are copied into when no explicit
/// directory is configured. Created beside the failing script.
pub const DEFAULT_FAILED_SCRIPTS_DIR_NAME: &str = "Failed Scripts";

/// A script queued for execution. Identity is the path.
#[derive(Debug, Clone, Serialize)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub display_name: String,
    /// Size in bytes when the file was discovered, if it was known then.
    pub size_bytes: Option<u64>,
}

impl ScriptFile {
    /// Script with no size information, named after its file name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path,
            display_name,
            size_bytes: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }
}

impl PartialEq for ScriptFile {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ScriptFile {}

impl Hash for ScriptFile {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

/// Per-run behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// Skip scripts that do not define a procedure or function.
    pub only_run_procedure_or_function_scripts: bool,
    /// Copy each failed script into the failed-scripts directory.
    pub copy_failed_scripts: bool,
    /// Where failed scripts go. `None` means a `Failed Scripts` directory
    /// beside each script.
    pub failed_scripts_directory: Option<PathBuf>,
}

impl RunOptions {
    /// Directory a failed `script` should be copied into.
    pub fn failed_scripts_dir_for(&self, script: &ScriptFile) -> PathBuf {
        match &self.failed_scripts_directory {
            Some(dir) => dir.clone(),
            None => script
                .path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(DEFAULT_FAILED_SCRIPTS_DIR_NAME),
        }
    }
}

/// Enumerate `*.sql` files under `dir`, recursing only when
/// `include_subdirectories` is set. Results are sorted by path.
pub fn discover_scripts(
    dir: &Path,
    include_subdirectories: bool,
) -> Result<Vec<ScriptFile>, CoreError> {
    if !dir.is_dir() {
        return Err(CoreError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let max_depth = if include_subdirectories { usize::MAX } else { 1 };
    let mut scripts = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = entry.map_err(|e| CoreError::Io {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory loop detected")),
        })?;

        if !entry.file_type().is_file() || !has_script_extension(entry.path()) {
            continue;
        }

        let mut script = ScriptFile::new(entry.path());
        if let Ok(metadata) = entry.metadata() {
            script = script.with_size(metadata.len());
        }
        scripts.push(script);
    }

    scripts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(scripts)
}

fn has_script_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(SCRIPT_EXTENSION))
        .unwrap_or(false)
}

/// Decode script bytes, honouring a UTF-8 or UTF-16 byte-order mark.
/// Without a BOM the bytes are read as UTF-8, replacing invalid sequences.
pub fn decode_script(bytes: &[u8]) -> String {
    match bytes {
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}
