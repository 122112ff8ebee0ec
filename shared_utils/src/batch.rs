//! Batch Discovery Module
//!
//! Walks the input tree, pairs every recognized video with its mirrored
//! destination under the output root, and builds the filename mapping used to
//! restore original names after encoding. Runs single-threaded, before any
//! worker is started.

use crate::conversion_types::TaskResult;
use crate::errors::{CompressError, Result};
use crate::naming::{
    file_name_with_extension, normalize_output_path, sanitize, FilenameMapping, TARGET_EXTENSION,
};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Recognized input containers (lowercase, without the dot).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "wmv"];

/// One discovered video paired with its destination.
///
/// `output_path` keeps the source extension; see [`WorkItem::normalized_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub original_stem: OsString,
}

impl WorkItem {
    pub fn normalized_output(&self) -> PathBuf {
        normalize_output_path(&self.output_path)
    }
}

/// A file whose natural destination was already claimed by an earlier file in
/// the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameCollision {
    pub input_path: PathBuf,
    pub requested: PathBuf,
    pub assigned: PathBuf,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub items: Vec<WorkItem>,
    /// Every directory under the output root, parents before children.
    pub directories: Vec<PathBuf>,
    pub mapping: FilenameMapping,
    pub collisions: Vec<NameCollision>,
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// `{input_dir}_compressed`, next to the input directory.
///
/// Trailing separators are dropped first, so `videos/` still yields a sibling.
pub fn default_output_dir(input_dir: &Path) -> PathBuf {
    let trimmed: PathBuf = input_dir.components().collect();
    let mut name = trimmed.into_os_string();
    name.push("_compressed");
    PathBuf::from(name)
}

/// Names already taken in the output tree, compared case-insensitively so that
/// case-folding filesystems cannot merge two outputs.
#[derive(Default)]
struct ClaimedNames(HashSet<Vec<u8>>);

impl ClaimedNames {
    fn key(path: &Path) -> Vec<u8> {
        match path.to_str() {
            Some(s) => s.to_lowercase().into_bytes(),
            None => path.as_os_str().as_encoded_bytes().to_ascii_lowercase(),
        }
    }

    fn is_free(&self, path: &Path) -> bool {
        !self.0.contains(&Self::key(path))
    }

    fn claim(&mut self, path: &Path) {
        self.0.insert(Self::key(path));
    }
}

struct Placement {
    output_path: PathBuf,
    normalized: PathBuf,
    restored: PathBuf,
    stem: OsString,
}

fn place(out_dir: &Path, stem: OsString, ext: &str) -> Placement {
    let output_path = out_dir.join(file_name_with_extension(&sanitize(&stem), ext));
    let normalized = normalize_output_path(&output_path);
    let restored = out_dir.join(file_name_with_extension(&stem, TARGET_EXTENSION));
    Placement {
        output_path,
        normalized,
        restored,
        stem,
    }
}

/// Picks a destination for one file, disambiguating against earlier claims.
///
/// First choice keeps the original stem. On collision the stem becomes
/// `{stem}_{ext}`, then `{stem}_{ext}_{n}` for n = 2, 3, ...
fn assign_placement(claimed: &ClaimedNames, out_dir: &Path, stem: &OsStr, ext: &str) -> Placement {
    let ext_lower = ext.to_lowercase();
    let mut attempt = 0usize;
    loop {
        let mut candidate = stem.to_os_string();
        match attempt {
            0 => {}
            1 => candidate.push(format!("_{}", ext_lower)),
            n => candidate.push(format!("_{}_{}", ext_lower, n)),
        }
        let placement = place(out_dir, candidate, ext);
        if claimed.is_free(&placement.normalized) && claimed.is_free(&placement.restored) {
            return placement;
        }
        attempt += 1;
    }
}

/// Recursively discovers work under `input_root`.
///
/// Entries are visited in file-name order so that collision handling is
/// deterministic. A missing root is an error; an empty result is not.
pub fn discover(input_root: &Path, output_root: &Path, extensions: &[&str]) -> Result<Discovery> {
    if !input_root.exists() {
        return Err(CompressError::InputNotFound(input_root.to_path_buf()));
    }
    if !input_root.is_dir() {
        return Err(CompressError::InputNotDirectory(input_root.to_path_buf()));
    }

    let input_root = std::path::absolute(input_root)?;
    let output_root = std::path::absolute(output_root)?;

    let mut discovery = Discovery::default();
    let mut claimed = ClaimedNames::default();

    let walker = WalkDir::new(&input_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.path().starts_with(&output_root));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                let path = source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| input_root.clone());
                return Err(CompressError::Walk { path, source });
            }
        };

        let Ok(relative) = entry.path().strip_prefix(&input_root) else {
            continue;
        };

        if entry.file_type().is_dir() {
            discovery.directories.push(output_root.join(relative));
            continue;
        }

        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file || !has_extension(entry.path(), extensions) {
            continue;
        }

        // Recognized extensions are ASCII, so only the stem can be undecodable.
        let (Some(stem), Some(ext)) = (
            entry.path().file_stem(),
            entry.path().extension().and_then(OsStr::to_str),
        ) else {
            continue;
        };

        let out_dir = match relative.parent() {
            Some(parent) => output_root.join(parent),
            None => output_root.clone(),
        };

        let placement = assign_placement(&claimed, &out_dir, stem, ext);
        claimed.claim(&placement.normalized);
        claimed.claim(&placement.restored);

        if placement.stem.as_os_str() != stem {
            let requested = out_dir.join(file_name_with_extension(stem, TARGET_EXTENSION));
            warn!(
                input = %entry.path().display(),
                requested = %requested.display(),
                assigned = %placement.restored.display(),
                "Output name already claimed, disambiguating"
            );
            discovery.collisions.push(NameCollision {
                input_path: entry.path().to_path_buf(),
                requested,
                assigned: placement.restored.clone(),
            });
        }

        discovery
            .mapping
            .register_mapping(&placement.normalized, placement.stem.clone());

        debug!(
            input = %entry.path().display(),
            output = %placement.normalized.display(),
            "Discovered video"
        );

        discovery.items.push(WorkItem {
            input_path: entry.path().to_path_buf(),
            output_path: placement.output_path,
            original_stem: placement.stem,
        });
    }

    Ok(discovery)
}

/// Creates every mirrored directory. Existing directories are fine.
pub fn create_directory_structure(directories: &[PathBuf]) -> Result<()> {
    for dir in directories {
        std::fs::create_dir_all(dir).map_err(|source| CompressError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        debug!(dir = %dir.display(), "Created directory");
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchResult {
    pub fn new() -> Self {
        Self {
            total: 0,
            succeeded: 0,
            failed: 0,
            input_bytes: 0,
            output_bytes: 0,
            errors: Vec::new(),
        }
    }

    pub fn from_results(results: &[TaskResult]) -> Self {
        let mut batch = Self::new();
        for result in results {
            batch.record(result);
        }
        batch
    }

    pub fn record(&mut self, result: &TaskResult) {
        if result.success {
            self.success(result.input_size, result.output_size.unwrap_or(0));
        } else {
            self.fail(
                result.input_path.clone(),
                result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            );
        }
    }

    pub fn success(&mut self, input_bytes: u64, output_bytes: u64) {
        self.total += 1;
        self.succeeded += 1;
        self.input_bytes += input_bytes;
        self.output_bytes += output_bytes;
    }

    pub fn fail(&mut self, path: PathBuf, error: String) {
        self.total += 1;
        self.failed += 1;
        self.errors.push((path, error));
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

impl Default for BatchResult {
    fn default() -> Self {
        Self::new()
    }
}
