//! Naming / path mapping
//!
//! Output files are written under a sanitized name and renamed back to the
//! human-readable original once the encoder has finished. `FilenameMapping`
//! is the reverse lookup used for that rename.
//!
//! Names stay `OsStr` end to end: a file name that is not valid UTF-8 keeps
//! its exact bytes through sanitizing, the encoder command line and the final
//! rename.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Container extension every output is normalized to.
pub const TARGET_EXTENSION: &str = "mp4";

const SUBSTITUTE: char = '_';

fn is_disallowed(c: char) -> bool {
    c.is_whitespace() || c.is_control()
}

fn sanitize_str(name: &str) -> Cow<'_, str> {
    if name.chars().any(is_disallowed) {
        Cow::Owned(
            name.chars()
                .map(|c| if is_disallowed(c) { SUBSTITUTE } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(name)
    }
}

/// Replaces whitespace and control characters with `_`.
///
/// Bytes that do not decode are copied through untouched. The substitute is
/// itself allowed, so `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize<S: AsRef<OsStr> + ?Sized>(name: &S) -> Cow<'_, OsStr> {
    let name = name.as_ref();
    match name.to_str() {
        Some(s) => match sanitize_str(s) {
            Cow::Borrowed(_) => Cow::Borrowed(name),
            Cow::Owned(owned) => Cow::Owned(OsString::from(owned)),
        },
        None => sanitize_undecodable(name),
    }
}

#[cfg(unix)]
fn sanitize_undecodable(name: &OsStr) -> Cow<'_, OsStr> {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};

    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.extend_from_slice(sanitize_str(chunk.valid()).as_bytes());
        out.extend_from_slice(chunk.invalid());
    }
    if out == bytes {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(OsString::from_vec(out))
    }
}

#[cfg(windows)]
fn sanitize_undecodable(name: &OsStr) -> Cow<'_, OsStr> {
    use std::os::windows::ffi::{OsStrExt, OsStringExt};

    let mut wide = Vec::new();
    for unit in char::decode_utf16(name.encode_wide()) {
        match unit {
            Ok(c) => {
                let c = if is_disallowed(c) { SUBSTITUTE } else { c };
                let mut buf = [0u16; 2];
                wide.extend_from_slice(c.encode_utf16(&mut buf));
            }
            Err(e) => wide.push(e.unpaired_surrogate()),
        }
    }
    Cow::Owned(OsString::from_wide(&wide))
}

#[cfg(not(any(unix, windows)))]
fn sanitize_undecodable(name: &OsStr) -> Cow<'_, OsStr> {
    Cow::Owned(OsString::from(sanitize_str(&name.to_string_lossy()).into_owned()))
}

/// `stem` + `.` + `ext`
pub fn file_name_with_extension(stem: &OsStr, ext: &str) -> OsString {
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(ext);
    name
}

/// `dir/clip.mkv` -> `dir/clip.mp4`
pub fn normalize_output_path(path: &Path) -> PathBuf {
    path.with_extension(TARGET_EXTENSION)
}

/// Renders a path for use as a command-line argument.
///
/// FFmpeg does not accept `--` as an end-of-options marker, so relative paths
/// starting with `-` get a `./` prefix to keep them from being parsed as flags.
pub fn safe_path_arg(path: &Path) -> Cow<'_, OsStr> {
    let raw = path.as_os_str();
    if raw.as_encoded_bytes().first() == Some(&b'-') {
        let mut prefixed = OsString::from("./");
        prefixed.push(raw);
        Cow::Owned(prefixed)
    } else {
        Cow::Borrowed(raw)
    }
}

/// Reverse lookup from normalized (sanitized) output path to original stem.
///
/// Built single-threaded during discovery, then shared read-only with every
/// worker. Entries are never removed after dispatch: each work item is
/// consumed exactly once, so a stale entry cannot be hit twice.
#[derive(Debug, Clone, Default)]
pub struct FilenameMapping {
    entries: HashMap<PathBuf, OsString>,
}

impl FilenameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites. The last registration for a key wins and the
    /// replaced stem is returned.
    pub fn register_mapping(
        &mut self,
        output_path: impl Into<PathBuf>,
        original_stem: impl Into<OsString>,
    ) -> Option<OsString> {
        let output_path = output_path.into();
        let original_stem = original_stem.into();
        let previous = self.entries.insert(output_path.clone(), original_stem);
        if let Some(ref prev) = previous {
            debug!(
                output = %output_path.display(),
                replaced = ?prev,
                "Filename mapping overwritten"
            );
        }
        previous
    }

    pub fn resolve_original_name(&self, output_path: &Path) -> Option<&OsStr> {
        self.entries.get(output_path).map(OsString::as_os_str)
    }

    pub fn remove(&mut self, output_path: &Path) -> Option<OsString> {
        self.entries.remove(output_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }
}

/// Where the file for `output_path` should end up after a successful encode.
///
/// Returns `None` when no rename is needed.
pub fn restored_path(mapping: &FilenameMapping, output_path: &Path) -> Option<PathBuf> {
    let stem = mapping.resolve_original_name(output_path)?;
    let target = output_path.with_file_name(file_name_with_extension(stem, TARGET_EXTENSION));
    if target == output_path {
        None
    } else {
        Some(target)
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_sanitize_idempotent(name in "\\PC*") {
            let once = sanitize(&name).into_owned();
            let twice = sanitize(&once).into_owned();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_sanitize_preserves_char_count(name in "[a-zA-Z0-9 ._\\-]{0,64}") {
            let sanitized = sanitize(&name).into_owned().into_string().unwrap();
            prop_assert_eq!(sanitized.chars().count(), name.chars().count());
        }

        #[test]
        fn prop_sanitize_output_has_no_whitespace(name in "\\PC*") {
            let sanitized = sanitize(&name).into_owned().into_string().unwrap();
            prop_assert!(!sanitized.chars().any(char::is_whitespace));
        }

        #[cfg(unix)]
        #[test]
        fn prop_sanitize_bytes_idempotent(
            bytes in proptest::collection::vec(any::<u8>(), 0..64)
        ) {
            use std::os::unix::ffi::OsStrExt;

            let once = sanitize(OsStr::from_bytes(&bytes)).into_owned();
            let twice = sanitize(&once).into_owned();
            prop_assert_eq!(&once, &twice);
            prop_assert!(!once.as_bytes().iter().any(u8::is_ascii_whitespace));
        }
    }
}
