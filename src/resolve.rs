use crate::config::ExcludedExtensions;
use crate::error::GopherError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::Metadata;
use std::os::unix::fs::PermissionsExt;

/// File extension that marks an executable responder.
pub const SCRIPT_EXTENSION: &str = ".cgi";

/// Index files probed, in order, at every directory prefix of a selector.
const INDEX_FILES: [&str; 2] = ["index.cgi", "index.map"];

/// World-readable.
const MODE_READ: u32 = 0o004;
/// World-readable and world-executable.
const MODE_READ_EXEC: u32 = 0o005;

/// Outcome of selector resolution.
///
/// `fs_path` is an existing, readable regular file. `script_name` is
/// `fs_path` with the document root stripped, in selector form (for an index
/// resolution, the directory prefix that owned the index). `path_info` is
/// empty or the unconsumed suffix of the selector path, starting with `/`.
#[derive(Debug, PartialEq, Eq)]
pub struct ResolvedPath {
    pub fs_path: Utf8PathBuf,
    pub script_name: String,
    pub path_info: String,
}

impl ResolvedPath {
    /// True when the resolved file must be executed rather than served.
    pub fn is_script(&self) -> bool {
        is_script_path(&self.fs_path)
    }
}

/// Locates the file a normalized selector path refers to.
///
/// The full concatenation `root + path` wins when it is a regular file.
/// Otherwise the path is walked one component at a time: each directory
/// prefix is probed for an index file (the latest hit becomes the best
/// candidate, the remainder its path-info), and a regular file encountered
/// mid-walk is the final resolution. A non-script file with named trailing
/// components is `FileNotFound`; a bare trailing `/` becomes path-info `/`.
pub fn resolve(
    root: &Utf8Path,
    path: &str,
    excluded: &ExcludedExtensions,
) -> Result<ResolvedPath, GopherError> {
    let full = concat(root, path);
    if let Some(meta) = stat(&full) {
        if meta.is_file() {
            check_file(&full, &meta, excluded)?;
            return Ok(ResolvedPath {
                fs_path: full,
                script_name: path.to_string(),
                path_info: String::new(),
            });
        }
    }
    walk(root, path, excluded)
}

fn walk(
    root: &Utf8Path,
    path: &str,
    excluded: &ExcludedExtensions,
) -> Result<ResolvedPath, GopherError> {
    // With scripts excluded wholesale there is nothing a walk could legally
    // produce, index files included.
    if excluded.contains(SCRIPT_EXTENSION) {
        return Err(GopherError::FileNotFound);
    }

    let segments: Vec<&str> = match path.strip_prefix('/') {
        Some(rest) => rest.split('/').collect(),
        None if path.is_empty() => Vec::new(),
        None => path.split('/').collect(),
    };

    // Best index candidate so far: its filesystem path and the script
    // boundary, an index into `segments` marking where path-info begins.
    let mut best: Option<(Utf8PathBuf, usize)> = None;
    let mut prefix = String::new();

    for cursor in 0..=segments.len() {
        let dir = concat(root, &prefix);
        match stat(&dir) {
            Some(meta) if meta.is_dir() => check_dir(&meta)?,
            _ => break,
        }

        for index in INDEX_FILES {
            let candidate = concat(root, &format!("{prefix}/{index}"));
            let Some(meta) = stat(&candidate) else {
                continue;
            };
            if meta.is_file() && index_allowed(&candidate, &meta, excluded) {
                best = Some((candidate, cursor));
                break;
            }
        }

        if cursor == segments.len() {
            break;
        }
        let segment = segments[cursor];
        if segment.is_empty() {
            // Trailing slash; the remainder is handled below.
            break;
        }

        prefix.push('/');
        prefix.push_str(segment);
        let node = concat(root, &prefix);
        match stat(&node) {
            None => break,
            Some(meta) if meta.is_file() => {
                let remainder = join(&segments[cursor + 1..]);
                if !remainder.is_empty() && remainder != "/" && !is_script_path(&node) {
                    return Err(GopherError::FileNotFound);
                }
                check_file(&node, &meta, excluded)?;
                return Ok(ResolvedPath {
                    fs_path: node,
                    script_name: prefix,
                    path_info: remainder,
                });
            }
            Some(_) => {}
        }
    }

    match best {
        Some((fs_path, boundary)) => Ok(ResolvedPath {
            fs_path,
            script_name: join(&segments[..boundary]),
            path_info: join(&segments[boundary..]),
        }),
        None => Err(GopherError::FileNotFound),
    }
}

fn concat(root: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{root}{suffix}"))
}

fn join(segments: &[&str]) -> String {
    let mut joined = String::new();
    for segment in segments {
        joined.push('/');
        joined.push_str(segment);
    }
    joined
}

fn is_script_path(path: &Utf8Path) -> bool {
    path.as_str().ends_with(SCRIPT_EXTENSION)
}

fn stat(path: &Utf8Path) -> Option<Metadata> {
    std::fs::metadata(path).ok()
}

fn world_mode(meta: &Metadata, required: u32) -> bool {
    meta.permissions().mode() & required == required
}

/// Permission and policy gate for a file chosen as the resolution.
fn check_file(
    path: &Utf8Path,
    meta: &Metadata,
    excluded: &ExcludedExtensions,
) -> Result<(), GopherError> {
    // Excluded extensions are Forbidden, not NotFound: the path exists, it
    // is policy-hidden.
    if excluded.matches(path) {
        return Err(GopherError::Forbidden);
    }
    let required = if is_script_path(path) {
        MODE_READ_EXEC
    } else {
        MODE_READ
    };
    if !world_mode(meta, required) {
        return Err(GopherError::Forbidden);
    }
    Ok(())
}

fn check_dir(meta: &Metadata) -> Result<(), GopherError> {
    if !world_mode(meta, MODE_READ_EXEC) {
        return Err(GopherError::Forbidden);
    }
    Ok(())
}

/// An index file that fails the gate is not a candidate; the probe moves on.
fn index_allowed(path: &Utf8Path, meta: &Metadata, excluded: &ExcludedExtensions) -> bool {
    if excluded.matches(path) {
        return false;
    }
    let required = if is_script_path(path) {
        MODE_READ_EXEC
    } else {
        MODE_READ
    };
    world_mode(meta, required)
}
