//! File resolution for a work.
//!
//! Turns an item's file reference (a file, a directory, or a list of either)
//! plus an optional `first_file` into a [`ResolvedFileSet`]. Relative
//! references are taken against the directory holding the batch source;
//! absolute references (e.g. download directories) are used as-is.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::ResolveError;
use crate::models::ResolvedFileSet;

/// One or more paths naming a work's files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReference {
    Single(PathBuf),
    Many(Vec<PathBuf>),
}

impl FileReference {
    fn paths(&self) -> &[PathBuf] {
        match self {
            FileReference::Single(p) => std::slice::from_ref(p),
            FileReference::Many(ps) => ps,
        }
    }
}

/// Locate every file of a work and pick the primary one.
///
/// Without `explicit_primary` the reference must contain exactly one file.
/// With it, the primary must exist and be one of the enumerated files.
pub fn resolve(
    file_ref: &FileReference,
    explicit_primary: Option<&Path>,
    base_dir: &Path,
) -> Result<ResolvedFileSet, ResolveError> {
    let mut files = BTreeSet::new();
    for reference in file_ref.paths() {
        let candidate = absolute(base_dir, reference);
        if !candidate.exists() {
            return Err(ResolveError::NotFound(candidate));
        }
        if candidate.is_file() {
            files.insert(candidate);
            continue;
        }
        let before = files.len();
        collect_files(&candidate, &mut files)?;
        if files.len() == before && file_ref.paths().len() == 1 {
            return Err(ResolveError::NoFiles(candidate));
        }
    }

    if files.is_empty() {
        let first = file_ref
            .paths()
            .first()
            .map(|p| absolute(base_dir, p))
            .unwrap_or_else(|| base_dir.to_path_buf());
        return Err(ResolveError::NoFiles(first));
    }

    let primary_file = match explicit_primary {
        Some(primary) => {
            let primary = absolute(base_dir, primary);
            if !primary.exists() {
                return Err(ResolveError::NotFound(primary));
            }
            if !files.contains(&primary) {
                return Err(ResolveError::PrimaryNotInSet(primary));
            }
            primary
        }
        None => {
            if files.len() != 1 {
                return Err(ResolveError::AmbiguousPrimary { count: files.len() });
            }
            files.iter().next().cloned().ok_or_else(|| {
                ResolveError::NoFiles(base_dir.to_path_buf())
            })?
        }
    };

    files.remove(&primary_file);
    tracing::debug!(
        primary = %primary_file.display(),
        others = files.len(),
        "resolved files"
    );
    Ok(ResolvedFileSet {
        primary_file,
        other_files: files,
    })
}

/// Recursively add every regular file under `dir`.
fn collect_files(dir: &Path, files: &mut BTreeSet<PathBuf>) -> Result<(), ResolveError> {
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        if entry.path().is_file() {
            files.insert(lexical_clean(entry.path()));
        }
    }
    Ok(())
}

/// Join `path` onto `base`, anchor it at the working directory if still
/// relative, and drop `.`/`..` components without touching the filesystem.
pub fn absolute(base: &Path, path: &Path) -> PathBuf {
    let joined = base.join(path);
    let anchored = if joined.is_absolute() {
        joined
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&joined))
            .unwrap_or(joined)
    };
    lexical_clean(&anchored)
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn single(p: &str) -> FileReference {
        FileReference::Single(PathBuf::from(p))
    }

    #[test]
    fn single_file_is_primary() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("thesis.pdf"), b"pdf").unwrap();

        let set = resolve(&single("thesis.pdf"), None, tmp.path()).unwrap();
        assert_eq!(set.primary_file, absolute(tmp.path(), Path::new("thesis.pdf")));
        assert!(set.other_files.is_empty());
    }

    #[test]
    fn three_files_without_primary_is_ambiguous() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("work");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.pdf"), b"a").unwrap();
        fs::write(dir.join("b.jpg"), b"b").unwrap();
        fs::write(dir.join("sub/c.txt"), b"c").unwrap();

        let err = resolve(&single("work"), None, tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::AmbiguousPrimary { count: 3 }));
    }

    #[test]
    fn explicit_primary_is_split_from_others() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("files");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.pdf"), b"a").unwrap();
        fs::write(dir.join("b.jpg"), b"b").unwrap();

        let set = resolve(&single("files"), Some(Path::new("files/b.jpg")), tmp.path()).unwrap();
        assert_eq!(set.primary_file, absolute(tmp.path(), Path::new("files/b.jpg")));
        let others: Vec<PathBuf> = set.other_files.into_iter().collect();
        assert_eq!(others, vec![absolute(tmp.path(), Path::new("files/a.pdf"))]);
    }

    #[test]
    fn dotted_primary_still_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("files");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("a.pdf"), b"a").unwrap();
        fs::write(dir.join("b.pdf"), b"b").unwrap();

        let set = resolve(&single("./files"), Some(Path::new("files/./a.pdf")), tmp.path()).unwrap();
        assert!(set.primary_file.ends_with("files/a.pdf"));
        assert_eq!(set.other_files.len(), 1);
    }

    #[test]
    fn missing_reference_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = resolve(&single("nope"), None, tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn empty_directory_has_no_files() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let err = resolve(&single("empty"), None, tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::NoFiles(_)));
    }

    #[test]
    fn primary_outside_set_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("files")).unwrap();
        fs::write(tmp.path().join("files/a.pdf"), b"a").unwrap();
        fs::write(tmp.path().join("elsewhere.pdf"), b"e").unwrap();

        let err = resolve(&single("files"), Some(Path::new("elsewhere.pdf")), tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::PrimaryNotInSet(_)));

        let err = resolve(&single("files"), Some(Path::new("ghost.pdf")), tmp.path()).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
    }

    #[test]
    fn list_reference_unions_and_dedups() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("d")).unwrap();
        fs::write(tmp.path().join("d/a.pdf"), b"a").unwrap();
        fs::write(tmp.path().join("b.pdf"), b"b").unwrap();

        let reference = FileReference::Many(vec![
            PathBuf::from("d"),
            PathBuf::from("d/a.pdf"),
            PathBuf::from("b.pdf"),
        ]);
        let set = resolve(&reference, Some(Path::new("b.pdf")), tmp.path()).unwrap();
        assert_eq!(set.other_files.len(), 1);
        assert!(!set.other_files.contains(&set.primary_file));
    }

    #[test]
    fn absolute_reference_ignores_base() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("x.pdf");
        fs::write(&file, b"x").unwrap();

        let set = resolve(
            &FileReference::Single(file.clone()),
            None,
            Path::new("/definitely/not/here"),
        )
        .unwrap();
        assert_eq!(set.primary_file, lexical_clean(&file));
    }
}
