//! Blocking file-system primitives used by [`FileStagingArea`](super::FileStagingArea).
//!
//! Removal helpers treat entries that vanish underneath them as already
//! removed, which is what lets concurrent deletes overlap.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::storage;
use crate::file::layout::key_segment;
use crate::tree::{ByteSequence, SerializationTree};
use crate::StagingError;

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// A path is absent when it, or one of its ancestors, does not exist or is a
/// plain file.
pub(crate) fn is_absent(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

pub(crate) fn file_exists(path: &Path) -> Result<bool, StagingError> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if is_absent(&e) => Ok(false),
        Err(e) => Err(storage(path)(e)),
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> Result<(), StagingError> {
    ignore_not_found(fs::remove_file(path)).map_err(storage(path))
}

/// Recursively remove `path`, whether it is a file or a directory.
pub(crate) fn remove_tree(path: &Path) -> Result<(), StagingError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(storage(path)(e)),
    };
    if !metadata.is_dir() {
        return remove_file_if_exists(path);
    }

    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(storage(path)(e)),
    };
    for entry in entries {
        match entry {
            Ok(entry) => remove_tree(&entry.path())?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(storage(path)(e)),
        }
    }
    ignore_not_found(fs::remove_dir(path)).map_err(storage(path))
}

pub(crate) fn is_empty_dir(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

/// Hard-link `source` to `target`. Falls back to a byte copy only when the
/// two paths live on different file stores.
pub(crate) fn link_or_copy(source: &Path, target: &Path) -> Result<(), StagingError> {
    match fs::hard_link(source, target) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "{} and {} are on different devices, copying",
                source.display(),
                target.display()
            );
            fs::copy(source, target).map(drop).map_err(storage(target))
        }
        Err(e) => Err(storage(target)(e)),
    }
}

/// Mirror the contents of directory `source` into the existing directory
/// `target`: directories are created, files hard-linked.
pub(crate) fn link_dir_contents(source: &Path, target: &Path) -> Result<(), StagingError> {
    for entry in WalkDir::new(source).min_depth(1) {
        let entry = entry.map_err(|e| storage(source)(io::Error::from(e)))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| storage(entry.path())(io::Error::new(io::ErrorKind::Other, e)))?;
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination).map_err(storage(&destination))?;
        } else {
            link_or_copy(entry.path(), &destination)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Writing serialization trees
// ---------------------------------------------------------------------------

/// Create the directory entry for `tree` at `path`.
///
/// Returns the open file when the entry still has to be filled with bytes
/// (see [`fill_entry`]); inner nodes and hard-linked leaves are complete.
pub(crate) fn create_entry(
    path: &Path,
    tree: &SerializationTree,
    hard_link_eligible: &dyn Fn(&Path) -> bool,
) -> Result<Option<File>, StagingError> {
    match tree {
        SerializationTree::Node { .. } => {
            fs::create_dir(path).map_err(storage(path))?;
            Ok(None)
        }
        SerializationTree::Leaf {
            bytes: ByteSequence::File(source),
            ..
        } if hard_link_eligible(source.as_path()) => match fs::hard_link(source, path) {
            Ok(()) => Ok(None),
            Err(e) => {
                debug!("hard link from {} failed ({e}), copying", source.display());
                File::create(path).map(Some).map_err(storage(path))
            }
        },
        SerializationTree::Leaf { .. } => File::create(path).map(Some).map_err(storage(path)),
    }
}

/// Write the bytes of a leaf into `file`, or the children of a node below
/// `path`.
pub(crate) fn fill_entry(
    path: &Path,
    tree: &SerializationTree,
    file: Option<File>,
    hard_link_eligible: &dyn Fn(&Path) -> bool,
) -> Result<(), StagingError> {
    match (tree, file) {
        (SerializationTree::Leaf { bytes, .. }, Some(mut file)) => match bytes {
            ByteSequence::Bytes(bytes) => file.write_all(bytes).map_err(storage(path)),
            ByteSequence::File(source) => {
                let mut input = File::open(source).map_err(storage(source))?;
                io::copy(&mut input, &mut file)
                    .map(drop)
                    .map_err(storage(path))
            }
        },
        (SerializationTree::Node { children, .. }, _) => {
            for (key, child) in children {
                let child_path = path.join(key_segment(key));
                let child_file = create_entry(&child_path, child, hard_link_eligible)?;
                fill_entry(&child_path, child, child_file, hard_link_eligible)?;
            }
            Ok(())
        }
        (SerializationTree::Leaf { .. }, None) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_tree_tolerates_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        remove_tree(&dir.path().join("nope")).unwrap();
        remove_file_if_exists(&dir.path().join("nope")).unwrap();
    }

    #[test]
    fn remove_tree_deletes_nested_content() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("f"), b"x").unwrap();
        remove_tree(&dir.path().join("a")).unwrap();
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn linked_directory_shares_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("sub/leaf"), b"bytes").unwrap();
        let target = dir.path().join("dst");
        fs::create_dir(&target).unwrap();

        link_dir_contents(&source, &target).unwrap();
        assert_eq!(fs::read(target.join("sub/leaf")).unwrap(), b"bytes");
    }

    #[test]
    fn link_onto_an_existing_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        let target = dir.path().join("dst");
        fs::write(&source, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        let err = link_or_copy(&source, &target).unwrap_err();
        assert!(matches!(err, StagingError::Storage { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }
}
