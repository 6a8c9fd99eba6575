//! Mapping of execution traces onto the file system.
//!
//! ```text
//! <base>/<module>/content/<child-module>/...
//! <base>/<module>/content/<iteration>/...
//! <base>/<module>/input/<port>[/<array-index>...]
//! <base>/<module>/output/<port>[/<array-index>...]
//! ```
//!
//! Every stored value has a sidecar `<parent>/<basename>.meta.json`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use trace::{Element, ExecutionTrace, Key};

pub(crate) const CONTENT_DIR: &str = "content";
pub(crate) const INPUT_DIR: &str = "input";
pub(crate) const OUTPUT_DIR: &str = "output";
pub(crate) const METADATA_SUFFIX: &str = ".meta.json";

/// Directory entry for a `NoKey` child of a serialization tree. Never a valid
/// name or index.
pub(crate) const NO_KEY_SEGMENT: &str = "@";

pub(crate) fn data_path(base: &Path, trace: &ExecutionTrace) -> PathBuf {
    let mut path = base.to_path_buf();
    for element in trace.elements() {
        match element {
            Element::Content => path.push(CONTENT_DIR),
            Element::Module(name) => path.push(name.as_str()),
            Element::Iteration(index) | Element::ArrayIndex(index) => {
                path.push(index.to_string())
            }
            Element::InPort(name) => {
                path.push(INPUT_DIR);
                path.push(name.as_str());
            }
            Element::OutPort(name) => {
                path.push(OUTPUT_DIR);
                path.push(name.as_str());
            }
        }
    }
    path
}

pub(crate) fn metadata_path(data_path: &Path) -> PathBuf {
    let mut file_name = data_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    file_name.push(METADATA_SUFFIX);
    data_path.with_file_name(file_name)
}

pub(crate) fn key_segment(key: &Key) -> String {
    match key {
        Key::NoKey => NO_KEY_SEGMENT.to_owned(),
        Key::Name(name) => name.to_string(),
        Key::Index(index) => index.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_of(trace: &str) -> PathBuf {
        data_path(Path::new("/base"), &ExecutionTrace::parse(trace).unwrap())
    }

    #[test]
    fn maps_each_element_kind() {
        assert_eq!(path_of("loop/3/sum:in:num"), PathBuf::from("/base/loop/content/3/content/sum/input/num"));
        assert_eq!(path_of("a:out:list:2"), PathBuf::from("/base/a/output/list/2"));
        assert_eq!(path_of("/child"), PathBuf::from("/base/content/child"));
        assert_eq!(path_of(""), PathBuf::from("/base"));
    }

    #[test]
    fn sidecar_sits_next_to_the_value() {
        assert_eq!(
            metadata_path(Path::new("/base/a/output/list")),
            PathBuf::from("/base/a/output/list.meta.json")
        );
        assert_eq!(
            metadata_path(Path::new("/base/a/output/list/2")),
            PathBuf::from("/base/a/output/list/2.meta.json")
        );
    }
}
