//! Integration tests for the file-backed staging area.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use staging::{
    CurrentRuntime, FileStagingArea, FileStagingAreaConfig, InstanceProvider, ModuleKind,
    ModuleLookup, RuntimeContext, SerializationTree, StagingArea, StagingAreaProvider,
    StagingError,
};
use tempfile::TempDir;
use tokio::runtime::Handle;
use trace::{ExecutionTrace, Index, Key, Name};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn t(s: &str) -> ExecutionTrace {
    ExecutionTrace::parse(s).unwrap()
}

fn area(dir: &TempDir) -> FileStagingArea {
    FileStagingArea::new(FileStagingAreaConfig::new(dir.path()), Handle::current())
}

fn iteration_output(i: u32) -> ExecutionTrace {
    t("loop/")
        .resolve_iteration(Index::new(i))
        .unwrap()
        .resolve_out_port(Name::new("v").unwrap())
        .unwrap()
}

fn entries(path: &Path) -> usize {
    std::fs::read_dir(path).map(|d| d.count()).unwrap_or(0)
}

/// Every module in the workflow is reported with the same kind.
#[derive(Debug)]
struct FixedLookup(ModuleKind);

impl ModuleLookup for FixedLookup {
    fn module_kind(&self, _trace: &ExecutionTrace) -> Option<ModuleKind> {
        Some(self.0)
    }
}

struct WithLookup(Arc<dyn ModuleLookup>);

impl InstanceProvider for WithLookup {
    fn runtime_context(&self) -> Result<RuntimeContext, StagingError> {
        RuntimeContext::current()
    }

    fn module_lookup(&self) -> Option<Arc<dyn ModuleLookup>> {
        Some(Arc::clone(&self.0))
    }
}

// ---------------------------------------------------------------------------
// put / get / exists / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn put_then_get_returns_the_value() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let target = t("sum:out:result");

    assert!(!area.exists(&target).await.unwrap());
    area.put_object(&target, &json!({ "total": 7 })).await.unwrap();

    assert!(area.exists(&target).await.unwrap());
    assert_eq!(area.get_object(&target).await.unwrap(), json!({ "total": 7 }));
    assert!(dir.path().join("sum/output/result").is_file());
    assert!(dir.path().join("sum/output/result.meta.json").is_file());
}

#[tokio::test]
async fn put_overwrites_the_previous_value() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let target = t("a:out:x");

    area.put_object(&target, &json!(1)).await.unwrap();
    area.put_object(&target, &json!("two")).await.unwrap();

    assert_eq!(area.get_object(&target).await.unwrap(), json!("two"));
}

#[tokio::test]
async fn get_of_a_missing_value_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = area(&dir).get_object(&t("a:out:x")).await.unwrap_err();
    assert!(matches!(err, StagingError::NotFound(trace) if trace == t("a:out:x")));
}

#[tokio::test]
async fn data_without_a_sidecar_is_not_a_value() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let data = dir.path().join("a/output");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("x"), b"42").unwrap();

    assert!(!area.exists(&t("a:out:x")).await.unwrap());
    assert!(area.get_object(&t("a:out:x")).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn removing_the_sidecar_removes_the_value() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    area.put_object(&t("a:out:x"), &json!(42)).await.unwrap();
    std::fs::remove_file(dir.path().join("a/output/x.meta.json")).unwrap();

    assert!(dir.path().join("a/output/x").exists());
    assert!(!area.exists(&t("a:out:x")).await.unwrap());
    assert!(area.get_object(&t("a:out:x")).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_prunes_empty_directories_but_keeps_the_base() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    area.put_object(&t("a/b:in:x"), &json!(1)).await.unwrap();
    area.put_object(&t("a/c:out:y"), &json!(2)).await.unwrap();

    area.delete(&t("a/b")).await.unwrap();
    assert!(!dir.path().join("a/content/b").exists());
    assert!(area.exists(&t("a/c:out:y")).await.unwrap());

    area.delete(&t("a")).await.unwrap();
    assert!(!area.exists(&t("a/c:out:y")).await.unwrap());
    assert!(dir.path().exists());
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn delete_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    area.put_object(&t("a:out:x"), &json!(1)).await.unwrap();

    area.delete(&t("a:out:x")).await.unwrap();
    area.delete(&t("a:out:x")).await.unwrap();
    area.delete(&t("never/written")).await.unwrap();

    assert!(!area.exists(&t("a:out:x")).await.unwrap());
}

#[tokio::test]
async fn concurrent_deletes_of_overlapping_prefixes_succeed() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    for i in 0..8 {
        area.put_object(&iteration_output(i), &json!(i)).await.unwrap();
    }

    let mut prefixes: Vec<ExecutionTrace> = (0..8)
        .map(|i| t("loop/").resolve_iteration(Index::new(i)).unwrap())
        .collect();
    prefixes.push(t("loop"));
    prefixes.push(t("loop/"));

    let results =
        futures::future::join_all(prefixes.iter().map(|prefix| area.delete(prefix))).await;
    for result in results {
        result.unwrap();
    }
    assert_eq!(entries(dir.path()), 0);
}

// ---------------------------------------------------------------------------
// copy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn copy_is_a_snapshot_of_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let source = t("a:out:x");
    let target = t("b:in:y");

    area.put_object(&source, &json!("first")).await.unwrap();
    area.copy(&source, &target).await.unwrap();
    area.put_object(&source, &json!("second")).await.unwrap();

    assert_eq!(area.get_object(&target).await.unwrap(), json!("first"));
    assert_eq!(area.get_object(&source).await.unwrap(), json!("second"));
}

#[tokio::test]
async fn copy_of_a_tree_links_every_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let tree = SerializationTree::node(
        "record",
        [
            (Key::Name(Name::new("left").unwrap()), SerializationTree::leaf("raw", b"L".to_vec())),
            (Key::Index(Index::new(3)), SerializationTree::leaf("raw", b"3".to_vec())),
            (Key::NoKey, SerializationTree::leaf("raw", b"-".to_vec())),
        ],
    );
    area.put_serialization_tree(&t("a:out:rec"), tree.clone()).await.unwrap();
    area.copy(&t("a:out:rec"), &t("b:in:rec")).await.unwrap();

    let copied = area
        .get_serialization_tree(&t("b:in:rec"))
        .await
        .unwrap()
        .materialize()
        .unwrap();
    assert_eq!(copied, tree);
}

#[cfg(unix)]
#[tokio::test]
async fn copy_shares_inodes_with_the_source() {
    use std::os::unix::fs::MetadataExt;

    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let tree = SerializationTree::node(
        "record",
        [(Key::Name(Name::new("left").unwrap()), SerializationTree::leaf("raw", b"L".to_vec()))],
    );
    area.put_serialization_tree(&t("a:out:rec"), tree).await.unwrap();
    area.copy(&t("a:out:rec"), &t("b:in:rec")).await.unwrap();

    for (source, target) in [
        ("a/output/rec/left", "b/input/rec/left"),
        ("a/output/rec.meta.json", "b/input/rec.meta.json"),
    ] {
        let source = std::fs::metadata(dir.path().join(source)).unwrap();
        let target = std::fs::metadata(dir.path().join(target)).unwrap();
        assert_eq!(source.ino(), target.ino());
        assert_eq!(source.nlink(), 2);
    }
}

#[tokio::test]
async fn copy_onto_itself_keeps_the_value() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    area.put_object(&t("a:out:x"), &json!(42)).await.unwrap();

    area.copy(&t("a:out:x"), &t("a:out:x")).await.unwrap();
    assert_eq!(area.get_object(&t("a:out:x")).await.unwrap(), json!(42));
}

#[tokio::test]
async fn copy_onto_an_ancestor_replaces_it_with_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    area.put_object(&t("a:out:x:0"), &json!(7)).await.unwrap();

    area.copy(&t("a:out:x:0"), &t("a:out:x")).await.unwrap();
    assert_eq!(area.get_object(&t("a:out:x")).await.unwrap(), json!(7));
    assert!(!area.exists(&t("a:out:x:0")).await.unwrap());
    // Nothing is left behind next to the stored values.
    assert_eq!(entries(dir.path()), 1);
}

#[tokio::test]
async fn copy_below_the_source_keeps_the_source() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    let tree = SerializationTree::node(
        "record",
        [(Key::Name(Name::new("left").unwrap()), SerializationTree::leaf("raw", b"L".to_vec()))],
    );
    area.put_serialization_tree(&t("a:out:rec"), tree.clone()).await.unwrap();

    area.copy(&t("a:out:rec"), &t("a:out:rec:7")).await.unwrap();
    for trace in ["a:out:rec", "a:out:rec:7"] {
        let stored = area
            .get_serialization_tree(&t(trace))
            .await
            .unwrap()
            .materialize()
            .unwrap();
        assert_eq!(stored, tree, "{trace}");
    }
}

#[tokio::test]
async fn copy_of_a_missing_source_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = area(&dir).copy(&t("a:out:x"), &t("b:in:x")).await.unwrap_err();
    assert!(err.is_not_found());
}

// ---------------------------------------------------------------------------
// get_maximum_index
// ---------------------------------------------------------------------------

#[tokio::test]
async fn maximum_index_honours_the_upper_bound() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);
    for i in [0, 2, 5, 7] {
        area.put_object(&iteration_output(i), &json!(i)).await.unwrap();
    }
    let content = t("loop/");

    assert_eq!(
        area.get_maximum_index(&content, Some(Index::new(6))).await.unwrap(),
        Some(Index::new(5))
    );
    assert_eq!(
        area.get_maximum_index(&content, Some(Index::new(2))).await.unwrap(),
        Some(Index::new(2))
    );
    assert_eq!(
        area.get_maximum_index(&content, None).await.unwrap(),
        Some(Index::new(7))
    );
    assert_eq!(area.get_maximum_index(&t("other/"), None).await.unwrap(), None);
}

#[tokio::test]
async fn maximum_index_rejects_non_content_traces() {
    let dir = tempfile::tempdir().unwrap();
    let err = area(&dir)
        .get_maximum_index(&t("loop"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, StagingError::IllegalArgument(_)));
}

// ---------------------------------------------------------------------------
// Argument checks
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_on_frames_only_traces_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let area = area(&dir);

    let put = area.put_object(&t("a"), &json!(1)).await.unwrap_err();
    assert!(matches!(put, StagingError::IllegalArgument(_)));
    let exists = area.exists(&t("a/")).await.unwrap_err();
    assert!(matches!(exists, StagingError::IllegalArgument(_)));
    let delete = area.delete(&ExecutionTrace::empty()).await.unwrap_err();
    assert!(matches!(delete, StagingError::IllegalArgument(_)));
    assert_eq!(entries(dir.path()), 0);
}

#[tokio::test]
async fn relative_traces_that_break_the_grammar_are_trace_errors() {
    let dir = tempfile::tempdir().unwrap();
    let child = area(&dir).resolve_descendant(&t("a")).unwrap();

    // "a" followed by "b:out:x" would be two adjacent modules.
    let err = child.put_object(&t("b:out:x"), &json!(1)).await.unwrap_err();
    assert!(matches!(err, StagingError::Trace(_)));
}

// ---------------------------------------------------------------------------
// Descendants and providers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn descendant_operations_are_relative_to_its_trace() {
    let dir = tempfile::tempdir().unwrap();
    let root = area(&dir);
    let body = root
        .resolve_descendant(&t("loop/3"))
        .unwrap()
        .resolve_descendant(&t("/sum"))
        .unwrap();
    assert_eq!(body.trace(), &t("loop/3/sum"));

    body.put_object(&t(":out:total"), &json!(10)).await.unwrap();
    assert_eq!(
        root.get_object(&t("loop/3/sum:out:total")).await.unwrap(),
        json!(10)
    );

    let err = root.resolve_descendant(&t("a:out:x")).unwrap_err();
    assert!(matches!(err, StagingError::IllegalArgument(_)));
}

#[tokio::test]
async fn serialized_provider_reconstructs_the_same_area() {
    let dir = tempfile::tempdir().unwrap();
    let root = area(&dir);
    root.put_object(&t(":out:seed"), &json!("s")).await.unwrap();

    let provider = root.staging_area_provider().unwrap();
    assert!(provider.is_serializable());
    let wire = serde_json::to_string(&provider).unwrap();
    let provider: StagingAreaProvider = serde_json::from_str(&wire).unwrap();

    let rebuilt = provider.provide(&CurrentRuntime).unwrap();
    assert_eq!(rebuilt.trace(), &ExecutionTrace::empty());
    assert_eq!(rebuilt.get_object(&t(":out:seed")).await.unwrap(), json!("s"));
}

#[tokio::test]
async fn simple_module_areas_have_providers() {
    let dir = tempfile::tempdir().unwrap();
    let lookup: Arc<dyn ModuleLookup> = Arc::new(FixedLookup(ModuleKind::Simple));
    let root = area(&dir).with_module_lookup(Arc::clone(&lookup));
    let module = root.resolve_descendant(&t("sum")).unwrap();

    let provider = module.staging_area_provider().unwrap();
    let rebuilt = provider.provide(&WithLookup(lookup)).unwrap();
    assert_eq!(rebuilt.trace(), &t("sum"));
}

#[tokio::test]
async fn composite_and_unknown_modules_have_no_provider() {
    let dir = tempfile::tempdir().unwrap();

    let composite = area(&dir).with_module_lookup(Arc::new(FixedLookup(ModuleKind::Composite)));
    let err = composite
        .resolve_descendant(&t("outer"))
        .unwrap()
        .staging_area_provider()
        .unwrap_err();
    assert!(matches!(err, StagingError::Unsupported(_)));

    let iteration = composite.resolve_descendant(&t("loop/0")).unwrap();
    assert!(matches!(
        iteration.staging_area_provider(),
        Err(StagingError::Unsupported(_))
    ));

    let err = area(&dir)
        .resolve_descendant(&t("sum"))
        .unwrap()
        .staging_area_provider()
        .unwrap_err();
    assert!(matches!(err, StagingError::IllegalState(_)));
}
