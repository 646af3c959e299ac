use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use codegate_contracts::{
    CODEGATE_SPEC_TREE_SCHEMA_VERSION, CODEGATE_SPEC_TREE_SCHEMA_VERSIONS_SUPPORTED,
};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tree::{SpecNode, SpecTree};

static TMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

const SPEC_TREE_SCHEMA_BYTES: &[u8] =
    include_bytes!("../../../schemas/codegate.spec-tree.schema.json");

/// Persistence collaborator for spec trees.
pub trait SpecStore {
    fn load(&self, path: &Path) -> Result<SpecTree>;
    fn save(&self, tree: &SpecTree, path: &Path) -> Result<()>;
}

/// Stores a tree as a single JSON document `{ schema_version, root }`.
///
/// Writes go through a temp file and a rename, so concurrent writers never
/// leave a torn file behind; the last rename wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSpecStore;

#[derive(Debug, Serialize, Deserialize)]
struct SpecTreeDocument {
    schema_version: String,
    root: SpecNode,
}

impl SpecStore for JsonSpecStore {
    fn load(&self, path: &Path) -> Result<SpecTree> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("[SPEC_TREE_READ] read spec tree: {}", path.display()))?;
        let tree = parse_spec_tree_bytes(&bytes, path)?;
        tracing::info!(path = %path.display(), nodes = tree.nodes().count(), "loaded spec tree");
        Ok(tree)
    }

    fn save(&self, tree: &SpecTree, path: &Path) -> Result<()> {
        let doc = SpecTreeDocument {
            schema_version: CODEGATE_SPEC_TREE_SCHEMA_VERSION.to_string(),
            root: tree.root().clone(),
        };
        let mut bytes = serde_json::to_vec_pretty(&doc).context("serialize spec tree")?;
        bytes.push(b'\n');
        write_atomic(path, &bytes)?;
        tracing::info!(path = %path.display(), "saved spec tree");
        Ok(())
    }
}

pub fn parse_spec_tree_bytes(bytes: &[u8], path: &Path) -> Result<SpecTree> {
    let doc: Value = serde_json::from_slice(bytes)
        .with_context(|| format!("[SPEC_TREE_PARSE] parse spec tree JSON: {}", path.display()))?;

    let errors = validate_spec_tree_schema(&doc)?;
    if !errors.is_empty() {
        anyhow::bail!(
            "[SPEC_TREE_SCHEMA] {} does not match the spec-tree schema:\n{}",
            path.display(),
            errors.join("\n")
        );
    }

    let doc: SpecTreeDocument = serde_json::from_value(doc)
        .with_context(|| format!("[SPEC_TREE_PARSE] decode spec tree: {}", path.display()))?;
    if !CODEGATE_SPEC_TREE_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|v| *v == doc.schema_version.trim())
    {
        anyhow::bail!(
            "spec tree schema_version mismatch: expected one of {:?} got {:?}",
            CODEGATE_SPEC_TREE_SCHEMA_VERSIONS_SUPPORTED,
            doc.schema_version
        );
    }

    SpecTree::new(doc.root).with_context(|| format!("invalid spec tree: {}", path.display()))
}

fn validate_spec_tree_schema(doc: &Value) -> Result<Vec<String>> {
    let schema: Value =
        serde_json::from_slice(SPEC_TREE_SCHEMA_BYTES).context("parse spec-tree schema")?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("build spec-tree schema validator")?;
    Ok(validator
        .iter_errors(doc)
        .map(|e| format!("schema: {} at {}", e, e.instance_path()))
        .collect())
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("[SPEC_TREE_WRITE] create dir: {}", dir.display()))?;
    }

    let staged = staging_path(path);
    let result = std::fs::write(&staged, contents)
        .with_context(|| format!("[SPEC_TREE_WRITE] write: {}", staged.display()))
        .and_then(|()| replace(&staged, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&staged);
    }
    result
}

/// Moves `staged` over `target`. A target that refuses the rename is removed
/// and the rename retried once.
fn replace(staged: &Path, target: &Path) -> Result<()> {
    if std::fs::rename(staged, target).is_ok() {
        return Ok(());
    }
    let _ = std::fs::remove_file(target);
    std::fs::rename(staged, target)
        .with_context(|| format!("[SPEC_TREE_WRITE] replace: {}", target.display()))
}

fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    target.with_file_name(format!(".{name}.{}.{seq}.tmp", std::process::id()))
}
