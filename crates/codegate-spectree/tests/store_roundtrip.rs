use codegate_contracts::CODEGATE_SPEC_TREE_SCHEMA_VERSION;
use codegate_spectree::{ExpectedSignature, JsonSpecStore, SpecNode, SpecStore, SpecTree};
use serde_json::json;

fn sample_tree() -> SpecTree {
    SpecTree::new(
        SpecNode::module("root", "Root").with_child(
            SpecNode::module("external_gateway", "External Gateway")
                .with_dependencies(["requests", "json"])
                .with_child(
                    SpecNode::leaf("stripe_payment_node", "process_payment").with_signature(
                        ExpectedSignature::from_names(["token", "amount"]).with_output("dict"),
                    ),
                ),
        ),
    )
    .expect("valid tree")
}

#[test]
fn save_then_load_preserves_the_tree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("nested/spec.json");

    let tree = sample_tree();
    JsonSpecStore.save(&tree, &path).expect("save");
    let loaded = JsonSpecStore.load(&path).expect("load");
    assert_eq!(loaded, tree);

    let doc: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
    assert_eq!(
        doc.get("schema_version").and_then(|v| v.as_str()),
        Some(CODEGATE_SPEC_TREE_SCHEMA_VERSION)
    );
    assert_eq!(doc["root"]["children"][0]["kind"], json!("MODULE"));
}

#[test]
fn save_leaves_no_temp_files_behind() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("spec.json");
    let tree = sample_tree();
    JsonSpecStore.save(&tree, &path).expect("save once");
    JsonSpecStore.save(&tree, &path).expect("save twice");

    let names: Vec<String> = std::fs::read_dir(tmp.path())
        .expect("read dir")
        .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, ["spec.json"]);
}

#[test]
fn load_rejects_schema_violations() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("bad.json");
    let doc = json!({
        "schema_version": CODEGATE_SPEC_TREE_SCHEMA_VERSION,
        "root": {"id": "root", "kind": "PACKAGE"}
    });
    std::fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    let err = JsonSpecStore.load(&path).expect_err("must reject");
    assert!(format!("{err:#}").contains("[SPEC_TREE_SCHEMA]"), "{err:#}");
}

#[test]
fn load_rejects_leaf_grants() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("leaf.json");
    let doc = json!({
        "schema_version": CODEGATE_SPEC_TREE_SCHEMA_VERSION,
        "root": {
            "id": "root",
            "kind": "MODULE",
            "children": [{"id": "x", "kind": "LEAF", "dependencies": ["os"]}]
        }
    });
    std::fs::write(&path, serde_json::to_vec(&doc).expect("encode")).expect("write");

    let err = JsonSpecStore.load(&path).expect_err("must reject");
    assert!(
        format!("{err:#}").contains("must not declare dependencies"),
        "{err:#}"
    );
}

#[test]
fn load_reports_missing_file_with_path() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("absent.json");
    let err = JsonSpecStore.load(&path).expect_err("missing");
    assert!(format!("{err:#}").contains("absent.json"), "{err:#}");
}
