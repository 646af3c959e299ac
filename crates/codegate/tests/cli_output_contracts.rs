use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use codegate_contracts::{
    CODEGATE_REPORT_SCHEMA_VERSION, CODEGATE_RULES_SCHEMA_VERSION,
    CODEGATE_SPEC_TREE_SCHEMA_VERSION, CODEGATE_TOOL_REPORT_SCHEMA_VERSION,
};
use serde_json::{json, Value};

fn run(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_codegate"))
        .args(args)
        .output()
        .expect("run codegate")
}

fn stdout_json(out: &Output) -> Value {
    serde_json::from_slice(&out.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not one JSON document ({e})\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        )
    })
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

fn write_tree(dir: &Path) -> PathBuf {
    let doc = json!({
        "schema_version": CODEGATE_SPEC_TREE_SCHEMA_VERSION,
        "root": {
            "id": "root",
            "name": "Root",
            "kind": "MODULE",
            "children": [{
                "id": "module_a",
                "name": "ModuleA",
                "kind": "MODULE",
                "dependencies": ["math"],
                "children": [{"id": "leaf_x", "name": "LeafX", "kind": "LEAF"}]
            }]
        }
    });
    write(
        dir,
        "tree.json",
        &serde_json::to_string_pretty(&doc).expect("encode tree"),
    )
}

#[test]
fn validate_prints_a_report_and_exits_by_verdict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad = write(dir.path(), "bad.py", "eval(input())\n");

    let out = run(&["validate", "--input", bad.to_str().expect("utf-8 path")]);
    assert_eq!(out.status.code(), Some(1), "stderr={}", String::from_utf8_lossy(&out.stderr));
    let v = stdout_json(&out);
    assert_eq!(
        v.get("schema_version").and_then(Value::as_str),
        Some(CODEGATE_REPORT_SCHEMA_VERSION)
    );
    assert_eq!(v.get("passed").and_then(Value::as_bool), Some(false));
    assert_eq!(v.get("total_layers").and_then(Value::as_u64), Some(17));
    let layers = v.get("layers").and_then(Value::as_array).expect("layers");
    let l16 = layers
        .iter()
        .find(|l| l.get("layer").and_then(Value::as_u64) == Some(16))
        .expect("L16");
    assert_eq!(
        l16.pointer("/detail/kind").and_then(Value::as_str),
        Some("security")
    );
    assert_eq!(
        l16.pointer("/detail/dangerous_calls/0/category")
            .and_then(Value::as_str),
        Some("dynamic_eval")
    );
}

#[test]
fn validate_report_json_wraps_every_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write(dir.path(), "a.py", "x = 1\n");
    let b = write(dir.path(), "b.py", "def f(:\n");

    let out = run(&[
        "validate",
        "--input",
        a.to_str().expect("utf-8 path"),
        "--input",
        b.to_str().expect("utf-8 path"),
        "--tier",
        "structure",
        "--report-json",
    ]);
    assert_eq!(out.status.code(), Some(1));
    let v = stdout_json(&out);
    assert_eq!(
        v.get("schema_version").and_then(Value::as_str),
        Some(CODEGATE_TOOL_REPORT_SCHEMA_VERSION)
    );
    assert_eq!(v.get("command").and_then(Value::as_str), Some("validate"));
    assert_eq!(v.get("ok").and_then(Value::as_bool), Some(false));
    assert_eq!(v.get("exit_code").and_then(Value::as_u64), Some(1));
    let reports = v.get("reports").and_then(Value::as_array).expect("reports");
    assert_eq!(reports.len(), 2);
    for r in reports {
        assert_eq!(r.pointer("/report/total_layers").and_then(Value::as_u64), Some(4));
    }
    assert_eq!(
        reports[1].pointer("/report/layers/0/detail/kind").and_then(Value::as_str),
        Some("syntax")
    );
}

#[test]
fn validate_bound_unit_reports_authorization() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tree = write_tree(dir.path());
    let tree = tree.to_str().expect("utf-8 path");

    let out = run(&[
        "validate", "--code", "import os\n", "--spec-tree", tree, "--node", "leaf_x",
    ]);
    assert_eq!(out.status.code(), Some(1));
    let v = stdout_json(&out);
    assert_eq!(v.pointer("/authorization/rejected").and_then(Value::as_bool), Some(true));
    assert_eq!(v.pointer("/authorization/undeclared/0").and_then(Value::as_str), Some("os"));

    let out = run(&[
        "validate", "--code", "import os\n", "--spec-tree", tree, "--node", "ghost",
    ]);
    assert_eq!(out.status.code(), Some(2));
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("ghost"));
}

#[test]
fn validate_without_input_is_a_usage_error() {
    let out = run(&["validate"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn spec_commands_edit_and_resolve_the_tree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let tree = write_tree(dir.path());
    let tree = tree.to_str().expect("utf-8 path");

    let out = run(&["spec", "grant", "--tree", tree, "--module", "module_a", "--dep", "json"]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_json(&out).get("changed").and_then(Value::as_bool), Some(true));

    let out = run(&[
        "spec", "add-node", "--tree", tree, "--parent", "module_a", "--id", "leaf_y", "--name",
        "LeafY", "--kind", "leaf",
    ]);
    assert!(out.status.success(), "stderr={}", String::from_utf8_lossy(&out.stderr));

    let out = run(&["spec", "allow-list", "--tree", tree, "--node", "leaf_y"]);
    assert!(out.status.success());
    assert_eq!(stdout_json(&out).get("allowed"), Some(&json!(["json", "math"])));

    let out = run(&["spec", "ancestors", "--tree", tree, "--node", "leaf_y"]);
    let ids: Vec<String> = stdout_json(&out)
        .get("ancestors")
        .and_then(Value::as_array)
        .expect("ancestors")
        .iter()
        .filter_map(|a| a.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(ids, ["root", "module_a"]);

    let out = run(&["spec", "revoke", "--tree", tree, "--module", "module_a", "--dep", "json"]);
    assert!(out.status.success());
    let out = run(&["spec", "remove-node", "--tree", tree, "--node", "leaf_y"]);
    assert!(out.status.success());
    let out = run(&["spec", "allow-list", "--tree", tree, "--node", "leaf_y"]);
    assert_eq!(out.status.code(), Some(2));

    let out = run(&["spec", "grant", "--tree", tree, "--module", "leaf_x", "--dep", "os"]);
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn rules_dump_is_a_loadable_rule_set() {
    let out = run(&["rules", "dump"]);
    assert!(out.status.success());
    let v = stdout_json(&out);
    assert_eq!(
        v.get("schema_version").and_then(Value::as_str),
        Some(CODEGATE_RULES_SCHEMA_VERSION)
    );

    let dir = tempfile::tempdir().expect("tempdir");
    let rules = write(dir.path(), "rules.json", &String::from_utf8_lossy(&out.stdout));
    let src = write(dir.path(), "ok.py", "x = 1\n");
    let out = run(&[
        "validate",
        "--rules",
        rules.to_str().expect("utf-8 path"),
        "--input",
        src.to_str().expect("utf-8 path"),
    ]);
    assert_eq!(out.status.code(), Some(1), "stderr={}", String::from_utf8_lossy(&out.stderr));
}
