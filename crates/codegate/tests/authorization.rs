use codegate::report::LayerDetail;
use codegate::{CodeUnit, CompiledRules, GateError, Tier, Validator};
use codegate_spectree::{ExpectedSignature, SpecNode, SpecTree, SpecTreeError};

fn validator() -> Validator {
    Validator::standard(CompiledRules::builtin().expect("builtin rules"))
}

fn module_a_tree() -> SpecTree {
    SpecTree::new(
        SpecNode::module("root", "Root").with_child(
            SpecNode::module("module_a", "ModuleA")
                .with_dependencies(["math"])
                .with_child(SpecNode::leaf("leaf_x", "LeafX")),
        ),
    )
    .expect("valid tree")
}

fn payments_tree() -> SpecTree {
    SpecTree::new(
        SpecNode::module("root", "Shop")
            .with_dependencies(["json"])
            .with_child(
                SpecNode::module("external_gateway", "External Gateway")
                    .with_dependencies(["requests"])
                    .with_child(
                        SpecNode::leaf("stripe_payment_node", "Stripe Payment").with_signature(
                            ExpectedSignature::from_names(["token", "amount"]).with_output("bool"),
                        ),
                    ),
            ),
    )
    .expect("valid tree")
}

#[test]
fn granted_import_passes_the_gate() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import math\n\ndef area(r):\n    return math.pi * r * r\n")
        .bound_to("leaf_x");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");

    let gate = report.layer(18).expect("gate ran");
    assert!(gate.passed, "{}", gate.message);
    assert_eq!(gate.name, "authorization");
    let auth = report.authorization.as_ref().expect("authorization outcome");
    assert!(!auth.rejected);
    assert!(auth.undeclared.is_empty());
    assert_eq!(report.total_layers, 18);
}

#[test]
fn ungranted_import_is_an_undeclared_dependency() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import os\n\ndef cwd():\n    return os.getcwd()\n").bound_to("leaf_x");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");

    let gate = report.layer(18).expect("gate ran");
    assert!(!gate.passed);
    assert!(gate.message.starts_with("UndeclaredDependency"));
    assert!(report.is_rejected());
    assert!(!report.passed);
    let auth = report.authorization.as_ref().expect("authorization outcome");
    assert_eq!(auth.undeclared.iter().collect::<Vec<_>>(), ["os"]);
}

#[test]
fn gate_sits_right_after_the_dependency_tier() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import math\n").bound_to("leaf_x");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");
    let numbers: Vec<u32> = report.layers.iter().map(|r| r.layer).collect();
    assert_eq!(
        numbers,
        [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 18, 13, 14, 15, 16, 17]
    );
}

#[test]
fn gate_runs_even_when_the_dependency_tier_is_not_selected() {
    let tree = module_a_tree();
    let rules = CompiledRules::builtin().expect("builtin rules");
    let v = Validator::with_tiers(rules, [Tier::Structure, Tier::Logic]);
    let unit = CodeUnit::new("import os\n").bound_to("leaf_x");
    let report = v.validate(&unit, Some(&tree)).expect("bound unit");
    let numbers: Vec<u32> = report.layers.iter().map(|r| r.layer).collect();
    assert_eq!(numbers, [1, 2, 3, 4, 18, 13, 14, 15, 16, 17]);
    assert!(report.is_rejected());
}

#[test]
fn informational_layers_never_authorize() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import requests\n").bound_to("leaf_x");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");
    assert!(report.layer(11).expect("L11").passed);
    assert!(!report.layer(18).expect("gate").passed);
}

#[test]
fn grants_accumulate_down_the_tree() {
    let tree = payments_tree();
    let src = "import json\nimport requests\n\ndef process_payment(token, amount):\n    return True\n";
    let unit = CodeUnit::new(src).bound_to("stripe_payment_node");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");
    let auth = report.authorization.as_ref().expect("authorization outcome");
    assert!(!auth.rejected);
    assert_eq!(
        auth.allowed.iter().collect::<Vec<_>>(),
        ["json", "requests"]
    );
}

#[test]
fn leaf_signature_is_used_when_the_unit_has_none() {
    let tree = payments_tree();
    let unit = CodeUnit::new("def process_payment(token):\n    return True\n")
        .bound_to("stripe_payment_node");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");
    let l5 = report.layer(5).expect("L5");
    assert!(!l5.passed);
    match &l5.detail {
        Some(LayerDetail::Parameters {
            expected, missing, ..
        }) => {
            assert_eq!(
                expected.as_deref(),
                Some(&["token".to_string(), "amount".to_string()][..])
            );
            assert_eq!(missing, &["amount"]);
        }
        other => panic!("unexpected detail {other:?}"),
    }

    let explicit = CodeUnit::new("def process_payment(token):\n    return True\n")
        .with_signature(ExpectedSignature::from_names(["token"]))
        .bound_to("stripe_payment_node");
    let report = validator().validate(&explicit, Some(&tree)).expect("bound unit");
    assert!(report.layer(5).expect("L5").passed);
}

#[test]
fn unknown_node_is_a_configuration_error() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import math\n").bound_to("ghost");
    match validator().validate(&unit, Some(&tree)) {
        Err(GateError::SpecTree(SpecTreeError::NodeNotFound { id })) => assert_eq!(id, "ghost"),
        other => panic!("expected NodeNotFound, got {other:?}"),
    }
}

#[test]
fn bound_unit_without_a_tree_is_a_configuration_error() {
    let unit = CodeUnit::new("import math\n").bound_to("leaf_x");
    assert_eq!(
        validator().validate(&unit, None),
        Err(GateError::MissingSpecTree {
            node_id: "leaf_x".to_string()
        })
    );
}

#[test]
fn unparseable_bound_unit_fails_the_gate_without_an_outcome() {
    let tree = module_a_tree();
    let unit = CodeUnit::new("import (\n").bound_to("leaf_x");
    let report = validator().validate(&unit, Some(&tree)).expect("bound unit");
    let gate = report.layer(18).expect("gate ran");
    assert!(!gate.passed);
    assert_eq!(gate.message, "source does not parse");
    assert!(report.authorization.is_none());
}

#[test]
fn batch_validation_keeps_input_order() {
    let tree = module_a_tree();
    let units = vec![
        CodeUnit::new("import math\n").bound_to("leaf_x"),
        CodeUnit::new("import os\n").bound_to("leaf_x"),
        CodeUnit::new("import math\n").bound_to("ghost"),
    ];
    let results = validator().validate_all(&units, Some(&tree));
    assert_eq!(results.len(), 3);
    assert!(!results[0].as_ref().expect("first").is_rejected());
    assert!(results[1].as_ref().expect("second").is_rejected());
    assert!(results[2].is_err());
}
