use std::collections::BTreeSet;
use std::fmt;

use codegate_contracts::{
    AUTHORIZATION_LAYER, CODEGATE_REPORT_SCHEMA_VERSION, STANDARD_LAYER_COUNT,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::rules::{DangerCategory, SecretCategory};
use crate::source::SyntaxFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerId {
    Syntax,
    Definition,
    Formatting,
    Naming,
    Parameters,
    Return,
    Annotations,
    Docstring,
    Imports,
    Stdlib,
    ThirdParty,
    RelativeImports,
    TypeConsistency,
    Logic,
    ErrorHandling,
    Security,
    Performance,
    Authorization,
}

impl LayerId {
    pub const STANDARD: [LayerId; STANDARD_LAYER_COUNT] = [
        LayerId::Syntax,
        LayerId::Definition,
        LayerId::Formatting,
        LayerId::Naming,
        LayerId::Parameters,
        LayerId::Return,
        LayerId::Annotations,
        LayerId::Docstring,
        LayerId::Imports,
        LayerId::Stdlib,
        LayerId::ThirdParty,
        LayerId::RelativeImports,
        LayerId::TypeConsistency,
        LayerId::Logic,
        LayerId::ErrorHandling,
        LayerId::Security,
        LayerId::Performance,
    ];

    pub fn number(self) -> u32 {
        match self {
            LayerId::Syntax => 1,
            LayerId::Definition => 2,
            LayerId::Formatting => 3,
            LayerId::Naming => 4,
            LayerId::Parameters => 5,
            LayerId::Return => 6,
            LayerId::Annotations => 7,
            LayerId::Docstring => 8,
            LayerId::Imports => 9,
            LayerId::Stdlib => 10,
            LayerId::ThirdParty => 11,
            LayerId::RelativeImports => 12,
            LayerId::TypeConsistency => 13,
            LayerId::Logic => 14,
            LayerId::ErrorHandling => 15,
            LayerId::Security => 16,
            LayerId::Performance => 17,
            LayerId::Authorization => AUTHORIZATION_LAYER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LayerId::Syntax => "syntax",
            LayerId::Definition => "definition",
            LayerId::Formatting => "formatting",
            LayerId::Naming => "naming",
            LayerId::Parameters => "parameters",
            LayerId::Return => "return",
            LayerId::Annotations => "annotations",
            LayerId::Docstring => "docstring",
            LayerId::Imports => "imports",
            LayerId::Stdlib => "stdlib",
            LayerId::ThirdParty => "third_party",
            LayerId::RelativeImports => "relative_imports",
            LayerId::TypeConsistency => "type_consistency",
            LayerId::Logic => "logic",
            LayerId::ErrorHandling => "error_handling",
            LayerId::Security => "security",
            LayerId::Performance => "performance",
            LayerId::Authorization => "authorization",
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{} ({})", self.number(), self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AntiPattern {
    pub line: usize,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DangerousCallFinding {
    pub line: usize,
    pub call: String,
    pub category: DangerCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretFinding {
    pub line: usize,
    pub category: SecretCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationOutcome {
    pub node_id: String,
    pub imported: BTreeSet<String>,
    pub allowed: BTreeSet<String>,
    pub undeclared: BTreeSet<String>,
    /// The `UndeclaredDependency` hard rejection.
    pub rejected: bool,
}

impl AuthorizationOutcome {
    pub fn evaluate(node_id: &str, imported: BTreeSet<String>, allowed: BTreeSet<String>) -> Self {
        let undeclared: BTreeSet<String> = imported.difference(&allowed).cloned().collect();
        Self {
            node_id: node_id.to_string(),
            rejected: !undeclared.is_empty(),
            imported,
            allowed,
            undeclared,
        }
    }
}

/// Typed payload attached to a layer result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LayerDetail {
    Issues {
        /// Violations found, before truncation to `issues`.
        total: usize,
        issues: Vec<Issue>,
    },
    Syntax(SyntaxFault),
    Parameters {
        actual: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expected: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        missing: Vec<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        unexpected: Vec<String>,
    },
    AnnotationCoverage {
        annotated: usize,
        params: usize,
        coverage: f64,
        has_return_annotation: bool,
    },
    Docstring {
        chars: usize,
    },
    ImportCount {
        count: usize,
    },
    ClassifiedImports {
        count: usize,
        modules: Vec<String>,
    },
    RelativeImports {
        imports: Vec<String>,
    },
    Authorization(AuthorizationOutcome),
    TypeCoverage {
        annotated_functions: usize,
        functions: usize,
        coverage: f64,
    },
    ControlFlow {
        conditionals: usize,
        for_loops: usize,
        while_loops: usize,
    },
    ErrorHandling {
        try_blocks: usize,
        handlers: usize,
        anti_patterns: Vec<AntiPattern>,
    },
    Security {
        dangerous_calls: Vec<DangerousCallFinding>,
        secrets: Vec<SecretFinding>,
    },
    LoopNesting {
        max_depth: usize,
        limit: usize,
    },
    Fault {
        message: String,
    },
}

/// What a layer decided, before the aggregator stamps it with the layer id.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub message: String,
    pub detail: Option<LayerDetail>,
}

impl CheckOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            detail: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: LayerDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub layer: u32,
    pub name: &'static str,
    pub passed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<LayerDetail>,
}

impl CheckResult {
    pub fn new(id: LayerId, outcome: CheckOutcome) -> Self {
        Self {
            layer: id.number(),
            name: id.name(),
            passed: outcome.passed,
            message: outcome.message,
            detail: outcome.detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub schema_version: &'static str,
    pub passed: bool,
    pub layers: Vec<CheckResult>,
    pub quality_score: u32,
    pub total_layers: usize,
    pub passed_layers: usize,
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<AuthorizationOutcome>,
    pub source_sha256: String,
}

impl ValidationReport {
    /// Aggregates layer results in execution order.
    pub fn assemble(source: &str, layers: Vec<CheckResult>, max_suggestions: usize) -> Self {
        let total_layers = layers.len();
        let passed_layers = layers.iter().filter(|r| r.passed).count();
        let authorization = layers.iter().find_map(|r| match &r.detail {
            Some(LayerDetail::Authorization(outcome)) => Some(outcome.clone()),
            _ => None,
        });
        let suggestions = suggestions(&layers, max_suggestions);
        Self {
            schema_version: CODEGATE_REPORT_SCHEMA_VERSION,
            passed: layers.iter().all(|r| r.passed),
            quality_score: quality_score(passed_layers, total_layers),
            total_layers,
            passed_layers,
            suggestions,
            authorization,
            source_sha256: sha256_hex(source.as_bytes()),
            layers,
        }
    }

    pub fn layer(&self, number: u32) -> Option<&CheckResult> {
        self.layers.iter().find(|r| r.layer == number)
    }

    pub fn is_rejected(&self) -> bool {
        self.authorization.as_ref().is_some_and(|a| a.rejected)
    }
}

/// `round(100 * passed / total)` with halves rounded up; 0 when nothing ran.
pub fn quality_score(passed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let score = (200 * passed as u64 + total as u64) / (2 * total as u64);
    u32::try_from(score).unwrap_or(100)
}

fn suggestions(layers: &[CheckResult], max: usize) -> Vec<String> {
    let mut failed: Vec<&CheckResult> = layers.iter().filter(|r| !r.passed).collect();
    failed.sort_by_key(|r| r.layer);
    failed
        .into_iter()
        .take(max)
        .map(|r| format!("L{} ({}): {}", r.layer, r.name, r.message))
        .collect()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: LayerId, passed: bool) -> CheckResult {
        let outcome = if passed {
            CheckOutcome::pass("ok")
        } else {
            CheckOutcome::fail("bad")
        };
        CheckResult::new(id, outcome)
    }

    #[test]
    fn quality_score_rounds_half_up() {
        assert_eq!(quality_score(0, 0), 0);
        assert_eq!(quality_score(17, 17), 100);
        assert_eq!(quality_score(1, 8), 13);
        assert_eq!(quality_score(1, 3), 33);
        assert_eq!(quality_score(2, 3), 67);
        assert_eq!(quality_score(12, 17), 71);
        assert_eq!(quality_score(16, 18), 89);
    }

    #[test]
    fn standard_layers_are_numbered_in_order() {
        let numbers: Vec<u32> = LayerId::STANDARD.iter().map(|id| id.number()).collect();
        let expected: Vec<u32> = (1..=STANDARD_LAYER_COUNT as u32).collect();
        assert_eq!(numbers, expected);
        assert_eq!(LayerId::Authorization.number(), AUTHORIZATION_LAYER);
        assert!(!LayerId::STANDARD.contains(&LayerId::Authorization));
    }

    #[test]
    fn suggestions_are_capped_and_ordered_by_layer() {
        let layers = vec![
            result(LayerId::Syntax, true),
            result(LayerId::Imports, false),
            result(LayerId::Authorization, false),
            result(LayerId::Naming, false),
            result(LayerId::Security, false),
            result(LayerId::Docstring, false),
            result(LayerId::Return, false),
            result(LayerId::Performance, false),
        ];
        let report = ValidationReport::assemble("x = 1\n", layers, 5);
        assert_eq!(
            report.suggestions,
            [
                "L4 (naming): bad",
                "L6 (return): bad",
                "L8 (docstring): bad",
                "L9 (imports): bad",
                "L16 (security): bad",
            ]
        );
        assert!(!report.passed);
        assert_eq!(report.total_layers, 8);
        assert_eq!(report.passed_layers, 1);
        assert_eq!(report.quality_score, 13);
    }

    #[test]
    fn detail_serializes_with_kind_tag() {
        let detail = LayerDetail::LoopNesting {
            max_depth: 3,
            limit: 3,
        };
        let v = serde_json::to_value(&detail).expect("serialize");
        assert_eq!(
            v,
            serde_json::json!({"kind": "loop_nesting", "max_depth": 3, "limit": 3})
        );
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
