use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use codegate_spectree::{ExpectedSignature, SpecTree, SpecTreeError};
use rayon::prelude::*;
use thiserror::Error;

use crate::layers::{Binding, Layer, LayerInput, Tier, AUTHORIZATION};
use crate::report::{CheckOutcome, CheckResult, LayerDetail, ValidationReport};
use crate::rules::CompiledRules;
use crate::source;
use crate::unit::CodeUnit;

/// Configuration errors that stop a unit from being validated at all.
///
/// These never fold into a quality score.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateError {
    #[error("code unit is bound to spec node {node_id:?} but no spec tree was supplied")]
    MissingSpecTree { node_id: String },

    #[error(transparent)]
    SpecTree(#[from] SpecTreeError),
}

/// Runs a fixed set of tiers over code units.
///
/// Every configured layer runs for every unit; a failing or faulting layer
/// never stops the ones after it.
#[derive(Debug, Clone)]
pub struct Validator {
    rules: CompiledRules,
    tiers: Vec<Tier>,
}

impl Validator {
    pub fn standard(rules: CompiledRules) -> Self {
        Self::with_tiers(rules, Tier::ALL)
    }

    /// Runs only `tiers`, in ascending tier order regardless of how they are given.
    pub fn with_tiers(rules: CompiledRules, tiers: impl IntoIterator<Item = Tier>) -> Self {
        let mut tiers: Vec<Tier> = tiers.into_iter().collect();
        tiers.sort();
        tiers.dedup();
        Self { rules, tiers }
    }

    pub fn rules(&self) -> &CompiledRules {
        &self.rules
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Validates an unbound source text.
    pub fn validate_source(&self, source: &str) -> ValidationReport {
        self.run(source, None, None)
    }

    pub fn validate(
        &self,
        unit: &CodeUnit,
        tree: Option<&SpecTree>,
    ) -> Result<ValidationReport, GateError> {
        let Some(node_id) = unit.node_id() else {
            return Ok(self.run(unit.source(), unit.signature(), None));
        };
        let tree = tree.ok_or_else(|| GateError::MissingSpecTree {
            node_id: node_id.to_string(),
        })?;
        let binding = Binding {
            node_id: node_id.to_string(),
            allowed: tree.effective_allow_list(node_id)?,
        };
        let signature = match unit.signature() {
            Some(sig) => Some(sig),
            None => tree.signature_of(node_id)?,
        };
        Ok(self.run(unit.source(), signature, Some(&binding)))
    }

    /// Validates independent units in parallel; results keep the input order.
    pub fn validate_all(
        &self,
        units: &[CodeUnit],
        tree: Option<&SpecTree>,
    ) -> Vec<Result<ValidationReport, GateError>> {
        units.par_iter().map(|u| self.validate(u, tree)).collect()
    }

    fn run(
        &self,
        source: &str,
        signature: Option<&ExpectedSignature>,
        binding: Option<&Binding>,
    ) -> ValidationReport {
        let parsed = source::parse(source);
        let cx = LayerInput {
            source,
            parsed: parsed.as_ref(),
            signature,
            binding,
            rules: &self.rules,
        };

        let mut results = Vec::new();
        let mut gate_pending = binding.is_some();
        for &tier in &self.tiers {
            if gate_pending && tier > Tier::Dependency {
                results.push(evaluate(&AUTHORIZATION, &cx));
                gate_pending = false;
            }
            for layer in tier.layers() {
                results.push(evaluate(layer, &cx));
            }
            if gate_pending && tier == Tier::Dependency {
                results.push(evaluate(&AUTHORIZATION, &cx));
                gate_pending = false;
            }
        }
        if gate_pending {
            results.push(evaluate(&AUTHORIZATION, &cx));
        }

        let report =
            ValidationReport::assemble(source, results, self.rules.thresholds().max_suggestions);
        if let (true, Some(auth)) = (report.is_rejected(), &report.authorization) {
            tracing::warn!(
                node = %auth.node_id,
                undeclared = ?auth.undeclared,
                "rejected: undeclared dependencies"
            );
        }
        report
    }
}

/// Runs one layer, turning an error or a panic into a failed result.
pub fn evaluate(layer: &dyn Layer, cx: &LayerInput<'_>) -> CheckResult {
    let id = layer.id();
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| layer.check(cx))) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => fault(id.name(), format!("{err:#}")),
        Err(payload) => fault(id.name(), panic_message(payload.as_ref())),
    };
    tracing::debug!(layer = id.number(), name = id.name(), passed = outcome.passed, "layer");
    CheckResult::new(id, outcome)
}

fn fault(name: &str, message: String) -> CheckOutcome {
    tracing::warn!(layer = name, %message, "layer fault");
    CheckOutcome::fail(format!("internal fault: {message}"))
        .with_detail(LayerDetail::Fault { message })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "panic with a non-string payload".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::LayerId;

    struct Panics;

    impl Layer for Panics {
        fn id(&self) -> LayerId {
            LayerId::Logic
        }

        fn check(&self, _cx: &LayerInput<'_>) -> anyhow::Result<CheckOutcome> {
            panic!("boom");
        }
    }

    struct Errors;

    impl Layer for Errors {
        fn id(&self) -> LayerId {
            LayerId::Security
        }

        fn check(&self, _cx: &LayerInput<'_>) -> anyhow::Result<CheckOutcome> {
            anyhow::bail!("rule table unavailable")
        }
    }

    fn with_input<R>(source: &str, f: impl FnOnce(&LayerInput<'_>) -> R) -> R {
        let rules = CompiledRules::builtin().expect("builtin rules");
        let parsed = source::parse(source);
        let cx = LayerInput {
            source,
            parsed: parsed.as_ref(),
            signature: None,
            binding: None,
            rules: &rules,
        };
        f(&cx)
    }

    #[test]
    fn panicking_layer_becomes_a_fault_result() {
        let result = with_input("x = 1\n", |cx| evaluate(&Panics, cx));
        assert_eq!(result.layer, 14);
        assert!(!result.passed);
        assert_eq!(result.message, "internal fault: boom");
        assert!(matches!(result.detail, Some(LayerDetail::Fault { .. })));
    }

    #[test]
    fn erroring_layer_becomes_a_fault_result() {
        let result = with_input("x = 1\n", |cx| evaluate(&Errors, cx));
        assert_eq!(result.layer, 16);
        assert!(!result.passed);
        assert!(result.message.contains("rule table unavailable"));
    }

    #[test]
    fn gate_without_binding_is_a_fault_not_a_panic() {
        let result = with_input("import os\n", |cx| evaluate(&AUTHORIZATION, cx));
        assert_eq!(result.layer, 18);
        assert!(!result.passed);
        assert!(matches!(result.detail, Some(LayerDetail::Fault { .. })));
    }

    #[test]
    fn tiers_are_sorted_and_deduplicated() {
        let rules = CompiledRules::builtin().expect("builtin rules");
        let v = Validator::with_tiers(rules, [Tier::Logic, Tier::Structure, Tier::Logic]);
        assert_eq!(v.tiers(), [Tier::Structure, Tier::Logic]);
    }
}
