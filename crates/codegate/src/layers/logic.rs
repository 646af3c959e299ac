use std::collections::BTreeSet;

use anyhow::Result;

use super::{unparsed, LayerInput};
use crate::report::{AntiPattern, CheckOutcome, DangerousCallFinding, LayerDetail, SecretFinding};
use crate::rules::SecretCategory;
use crate::source::{Callee, ControlKind, HandlerBody};

pub(super) fn type_consistency(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let functions = unit.functions().len();
    if functions == 0 {
        return Ok(CheckOutcome::pass("no functions to check"));
    }
    let annotated_functions = unit
        .functions()
        .iter()
        .filter(|f| f.has_any_annotation())
        .count();
    let coverage = annotated_functions as f64 / functions as f64;
    let min_pct = cx.rules.thresholds().type_coverage_min_pct as usize;
    let pct = annotated_functions * 100 / functions;
    let outcome = if annotated_functions * 100 >= min_pct * functions {
        CheckOutcome::pass(format!(
            "{pct}% of {functions} function(s) carry type annotations"
        ))
    } else {
        CheckOutcome::fail(format!(
            "only {pct}% of {functions} function(s) carry type annotations, need {min_pct}%"
        ))
    };
    Ok(outcome.with_detail(LayerDetail::TypeCoverage {
        annotated_functions,
        functions,
        coverage,
    }))
}

/// Signal only; never fails on a parsed unit.
pub(super) fn control_flow(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let conditionals = unit.count_control(ControlKind::Conditional);
    let for_loops = unit.count_control(ControlKind::ForLoop);
    let while_loops = unit.count_control(ControlKind::WhileLoop);
    Ok(CheckOutcome::pass(format!(
        "{conditionals} conditional(s), {for_loops} for loop(s), {while_loops} while loop(s)"
    ))
    .with_detail(LayerDetail::ControlFlow {
        conditionals,
        for_loops,
        while_loops,
    }))
}

pub(super) fn error_handling(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let try_blocks = unit.try_blocks();
    if try_blocks.is_empty() {
        return Ok(CheckOutcome::fail("no error handling block"));
    }

    let mut handlers = 0;
    let mut anti_patterns = Vec::new();
    for handler in try_blocks.iter().flat_map(|t| &t.handlers) {
        handlers += 1;
        let pattern = match handler.body {
            HandlerBody::Empty => "handler body is empty",
            HandlerBody::NoOp => "handler body is a no-op",
            HandlerBody::Substantive => continue,
        };
        anti_patterns.push(AntiPattern {
            line: handler.line,
            pattern: pattern.to_string(),
        });
    }

    let outcome = if anti_patterns.is_empty() {
        CheckOutcome::pass(format!(
            "{handlers} valid handler(s) in {} try block(s)",
            try_blocks.len()
        ))
    } else {
        let listed: Vec<String> = anti_patterns
            .iter()
            .map(|a| format!("{} (line {})", a.pattern, a.line))
            .collect();
        CheckOutcome::fail(format!(
            "{} handler anti-pattern(s): {}",
            anti_patterns.len(),
            listed.join("; ")
        ))
    };
    Ok(outcome.with_detail(LayerDetail::ErrorHandling {
        try_blocks: try_blocks.len(),
        handlers,
        anti_patterns,
    }))
}

pub(super) fn security(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };

    let mut dangerous_calls = Vec::new();
    for call in unit.calls() {
        let (Callee::Direct(written) | Callee::Attribute(written)) = &call.callee else {
            continue;
        };
        let resolved = unit.canonical_path(written);
        if let Some(category) = cx.rules.danger_of_call(&resolved) {
            dangerous_calls.push(DangerousCallFinding {
                line: call.line,
                call: resolved,
                category,
            });
        }
    }
    dangerous_calls.sort_by_key(|f| f.line);

    let mut secrets = Vec::new();
    for (idx, line) in cx.source.lines().enumerate() {
        let hits: BTreeSet<SecretCategory> = cx
            .rules
            .secret_patterns()
            .filter(|(_, re)| re.is_match(line))
            .map(|(category, _)| category)
            .collect();
        secrets.extend(hits.into_iter().map(|category| SecretFinding {
            line: idx + 1,
            category,
        }));
    }

    if dangerous_calls.is_empty() && secrets.is_empty() {
        return Ok(CheckOutcome::pass("no security findings"));
    }
    let mut listed: Vec<String> = dangerous_calls
        .iter()
        .map(|f| {
            format!(
                "dangerous call {} ({}) at line {}",
                f.call,
                f.category.label(),
                f.line
            )
        })
        .collect();
    listed.extend(
        secrets
            .iter()
            .map(|s| format!("hardcoded {} at line {}", s.category.label(), s.line)),
    );
    Ok(CheckOutcome::fail(format!(
        "{} security finding(s): {}",
        listed.len(),
        listed.join("; ")
    ))
    .with_detail(LayerDetail::Security {
        dangerous_calls,
        secrets,
    }))
}

pub(super) fn performance(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let max_depth = unit.max_loop_depth();
    let limit = cx.rules.thresholds().max_loop_depth;
    let outcome = if max_depth >= limit {
        CheckOutcome::fail(format!(
            "loop nesting depth {max_depth} reaches the limit of {limit}"
        ))
    } else {
        CheckOutcome::pass(format!("max loop nesting depth {max_depth}"))
    };
    Ok(outcome.with_detail(LayerDetail::LoopNesting { max_depth, limit }))
}
