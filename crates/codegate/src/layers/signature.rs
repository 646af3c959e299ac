//! Signature checks. Only the first function of a unit is inspected.

use std::collections::BTreeSet;

use anyhow::Result;

use super::{no_function, unparsed, LayerInput};
use crate::report::{CheckOutcome, LayerDetail};
use crate::source::FunctionDef;

fn first_function<'a>(cx: &LayerInput<'a>) -> Result<&'a FunctionDef, CheckOutcome> {
    let unit = cx.unit().ok_or_else(unparsed)?;
    unit.first_function().ok_or_else(no_function)
}

pub(super) fn parameters(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let func = match first_function(cx) {
        Ok(func) => func,
        Err(outcome) => return Ok(outcome),
    };
    let actual: Vec<String> = func.params.iter().map(|p| p.name.clone()).collect();

    let Some(expected_names) = cx.signature.and_then(|s| s.input_names()) else {
        return Ok(CheckOutcome::pass(format!(
            "function {:?} has {} parameter(s)",
            func.name,
            actual.len()
        ))
        .with_detail(LayerDetail::Parameters {
            actual,
            expected: None,
            missing: Vec::new(),
            unexpected: Vec::new(),
        }));
    };

    let expected: Vec<String> = expected_names.map(str::to_string).collect();
    let actual_set: BTreeSet<&str> = actual.iter().map(String::as_str).collect();
    let expected_set: BTreeSet<&str> = expected.iter().map(String::as_str).collect();
    let missing: Vec<String> = expected_set
        .difference(&actual_set)
        .map(|s| s.to_string())
        .collect();
    let unexpected: Vec<String> = actual_set
        .difference(&expected_set)
        .map(|s| s.to_string())
        .collect();

    let outcome = if missing.is_empty() && unexpected.is_empty() {
        CheckOutcome::pass("parameters match the expected signature")
    } else {
        CheckOutcome::fail(format!(
            "parameters do not match: expected {expected:?}, actual {actual:?}"
        ))
    };
    Ok(outcome.with_detail(LayerDetail::Parameters {
        actual,
        expected: Some(expected),
        missing,
        unexpected,
    }))
}

pub(super) fn returns(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let func = match first_function(cx) {
        Ok(func) => func,
        Err(outcome) => return Ok(outcome),
    };
    Ok(if func.has_return {
        CheckOutcome::pass(format!("function {:?} returns a value", func.name))
    } else {
        CheckOutcome::fail(format!("function {:?} has no return statement", func.name))
    })
}

pub(super) fn annotations(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let func = match first_function(cx) {
        Ok(func) => func,
        Err(outcome) => return Ok(outcome),
    };
    let params = func.params.len();
    let annotated = func.annotated_param_count();
    let has_return_annotation = func.return_annotation.is_some();
    let coverage = match params {
        0 if has_return_annotation => 1.0,
        0 => 0.0,
        n => annotated as f64 / n as f64,
    };
    let pct = coverage * 100.0;
    let min = cx.rules.thresholds().annotation_coverage_min;

    let outcome = if coverage >= min && has_return_annotation {
        CheckOutcome::pass(format!("annotation coverage {pct:.0}%"))
    } else if !has_return_annotation {
        CheckOutcome::fail(format!(
            "annotation coverage {pct:.0}%, return annotation missing"
        ))
    } else {
        CheckOutcome::fail(format!(
            "annotation coverage {pct:.0}% is below {:.0}%",
            min * 100.0
        ))
    };
    Ok(outcome.with_detail(LayerDetail::AnnotationCoverage {
        annotated,
        params,
        coverage,
        has_return_annotation,
    }))
}

pub(super) fn docstring(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let func = match first_function(cx) {
        Ok(func) => func,
        Err(outcome) => return Ok(outcome),
    };
    let chars = func
        .docstring
        .as_deref()
        .map(|d| d.chars().count())
        .unwrap_or(0);
    let outcome = if chars > cx.rules.thresholds().docstring_min_chars {
        CheckOutcome::pass(format!("docstring present ({chars} chars)"))
    } else if func.docstring.is_none() {
        CheckOutcome::fail(format!("function {:?} has no docstring", func.name))
    } else {
        CheckOutcome::fail(format!("docstring too short ({chars} chars)"))
    };
    Ok(outcome.with_detail(LayerDetail::Docstring { chars }))
}
