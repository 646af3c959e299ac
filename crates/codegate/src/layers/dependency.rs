//! Informational dependency checks. None of these reject a unit for what it
//! imports; that is the authorization gate's job.

use std::collections::BTreeSet;

use anyhow::Result;

use super::{unparsed, LayerInput};
use crate::report::{CheckOutcome, LayerDetail};
use crate::source::ParsedUnit;

pub(super) fn imports(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let count = unit.imports().len();
    Ok(CheckOutcome::pass(format!("{count} import statement(s)"))
        .with_detail(LayerDetail::ImportCount { count }))
}

pub(super) fn stdlib(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let modules = classify(unit, |m| cx.rules.is_stdlib(m));
    Ok(
        CheckOutcome::pass(format!("{} standard-library module(s) imported", modules.len()))
            .with_detail(LayerDetail::ClassifiedImports {
                count: modules.len(),
                modules,
            }),
    )
}

pub(super) fn third_party(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let modules = classify(unit, |m| cx.rules.is_third_party(m));
    let message = if modules.is_empty() {
        "no known third-party modules imported".to_string()
    } else {
        format!("{} known third-party module(s) imported", modules.len())
    };
    Ok(
        CheckOutcome::pass(message).with_detail(LayerDetail::ClassifiedImports {
            count: modules.len(),
            modules,
        }),
    )
}

pub(super) fn relative_imports(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let relative: Vec<String> = unit
        .imports()
        .iter()
        .filter(|i| i.is_relative())
        .map(|i| i.dotted())
        .collect();
    if relative.is_empty() {
        return Ok(CheckOutcome::pass("no relative imports"));
    }
    Ok(CheckOutcome::fail(format!(
        "{} relative import(s) may form a dependency cycle: {}",
        relative.len(),
        relative.join(", ")
    ))
    .with_detail(LayerDetail::RelativeImports { imports: relative }))
}

/// Distinct top-level imported names, sorted.
pub(super) fn imported_names(unit: &ParsedUnit) -> BTreeSet<String> {
    unit.imports()
        .iter()
        .flat_map(|i| i.top_level_names())
        .map(str::to_string)
        .collect()
}

fn classify(unit: &ParsedUnit, keep: impl Fn(&str) -> bool) -> Vec<String> {
    imported_names(unit)
        .into_iter()
        .filter(|m| keep(m))
        .collect()
}
