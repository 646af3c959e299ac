use anyhow::Result;

use super::{unparsed, LayerInput};
use crate::report::{CheckOutcome, Issue, LayerDetail};

pub(super) fn syntax(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    Ok(match cx.parsed {
        Ok(_) => CheckOutcome::pass("source parses"),
        Err(fault) => CheckOutcome::fail(format!("syntax error at {fault}"))
            .with_detail(LayerDetail::Syntax(fault.clone())),
    })
}

pub(super) fn definition(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    Ok(if unit.has_definition() {
        CheckOutcome::pass(format!(
            "{} function(s), {} class(es) defined",
            unit.functions().len(),
            unit.classes().len()
        ))
    } else {
        CheckOutcome::fail("no function or class definition found")
    })
}

/// Text-based, so it runs even when the source does not parse.
pub(super) fn formatting(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let width = cx.rules.thresholds().indent_width;
    let mut issues = Vec::new();
    for (idx, line) in cx.source.lines().enumerate() {
        let line_no = idx + 1;
        if line.contains('\t') {
            issues.push(Issue {
                line: line_no,
                message: format!("line {line_no}: tab character"),
            });
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let indent = line.len() - line.trim_start_matches(' ').len();
        if indent % width != 0 {
            issues.push(Issue {
                line: line_no,
                message: format!(
                    "line {line_no}: indentation of {indent} is not a multiple of {width}"
                ),
            });
        }
    }
    Ok(capped_issues(
        issues,
        cx.rules.thresholds().max_format_issues,
        "formatting",
    ))
}

pub(super) fn naming(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };
    let mut issues = Vec::new();
    for func in unit.functions() {
        if !cx.rules.is_function_name(&func.name) {
            issues.push(Issue {
                line: func.line,
                message: format!("function name {:?} is not snake_case", func.name),
            });
        }
    }
    for class in unit.classes() {
        if !cx.rules.is_class_name(&class.name) {
            issues.push(Issue {
                line: class.line,
                message: format!("class name {:?} is not PascalCase", class.name),
            });
        }
    }
    issues.sort_by_key(|i| i.line);
    Ok(capped_issues(
        issues,
        cx.rules.thresholds().max_naming_issues,
        "naming",
    ))
}

fn capped_issues(mut issues: Vec<Issue>, max: usize, what: &str) -> CheckOutcome {
    if issues.is_empty() {
        return CheckOutcome::pass(format!("no {what} issues"));
    }
    let total = issues.len();
    issues.truncate(max);
    let listed: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
    CheckOutcome::fail(format!(
        "{total} {what} issue(s): {}",
        listed.join("; ")
    ))
    .with_detail(LayerDetail::Issues { total, issues })
}
