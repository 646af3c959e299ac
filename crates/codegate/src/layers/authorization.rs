use anyhow::Result;

use super::dependency::imported_names;
use super::{unparsed, LayerInput};
use crate::report::{AuthorizationOutcome, CheckOutcome, LayerDetail};

/// Rejects any top-level import the bound node was never granted.
pub(super) fn gate(cx: &LayerInput<'_>) -> Result<CheckOutcome> {
    let Some(binding) = cx.binding else {
        anyhow::bail!("authorization gate ran without a bound spec node");
    };
    let Some(unit) = cx.unit() else {
        return Ok(unparsed());
    };

    let outcome = AuthorizationOutcome::evaluate(
        &binding.node_id,
        imported_names(unit),
        binding.allowed.clone(),
    );
    let check = if outcome.rejected {
        let names: Vec<&str> = outcome.undeclared.iter().map(String::as_str).collect();
        CheckOutcome::fail(format!(
            "UndeclaredDependency: {} not granted to {:?}",
            names.join(", "),
            binding.node_id
        ))
    } else {
        CheckOutcome::pass(format!(
            "{} import(s) authorized for {:?}",
            outcome.imported.len(),
            binding.node_id
        ))
    };
    Ok(check.with_detail(LayerDetail::Authorization(outcome)))
}
