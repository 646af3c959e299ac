//! Layered quality and security gate for generated Python code.
//!
//! A [`Validator`] parses a [`CodeUnit`] once and runs up to seventeen
//! independent layers over it, grouped into four [`Tier`]s. When the unit is
//! bound to a spec-tree node, an authorization gate additionally rejects any
//! import the node was never granted. The result is a [`ValidationReport`].

pub mod layers;
pub mod report;
pub mod rules;
pub mod source;
pub mod unit;
pub mod validate;

pub use layers::{Layer, Tier};
pub use report::{CheckResult, LayerId, ValidationReport};
pub use rules::{load_rules, CompiledRules, RuleSet};
pub use unit::CodeUnit;
pub use validate::{GateError, Validator};
