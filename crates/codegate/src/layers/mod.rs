//! The layer pipeline.
//!
//! Each layer is an independent check over the facts of one [`ParsedUnit`].
//! Layers are grouped into four tiers; a [`crate::Validator`] runs whichever
//! tiers it was composed with, always in ascending tier order.

use std::collections::BTreeSet;

use anyhow::Result;
use codegate_spectree::ExpectedSignature;

use crate::report::{CheckOutcome, LayerId};
use crate::rules::CompiledRules;
use crate::source::{ParsedUnit, SyntaxFault};

mod authorization;
mod dependency;
mod logic;
mod signature;
mod structure;

pub(crate) const UNPARSED_MESSAGE: &str = "source does not parse";
pub(crate) const NO_FUNCTION_MESSAGE: &str = "no function definition found";

/// One named check.
pub trait Layer: Send + Sync {
    fn id(&self) -> LayerId;
    fn check(&self, cx: &LayerInput<'_>) -> Result<CheckOutcome>;
}

/// The spec-tree node a unit is bound to, with its resolved allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub node_id: String,
    pub allowed: BTreeSet<String>,
}

/// Everything a layer may look at.
#[derive(Debug, Clone, Copy)]
pub struct LayerInput<'a> {
    pub source: &'a str,
    pub parsed: Result<&'a ParsedUnit, &'a SyntaxFault>,
    pub signature: Option<&'a ExpectedSignature>,
    pub binding: Option<&'a Binding>,
    pub rules: &'a CompiledRules,
}

impl<'a> LayerInput<'a> {
    pub fn unit(&self) -> Option<&'a ParsedUnit> {
        self.parsed.ok()
    }
}

/// A layer backed by a plain function.
#[derive(Clone, Copy)]
pub struct BuiltinLayer {
    id: LayerId,
    check: fn(&LayerInput<'_>) -> Result<CheckOutcome>,
}

impl Layer for BuiltinLayer {
    fn id(&self) -> LayerId {
        self.id
    }

    fn check(&self, cx: &LayerInput<'_>) -> Result<CheckOutcome> {
        (self.check)(cx)
    }
}

const fn builtin(id: LayerId, check: fn(&LayerInput<'_>) -> Result<CheckOutcome>) -> BuiltinLayer {
    BuiltinLayer { id, check }
}

static STRUCTURE: [BuiltinLayer; 4] = [
    builtin(LayerId::Syntax, structure::syntax),
    builtin(LayerId::Definition, structure::definition),
    builtin(LayerId::Formatting, structure::formatting),
    builtin(LayerId::Naming, structure::naming),
];

static SIGNATURE: [BuiltinLayer; 4] = [
    builtin(LayerId::Parameters, signature::parameters),
    builtin(LayerId::Return, signature::returns),
    builtin(LayerId::Annotations, signature::annotations),
    builtin(LayerId::Docstring, signature::docstring),
];

static DEPENDENCY: [BuiltinLayer; 4] = [
    builtin(LayerId::Imports, dependency::imports),
    builtin(LayerId::Stdlib, dependency::stdlib),
    builtin(LayerId::ThirdParty, dependency::third_party),
    builtin(LayerId::RelativeImports, dependency::relative_imports),
];

static LOGIC: [BuiltinLayer; 5] = [
    builtin(LayerId::TypeConsistency, logic::type_consistency),
    builtin(LayerId::Logic, logic::control_flow),
    builtin(LayerId::ErrorHandling, logic::error_handling),
    builtin(LayerId::Security, logic::security),
    builtin(LayerId::Performance, logic::performance),
];

/// The gate that rejects imports a bound unit was never granted.
pub static AUTHORIZATION: BuiltinLayer = builtin(LayerId::Authorization, authorization::gate);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, clap::ValueEnum)]
pub enum Tier {
    Structure,
    Signature,
    Dependency,
    Logic,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Structure, Tier::Signature, Tier::Dependency, Tier::Logic];

    /// Layers of this tier in ascending layer order. The authorization gate is
    /// not included; the validator adds it after the dependency tier.
    pub fn layers(self) -> &'static [BuiltinLayer] {
        match self {
            Tier::Structure => &STRUCTURE,
            Tier::Signature => &SIGNATURE,
            Tier::Dependency => &DEPENDENCY,
            Tier::Logic => &LOGIC,
        }
    }
}

fn unparsed() -> CheckOutcome {
    CheckOutcome::fail(UNPARSED_MESSAGE)
}

fn no_function() -> CheckOutcome {
    CheckOutcome::fail(NO_FUNCTION_MESSAGE)
}
