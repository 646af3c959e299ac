//! Shared, version-pinned document identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable I/O: validation reports, CLI tool reports, rule files
//! and persisted spec trees. Bump the version suffix whenever a document shape
//! changes incompatibly.

pub const CODEGATE_REPORT_SCHEMA_VERSION: &str = "codegate.report@0.1.0";
pub const CODEGATE_TOOL_REPORT_SCHEMA_VERSION: &str = "codegate.tool.report@0.1.0";

pub const CODEGATE_RULES_SCHEMA_VERSION: &str = "codegate.rules@0.1.0";
pub const CODEGATE_RULES_SCHEMA_VERSIONS_SUPPORTED: &[&str] = &[CODEGATE_RULES_SCHEMA_VERSION];

pub const CODEGATE_SPEC_TREE_SCHEMA_VERSION: &str = "codegate.spec-tree@0.1.0";
pub const CODEGATE_SPEC_TREE_SCHEMA_VERSIONS_SUPPORTED: &[&str] =
    &[CODEGATE_SPEC_TREE_SCHEMA_VERSION];

/// Number of layers in the standard four-tier pipeline.
pub const STANDARD_LAYER_COUNT: usize = 17;

/// Layer number reported by the spec-tree authorization gate.
pub const AUTHORIZATION_LAYER: u32 = 18;
