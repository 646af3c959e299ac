//! Rule tables consulted by the layers.
//!
//! Every list and threshold a layer depends on lives here so it can be shipped,
//! versioned and overridden as a JSON document instead of being baked into the
//! checks. `RuleSet::builtin()` is the shipped default; a rules file only needs
//! `schema_version` and `rules_id`, every other field falls back to the default.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use codegate_contracts::{CODEGATE_RULES_SCHEMA_VERSION, CODEGATE_RULES_SCHEMA_VERSIONS_SUPPORTED};
use jsonschema::Draft;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const RULES_SCHEMA_BYTES: &[u8] = include_bytes!("../../../schemas/codegate.rules.schema.json");

const STDLIB_MODULES: &[&str] = &[
    "__future__",
    "abc",
    "argparse",
    "asyncio",
    "base64",
    "bisect",
    "collections",
    "contextlib",
    "copy",
    "csv",
    "dataclasses",
    "datetime",
    "decimal",
    "enum",
    "functools",
    "hashlib",
    "heapq",
    "inspect",
    "io",
    "itertools",
    "json",
    "logging",
    "math",
    "multiprocessing",
    "os",
    "pathlib",
    "pickle",
    "random",
    "re",
    "shutil",
    "socket",
    "statistics",
    "string",
    "struct",
    "subprocess",
    "sys",
    "tempfile",
    "textwrap",
    "threading",
    "time",
    "traceback",
    "typing",
    "unittest",
    "uuid",
    "warnings",
];

const THIRD_PARTY_MODULES: &[&str] = &[
    "aiohttp",
    "boto3",
    "celery",
    "django",
    "fastapi",
    "flask",
    "httpx",
    "numpy",
    "pandas",
    "pydantic",
    "pytest",
    "redis",
    "requests",
    "sklearn",
    "sqlalchemy",
    "tensorflow",
    "torch",
];

const DANGEROUS_CALLS: &[(&str, DangerCategory)] = &[
    ("eval", DangerCategory::DynamicEval),
    ("exec", DangerCategory::DynamicExec),
    ("compile", DangerCategory::DynamicCompile),
    ("__import__", DangerCategory::DynamicImport),
    ("importlib.import_module", DangerCategory::DynamicImport),
    ("pickle.load", DangerCategory::UnsafeDeserialization),
    ("pickle.loads", DangerCategory::UnsafeDeserialization),
    ("marshal.load", DangerCategory::UnsafeDeserialization),
    ("marshal.loads", DangerCategory::UnsafeDeserialization),
    ("yaml.unsafe_load", DangerCategory::UnsafeDeserialization),
    ("os.system", DangerCategory::ProcessInvocation),
    ("os.popen", DangerCategory::ProcessInvocation),
    ("subprocess.call", DangerCategory::ProcessInvocation),
    ("subprocess.run", DangerCategory::ProcessInvocation),
    ("subprocess.Popen", DangerCategory::ProcessInvocation),
    ("subprocess.check_call", DangerCategory::ProcessInvocation),
    ("subprocess.check_output", DangerCategory::ProcessInvocation),
    ("subprocess.getoutput", DangerCategory::ProcessInvocation),
];

const SECRET_PATTERNS: &[(SecretCategory, &str)] = &[
    (
        SecretCategory::ApiKey,
        r#"api[_-]?key\w*\s*[:=]\s*['"][^'"\s]{10,}['"]"#,
    ),
    (
        SecretCategory::Password,
        r#"(?:password|passwd|pwd)\w*\s*[:=]\s*['"][^'"\s]{8,}['"]"#,
    ),
    (
        SecretCategory::Secret,
        r#"secret\w*\s*[:=]\s*['"][^'"\s]{10,}['"]"#,
    ),
    (
        SecretCategory::Token,
        r#"token\w*\s*[:=]\s*['"][^'"\s]{10,}['"]"#,
    ),
    (
        SecretCategory::CloudCredential,
        r#"['"](?:AKIA|ASIA|AIza)[0-9a-z_\-]{10,}['"]"#,
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    DynamicEval,
    DynamicExec,
    DynamicCompile,
    DynamicImport,
    UnsafeDeserialization,
    ProcessInvocation,
}

impl DangerCategory {
    pub fn label(self) -> &'static str {
        match self {
            DangerCategory::DynamicEval => "dynamic evaluation",
            DangerCategory::DynamicExec => "dynamic execution",
            DangerCategory::DynamicCompile => "dynamic compilation",
            DangerCategory::DynamicImport => "dynamic import",
            DangerCategory::UnsafeDeserialization => "unsafe deserialization",
            DangerCategory::ProcessInvocation => "process invocation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretCategory {
    ApiKey,
    Password,
    Secret,
    Token,
    CloudCredential,
}

impl SecretCategory {
    pub fn label(self) -> &'static str {
        match self {
            SecretCategory::ApiKey => "API key",
            SecretCategory::Password => "Password",
            SecretCategory::Secret => "Secret",
            SecretCategory::Token => "Token",
            SecretCategory::CloudCredential => "Cloud credential",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousCall {
    /// A bare name matches direct calls and `builtins.<name>`; a dotted name
    /// matches the whole dotted path of a call after import aliases are
    /// resolved. Bare dynamic evaluation and execution entries also match as
    /// the final attribute of any receiver.
    pub name: String,
    pub category: DangerCategory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPattern {
    pub category: SecretCategory,
    /// Case-insensitive, matched against each source line.
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingRules {
    #[serde(default = "default_function_pattern")]
    pub function_pattern: String,
    #[serde(default = "default_class_pattern")]
    pub class_pattern: String,
}

impl Default for NamingRules {
    fn default() -> Self {
        Self {
            function_pattern: default_function_pattern(),
            class_pattern: default_class_pattern(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_indent_width")]
    pub indent_width: usize,
    #[serde(default = "default_max_issues")]
    pub max_format_issues: usize,
    #[serde(default = "default_max_issues")]
    pub max_naming_issues: usize,
    #[serde(default = "default_annotation_coverage_min")]
    pub annotation_coverage_min: f64,
    /// A docstring must be strictly longer than this many characters.
    #[serde(default = "default_docstring_min_chars")]
    pub docstring_min_chars: usize,
    #[serde(default = "default_type_coverage_min_pct")]
    pub type_coverage_min_pct: u32,
    /// Loop nesting at or above this depth fails.
    #[serde(default = "default_max_loop_depth")]
    pub max_loop_depth: usize,
    #[serde(default = "default_max_suggestions")]
    pub max_suggestions: usize,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            indent_width: default_indent_width(),
            max_format_issues: default_max_issues(),
            max_naming_issues: default_max_issues(),
            annotation_coverage_min: default_annotation_coverage_min(),
            docstring_min_chars: default_docstring_min_chars(),
            type_coverage_min_pct: default_type_coverage_min_pct(),
            max_loop_depth: default_max_loop_depth(),
            max_suggestions: default_max_suggestions(),
        }
    }
}

fn default_function_pattern() -> String {
    "^[a-z_][a-z0-9_]*$".to_string()
}

fn default_class_pattern() -> String {
    "^[A-Z][A-Za-z0-9]*$".to_string()
}

fn default_indent_width() -> usize {
    4
}

fn default_max_issues() -> usize {
    3
}

fn default_annotation_coverage_min() -> f64 {
    0.8
}

fn default_docstring_min_chars() -> usize {
    10
}

fn default_type_coverage_min_pct() -> u32 {
    70
}

fn default_max_loop_depth() -> usize {
    3
}

fn default_max_suggestions() -> usize {
    5
}

fn default_stdlib_modules() -> BTreeSet<String> {
    STDLIB_MODULES.iter().map(|s| s.to_string()).collect()
}

fn default_third_party_modules() -> BTreeSet<String> {
    THIRD_PARTY_MODULES.iter().map(|s| s.to_string()).collect()
}

fn default_dangerous_calls() -> Vec<DangerousCall> {
    DANGEROUS_CALLS
        .iter()
        .map(|(name, category)| DangerousCall {
            name: name.to_string(),
            category: *category,
        })
        .collect()
}

fn default_secret_patterns() -> Vec<SecretPattern> {
    SECRET_PATTERNS
        .iter()
        .map(|(category, pattern)| SecretPattern {
            category: *category,
            pattern: pattern.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub schema_version: String,
    pub rules_id: String,
    #[serde(default = "default_stdlib_modules")]
    pub stdlib_modules: BTreeSet<String>,
    /// Reporting only; never consulted for authorization.
    #[serde(default = "default_third_party_modules")]
    pub third_party_modules: BTreeSet<String>,
    #[serde(default = "default_dangerous_calls")]
    pub dangerous_calls: Vec<DangerousCall>,
    #[serde(default = "default_secret_patterns")]
    pub secret_patterns: Vec<SecretPattern>,
    #[serde(default)]
    pub naming: NamingRules,
    #[serde(default)]
    pub thresholds: Thresholds,
}

impl RuleSet {
    pub fn builtin() -> Self {
        Self {
            schema_version: CODEGATE_RULES_SCHEMA_VERSION.to_string(),
            rules_id: "builtin".to_string(),
            stdlib_modules: default_stdlib_modules(),
            third_party_modules: default_third_party_modules(),
            dangerous_calls: default_dangerous_calls(),
            secret_patterns: default_secret_patterns(),
            naming: NamingRules::default(),
            thresholds: Thresholds::default(),
        }
    }
}

pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("[RULES_READ] read rules: {}", path.display()))?;
    parse_rules_bytes(&bytes, path)
}

pub fn parse_rules_bytes(bytes: &[u8], path: &Path) -> Result<RuleSet> {
    let doc: Value = serde_json::from_slice(bytes)
        .with_context(|| format!("[RULES_PARSE] parse rules JSON: {}", path.display()))?;

    let schema: Value = serde_json::from_slice(RULES_SCHEMA_BYTES).context("parse rules schema")?;
    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("build rules schema validator")?;
    let errors: Vec<String> = validator
        .iter_errors(&doc)
        .map(|e| format!("schema: {} at {}", e, e.instance_path()))
        .collect();
    if !errors.is_empty() {
        anyhow::bail!(
            "[RULES_SCHEMA] {} does not match the rules schema:\n{}",
            path.display(),
            errors.join("\n")
        );
    }

    let rules: RuleSet = serde_json::from_value(doc)
        .with_context(|| format!("[RULES_PARSE] decode rules: {}", path.display()))?;
    if !CODEGATE_RULES_SCHEMA_VERSIONS_SUPPORTED
        .iter()
        .any(|v| *v == rules.schema_version.trim())
    {
        anyhow::bail!(
            "rules schema_version mismatch: expected one of {:?} got {:?}",
            CODEGATE_RULES_SCHEMA_VERSIONS_SUPPORTED,
            rules.schema_version
        );
    }
    Ok(rules)
}

/// A rule set with every regular expression compiled.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    rules: RuleSet,
    function_name: Regex,
    class_name: Regex,
    secrets: Vec<(SecretCategory, Regex)>,
}

impl CompiledRules {
    pub fn compile(rules: RuleSet) -> Result<Self> {
        let function_name = Regex::new(&rules.naming.function_pattern).with_context(|| {
            format!(
                "invalid naming.function_pattern {:?}",
                rules.naming.function_pattern
            )
        })?;
        let class_name = Regex::new(&rules.naming.class_pattern).with_context(|| {
            format!(
                "invalid naming.class_pattern {:?}",
                rules.naming.class_pattern
            )
        })?;
        let mut secrets = Vec::with_capacity(rules.secret_patterns.len());
        for (idx, sp) in rules.secret_patterns.iter().enumerate() {
            let re = RegexBuilder::new(&sp.pattern)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("invalid secret_patterns[{idx}].pattern"))?;
            secrets.push((sp.category, re));
        }
        if rules.thresholds.indent_width == 0 {
            anyhow::bail!("thresholds.indent_width must be positive");
        }
        Ok(Self {
            rules,
            function_name,
            class_name,
            secrets,
        })
    }

    pub fn builtin() -> Result<Self> {
        Self::compile(RuleSet::builtin())
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.rules.thresholds
    }

    pub fn is_function_name(&self, name: &str) -> bool {
        self.function_name.is_match(name)
    }

    pub fn is_class_name(&self, name: &str) -> bool {
        self.class_name.is_match(name)
    }

    pub fn is_stdlib(&self, module: &str) -> bool {
        self.rules.stdlib_modules.contains(module)
    }

    pub fn is_third_party(&self, module: &str) -> bool {
        self.rules.third_party_modules.contains(module)
    }

    /// Category of a direct call `name(...)`, if it is on the dangerous list.
    fn danger_of_direct(&self, name: &str) -> Option<DangerCategory> {
        self.rules
            .dangerous_calls
            .iter()
            .find(|d| !d.name.contains('.') && d.name == name)
            .map(|d| d.category)
    }

    /// Category of an attribute call `a.b.name(...)` given its dotted path.
    fn danger_of_attribute(&self, path: &str) -> Option<DangerCategory> {
        self.rules
            .dangerous_calls
            .iter()
            .find(|d| d.name.contains('.') && d.name == path)
            .map(|d| d.category)
    }

    /// Category of a call given its callee with import aliases resolved.
    pub fn danger_of_call(&self, path: &str) -> Option<DangerCategory> {
        let Some((receiver, attr)) = path.rsplit_once('.') else {
            return self.danger_of_direct(path);
        };
        if let Some(category) = self.danger_of_attribute(path) {
            return Some(category);
        }
        let bare = self.danger_of_direct(attr)?;
        let any_receiver = matches!(
            bare,
            DangerCategory::DynamicEval | DangerCategory::DynamicExec
        );
        (receiver == "builtins" || any_receiver).then_some(bare)
    }

    pub fn secret_patterns(&self) -> impl Iterator<Item = (SecretCategory, &Regex)> {
        self.secrets.iter().map(|(c, re)| (*c, re))
    }
}
