use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use codegate::{load_rules, CodeUnit, CompiledRules, RuleSet, Tier, ValidationReport, Validator};
use codegate_contracts::CODEGATE_TOOL_REPORT_SCHEMA_VERSION;
use codegate_spectree::{ExpectedSignature, JsonSpecStore, SpecNode, SpecStore, SpecTree};

#[derive(Parser)]
#[command(name = "codegate")]
#[command(about = "Layered quality and security gate for generated Python code.", long_about = None)]
struct Cli {
    /// Log filter for stderr output; `RUST_LOG` takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate one or more code units and print a JSON report per unit.
    Validate(ValidateArgs),
    /// Inspect or edit a spec tree file.
    Spec {
        #[command(subcommand)]
        cmd: SpecCmd,
    },
    /// Work with rule sets.
    Rules {
        #[command(subcommand)]
        cmd: RulesCmd,
    },
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long, value_name = "PATH")]
    input: Vec<PathBuf>,
    #[arg(long, value_name = "SOURCE")]
    code: Option<String>,
    #[arg(long)]
    stdin: bool,
    /// JSON file holding the expected signature `{inputs, output}`.
    #[arg(long, value_name = "PATH")]
    signature: Option<PathBuf>,
    #[arg(long, value_name = "PATH", requires = "node")]
    spec_tree: Option<PathBuf>,
    #[arg(long, value_name = "ID", requires = "spec_tree")]
    node: Option<String>,
    #[arg(long, value_name = "PATH")]
    rules: Option<PathBuf>,
    /// Run only these tiers (repeatable); all four by default.
    #[arg(long = "tier", value_enum, value_name = "TIER")]
    tiers: Vec<Tier>,
    #[arg(long)]
    report_json: bool,
}

#[derive(Subcommand)]
enum SpecCmd {
    Ancestors {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        node: String,
    },
    AllowList {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        node: String,
    },
    Grant {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        module: String,
        #[arg(long)]
        dep: String,
    },
    Revoke {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        module: String,
        #[arg(long)]
        dep: String,
    },
    AddNode {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        parent: String,
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long = "dep", value_name = "NAME")]
        deps: Vec<String>,
    },
    RemoveNode {
        #[arg(long)]
        tree: PathBuf,
        #[arg(long)]
        node: String,
    },
}

#[derive(Subcommand)]
enum RulesCmd {
    /// Print the built-in rule set.
    Dump,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Module,
    Leaf,
}

#[derive(Debug, Serialize)]
struct ValidateToolReport {
    schema_version: &'static str,
    command: &'static str,
    ok: bool,
    reports: Vec<InputReport>,
    exit_code: u8,
}

#[derive(Debug, Serialize)]
struct InputReport {
    r#in: String,
    report: ValidationReport,
}

fn main() -> std::process::ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            std::process::ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<std::process::ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.cmd {
        Cmd::Validate(args) => cmd_validate(args),
        Cmd::Spec { cmd } => {
            cmd_spec(cmd)?;
            Ok(std::process::ExitCode::SUCCESS)
        }
        Cmd::Rules { cmd: RulesCmd::Dump } => {
            print_json_pretty(&RuleSet::builtin())?;
            Ok(std::process::ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn cmd_validate(args: ValidateArgs) -> Result<std::process::ExitCode> {
    let rules = match &args.rules {
        Some(path) => load_rules(path)?,
        None => RuleSet::builtin(),
    };
    let rules = CompiledRules::compile(rules).context("compile rules")?;
    let validator = if args.tiers.is_empty() {
        Validator::standard(rules)
    } else {
        Validator::with_tiers(rules, args.tiers.iter().copied())
    };

    let signature = args
        .signature
        .as_deref()
        .map(load_signature)
        .transpose()?;
    let tree = args
        .spec_tree
        .as_deref()
        .map(|p| JsonSpecStore.load(p))
        .transpose()?;

    let mut names = Vec::new();
    let mut units = Vec::new();
    for path in &args.input {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("[INPUT_READ] read source: {}", path.display()))?;
        names.push(path.display().to_string());
        units.push(source);
    }
    if let Some(code) = &args.code {
        names.push("<code>".to_string());
        units.push(code.clone());
    }
    if args.stdin {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("[INPUT_READ] read source from stdin")?;
        names.push("<stdin>".to_string());
        units.push(source);
    }
    if units.is_empty() {
        anyhow::bail!("no input: pass --input, --code or --stdin");
    }

    let units: Vec<CodeUnit> = units
        .into_iter()
        .map(|source| {
            let mut unit = CodeUnit::new(source);
            if let Some(sig) = &signature {
                unit = unit.with_signature(sig.clone());
            }
            if let Some(node) = &args.node {
                unit = unit.bound_to(node.clone());
            }
            unit
        })
        .collect();

    let mut reports = Vec::with_capacity(units.len());
    for (name, result) in names.into_iter().zip(validator.validate_all(&units, tree.as_ref())) {
        let report = result.with_context(|| format!("validate {name}"))?;
        reports.push(InputReport { r#in: name, report });
    }

    let ok = reports.iter().all(|r| r.report.passed);
    let exit_code: u8 = if ok { 0 } else { 1 };
    if args.report_json {
        print_json(&ValidateToolReport {
            schema_version: CODEGATE_TOOL_REPORT_SCHEMA_VERSION,
            command: "validate",
            ok,
            reports,
            exit_code,
        })?;
    } else {
        for r in &reports {
            print_json(&r.report)?;
        }
    }
    Ok(std::process::ExitCode::from(exit_code))
}

fn cmd_spec(cmd: SpecCmd) -> Result<()> {
    let store = JsonSpecStore;
    match cmd {
        SpecCmd::Ancestors { tree, node } => {
            let tree = store.load(&tree)?;
            let ancestors: Vec<serde_json::Value> = tree
                .ancestors_of(&node)?
                .into_iter()
                .map(|n| serde_json::json!({ "id": n.id, "name": n.name }))
                .collect();
            print_json(&serde_json::json!({ "node": node, "ancestors": ancestors }))
        }
        SpecCmd::AllowList { tree, node } => {
            let tree = store.load(&tree)?;
            let allowed = tree.effective_allow_list(&node)?;
            print_json(&serde_json::json!({ "node": node, "allowed": allowed }))
        }
        SpecCmd::Grant { tree, module, dep } => {
            let changed = edit_tree(&store, &tree, |t| Ok(t.grant_dependency(&module, &dep)?))?;
            print_json(&serde_json::json!({ "module": module, "dep": dep, "changed": changed }))
        }
        SpecCmd::Revoke { tree, module, dep } => {
            let changed = edit_tree(&store, &tree, |t| Ok(t.revoke_dependency(&module, &dep)?))?;
            print_json(&serde_json::json!({ "module": module, "dep": dep, "changed": changed }))
        }
        SpecCmd::AddNode {
            tree,
            parent,
            id,
            name,
            kind,
            deps,
        } => {
            let node = match kind {
                KindArg::Module => SpecNode::module(id.clone(), name),
                KindArg::Leaf => SpecNode::leaf(id.clone(), name),
            }
            .with_dependencies(deps);
            edit_tree(&store, &tree, |t| Ok(t.add_node(&parent, node)?))?;
            print_json(&serde_json::json!({ "added": id, "parent": parent }))
        }
        SpecCmd::RemoveNode { tree, node } => {
            edit_tree(&store, &tree, |t| Ok(t.remove_node(&node)?))?;
            print_json(&serde_json::json!({ "removed": node }))
        }
    }
}

/// Load, mutate, save. Saves only when `edit` succeeds.
fn edit_tree<T>(
    store: &JsonSpecStore,
    path: &Path,
    edit: impl FnOnce(&mut SpecTree) -> Result<T>,
) -> Result<T> {
    let mut tree = store.load(path)?;
    let out = edit(&mut tree)?;
    store.save(&tree, path)?;
    Ok(out)
}

fn load_signature(path: &Path) -> Result<ExpectedSignature> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("[SIGNATURE_READ] read signature: {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("[SIGNATURE_PARSE] parse signature JSON: {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn print_json_pretty<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
