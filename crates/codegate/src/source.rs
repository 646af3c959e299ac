//! Structural adapter over Python source.
//!
//! `parse` runs the tree-sitter Python grammar once and lowers the concrete
//! syntax tree into an owned [`ParsedUnit`] of facts. Layers only ever see those
//! facts, never the parser. Malformed input never panics or aborts: any ERROR or
//! MISSING node in the tree becomes a [`SyntaxFault`], and so does a tree that
//! parses but would still be refused by the Python compiler (Python 2 statement
//! forms, `return` or `break` in the wrong scope, repeated parameter names).

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use serde::Serialize;
use tree_sitter::{Node, Parser};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxFault {
    /// 1-based; 0 when the parser produced no tree at all.
    pub line: usize,
    /// 1-based; 0 when the parser produced no tree at all.
    pub column: usize,
    pub message: String,
}

impl SyntaxFault {
    fn at(node: Node<'_>, message: String) -> Self {
        let pos = node.start_position();
        Self {
            line: pos.row + 1,
            column: pos.column + 1,
            message,
        }
    }

    fn unpositioned(message: impl Into<String>) -> Self {
        Self {
            line: 0,
            column: 0,
            message: message.into(),
        }
    }
}

impl fmt::Display for SyntaxFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            return f.write_str(&self.message);
        }
        write!(
            f,
            "line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    /// Positional and keyword parameters; `*args` and `**kwargs` are excluded.
    pub params: Vec<Param>,
    pub return_annotation: Option<String>,
    /// Cleaned docstring text, if the body opens with a string literal.
    pub docstring: Option<String>,
    /// A `return` appears somewhere in the body, nested bodies included.
    pub has_return: bool,
}

impl FunctionDef {
    pub fn annotated_param_count(&self) -> usize {
        self.params.iter().filter(|p| p.annotation.is_some()).count()
    }

    pub fn has_any_annotation(&self) -> bool {
        self.return_annotation.is_some() || self.params.iter().any(|p| p.annotation.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: String,
    pub line: usize,
}

/// A local name introduced by an import, e.g. `sp` for `import subprocess as sp`
/// or `loads` for `from pickle import loads`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    pub local: String,
    /// Dotted path the local name stands for.
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportStmt {
    pub line: usize,
    /// Full dotted module paths. For `from . import x` this is empty.
    pub modules: Vec<String>,
    /// Number of leading dots; 0 for absolute imports.
    pub level: usize,
    /// Renaming bindings of absolute imports. Plain `import a.b` binds `a` to
    /// itself and is not listed.
    pub bindings: Vec<ImportBinding>,
}

impl ImportStmt {
    pub fn is_relative(&self) -> bool {
        self.level > 0
    }

    /// First path segment of every absolutely imported module.
    pub fn top_level_names(&self) -> impl Iterator<Item = &str> {
        let absolute = !self.is_relative();
        self.modules
            .iter()
            .filter(move |_| absolute)
            .filter_map(|m| m.split('.').next())
            .filter(|m| !m.is_empty())
    }

    /// Relative import spelled with its dots, e.g. `..models`.
    pub fn dotted(&self) -> String {
        let module = self.modules.first().map(String::as_str).unwrap_or("");
        format!("{}{}", ".".repeat(self.level), module)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Conditional,
    ForLoop,
    WhileLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlConstruct {
    pub kind: ControlKind,
    pub line: usize,
}

/// A loop together with its structural nesting depth (loop ancestors + 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSite {
    pub kind: ControlKind,
    pub line: usize,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerBody {
    Empty,
    /// Only `pass` or `...`, ignoring comments.
    NoOp,
    Substantive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handler {
    pub line: usize,
    pub body: HandlerBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryBlock {
    pub line: usize,
    pub handlers: Vec<Handler>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    /// `name(...)`
    Direct(String),
    /// `a.b.name(...)`, held as the whole dotted callee.
    Attribute(String),
    /// Anything else, e.g. `handlers[0](...)`.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub line: usize,
    pub callee: Callee,
}

/// Facts extracted from one successfully parsed source text.
///
/// Definitions, imports, handlers and calls are listed in breadth-first order
/// over the syntax tree; loops are listed by line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUnit {
    functions: Vec<FunctionDef>,
    classes: Vec<ClassDef>,
    imports: Vec<ImportStmt>,
    control: Vec<ControlConstruct>,
    loops: Vec<LoopSite>,
    try_blocks: Vec<TryBlock>,
    calls: Vec<CallSite>,
}

impl ParsedUnit {
    pub fn functions(&self) -> &[FunctionDef] {
        &self.functions
    }

    /// The shallowest, earliest function definition.
    pub fn first_function(&self) -> Option<&FunctionDef> {
        self.functions.first()
    }

    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn imports(&self) -> &[ImportStmt] {
        &self.imports
    }

    pub fn control_constructs(&self) -> &[ControlConstruct] {
        &self.control
    }

    pub fn loops(&self) -> &[LoopSite] {
        &self.loops
    }

    pub fn try_blocks(&self) -> &[TryBlock] {
        &self.try_blocks
    }

    pub fn calls(&self) -> &[CallSite] {
        &self.calls
    }

    pub fn has_definition(&self) -> bool {
        !self.functions.is_empty() || !self.classes.is_empty()
    }

    pub fn max_loop_depth(&self) -> usize {
        self.loops.iter().map(|l| l.depth).max().unwrap_or(0)
    }

    pub fn count_control(&self, kind: ControlKind) -> usize {
        self.control.iter().filter(|c| c.kind == kind).count()
    }

    /// Rewrites the first segment of a dotted callee through the unit's import
    /// bindings, so `sp.run` becomes `subprocess.run` after `import subprocess
    /// as sp`. A later import of the same local name wins.
    pub fn canonical_path(&self, path: &str) -> String {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let target = self
            .imports
            .iter()
            .flat_map(|i| &i.bindings)
            .filter(|b| b.local == head)
            .last()
            .map(|b| b.target.as_str());
        match (target, rest) {
            (Some(target), Some(rest)) => format!("{target}.{rest}"),
            (Some(target), None) => target.to_string(),
            (None, _) => path.to_string(),
        }
    }
}

pub fn parse(source: &str) -> Result<ParsedUnit, SyntaxFault> {
    let mut parser = Parser::new();
    let language: tree_sitter::Language = tree_sitter_python::LANGUAGE.into();
    parser
        .set_language(&language)
        .map_err(|e| SyntaxFault::unpositioned(format!("load python grammar: {e}")))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| SyntaxFault::unpositioned("parser produced no syntax tree"))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(first_fault(root, source));
    }
    if let Some(fault) = compile_fault(root, source) {
        return Err(fault);
    }

    Ok(Collector::new(source).run(root))
}

fn first_fault(root: Node<'_>, src: &str) -> SyntaxFault {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_missing() {
            return SyntaxFault::at(node, format!("expected `{}`", node.kind()));
        }
        if node.is_error() {
            let snippet: String = node_text(node, src)
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .chars()
                .take(24)
                .collect();
            let message = if snippet.is_empty() {
                "invalid syntax".to_string()
            } else {
                format!("invalid syntax near `{snippet}`")
            };
            return SyntaxFault::at(node, message);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev().filter(|c| c.has_error() || c.is_missing()));
    }
    SyntaxFault::at(root, "invalid syntax".to_string())
}

#[derive(Debug, Clone, Copy, Default)]
struct Scope {
    in_function: bool,
    in_async: bool,
    in_loop: bool,
}

/// First construct the grammar accepts but the Python compiler refuses, in
/// document order.
fn compile_fault(root: Node<'_>, src: &str) -> Option<SyntaxFault> {
    let mut stack = vec![(root, Scope::default())];
    while let Some((node, scope)) = stack.pop() {
        if let Some(message) = scope_violation(node, scope, src) {
            return Some(SyntaxFault::at(node, message));
        }
        let inner = match node.kind() {
            "function_definition" => Scope {
                in_function: true,
                in_async: is_async_def(node),
                in_loop: false,
            },
            "lambda" => Scope {
                in_function: true,
                in_async: false,
                in_loop: false,
            },
            "class_definition" => Scope::default(),
            _ => scope,
        };
        let loop_body = match node.kind() {
            "for_statement" | "while_statement" => node.child_by_field_name("body").map(|b| b.id()),
            _ => None,
        };
        for child in named_children(node).into_iter().rev() {
            let mut child_scope = inner;
            if Some(child.id()) == loop_body {
                child_scope.in_loop = true;
            }
            stack.push((child, child_scope));
        }
    }
    None
}

fn scope_violation(node: Node<'_>, scope: Scope, src: &str) -> Option<String> {
    let message = match node.kind() {
        "print_statement" => "Missing parentheses in call to 'print'",
        "exec_statement" => "Missing parentheses in call to 'exec'",
        "return_statement" if !scope.in_function => "'return' outside function",
        "yield" if !scope.in_function => "'yield' outside function",
        "await" if !scope.in_function => "'await' outside function",
        "await" if !scope.in_async => "'await' outside async function",
        "break_statement" if !scope.in_loop => "'break' outside loop",
        "continue_statement" if !scope.in_loop => "'continue' not properly in loop",
        "parameters" | "lambda_parameters" => {
            return duplicate_parameter(node, src)
                .map(|name| format!("duplicate argument '{name}' in function definition"));
        }
        _ => return None,
    };
    Some(message.to_string())
}

fn is_async_def(node: Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|c| c.kind() == "async");
    found
}

/// The identifier a parameter binds, splats included.
fn param_name(p: Node<'_>) -> Option<Node<'_>> {
    match p.kind() {
        "identifier" => Some(p),
        "default_parameter" | "typed_default_parameter" => p.child_by_field_name("name"),
        "typed_parameter" | "list_splat_pattern" | "dictionary_splat_pattern" => {
            named_children(p).into_iter().find_map(param_name)
        }
        _ => None,
    }
}

fn duplicate_parameter<'s>(params: Node<'_>, src: &'s str) -> Option<&'s str> {
    let mut seen = BTreeSet::new();
    named_children(params)
        .into_iter()
        .filter_map(param_name)
        .map(|n| node_text(n, src))
        .find(|name| !seen.insert(*name))
}

fn node_text<'s>(node: Node<'_>, src: &'s str) -> &'s str {
    src.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

fn line_of(node: Node<'_>) -> usize {
    node.start_position().row + 1
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn compact(text: &str) -> String {
    text.split_whitespace().collect()
}

struct Collector<'s> {
    src: &'s str,
    unit: ParsedUnit,
}

impl<'s> Collector<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            unit: ParsedUnit::default(),
        }
    }

    fn run(mut self, root: Node<'_>) -> ParsedUnit {
        let mut queue: VecDeque<Node<'_>> = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            self.visit(node);
            queue.extend(named_children(node));
        }
        self.unit.loops = loop_sites(root);
        self.unit
    }

    fn text(&self, node: Node<'_>) -> &'s str {
        node_text(node, self.src)
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "function_definition" => {
                let f = self.function(node);
                self.unit.functions.push(f);
            }
            "class_definition" => {
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n).to_string())
                    .unwrap_or_default();
                self.unit.classes.push(ClassDef {
                    name,
                    line: line_of(node),
                });
            }
            "import_statement" => {
                let imp = self.import(node);
                self.unit.imports.push(imp);
            }
            "import_from_statement" => {
                let imp = self.import_from(node);
                self.unit.imports.push(imp);
            }
            "future_import_statement" => self.unit.imports.push(ImportStmt {
                line: line_of(node),
                modules: vec!["__future__".to_string()],
                level: 0,
                bindings: Vec::new(),
            }),
            "if_statement" | "elif_clause" => self.push_control(ControlKind::Conditional, node),
            "for_statement" => self.push_control(ControlKind::ForLoop, node),
            "while_statement" => self.push_control(ControlKind::WhileLoop, node),
            "try_statement" => {
                let handlers = named_children(node)
                    .into_iter()
                    .filter(|c| matches!(c.kind(), "except_clause" | "except_group_clause"))
                    .map(|c| Handler {
                        line: line_of(c),
                        body: classify_handler(c),
                    })
                    .collect();
                self.unit.try_blocks.push(TryBlock {
                    line: line_of(node),
                    handlers,
                });
            }
            "call" => {
                if let Some(callee) = node.child_by_field_name("function") {
                    let callee = self.callee(callee);
                    self.unit.calls.push(CallSite {
                        line: line_of(node),
                        callee,
                    });
                }
            }
            _ => {}
        }
    }

    fn push_control(&mut self, kind: ControlKind, node: Node<'_>) {
        self.unit.control.push(ControlConstruct {
            kind,
            line: line_of(node),
        });
    }

    fn function(&self, node: Node<'_>) -> FunctionDef {
        let name = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .unwrap_or_default();
        let params = node
            .child_by_field_name("parameters")
            .map(|p| self.params(p))
            .unwrap_or_default();
        let return_annotation = node
            .child_by_field_name("return_type")
            .map(|n| self.text(n).trim().to_string());
        let body = node.child_by_field_name("body");

        FunctionDef {
            name,
            line: line_of(node),
            params,
            return_annotation,
            docstring: body.and_then(|b| self.docstring(b)),
            has_return: body.is_some_and(|b| contains_kind(b, "return_statement")),
        }
    }

    fn params(&self, parameters: Node<'_>) -> Vec<Param> {
        let mut out = Vec::new();
        for p in named_children(parameters) {
            let param = match p.kind() {
                "identifier" => Some(Param {
                    name: self.text(p).to_string(),
                    annotation: None,
                }),
                "typed_parameter" => named_children(p)
                    .into_iter()
                    .find(|c| c.kind() == "identifier")
                    .map(|ident| Param {
                        name: self.text(ident).to_string(),
                        annotation: p
                            .child_by_field_name("type")
                            .map(|t| self.text(t).trim().to_string()),
                    }),
                "default_parameter" | "typed_default_parameter" => {
                    p.child_by_field_name("name").map(|n| Param {
                        name: self.text(n).to_string(),
                        annotation: p
                            .child_by_field_name("type")
                            .map(|t| self.text(t).trim().to_string()),
                    })
                }
                _ => None,
            };
            out.extend(param);
        }
        out
    }

    fn docstring(&self, body: Node<'_>) -> Option<String> {
        let first = named_children(body)
            .into_iter()
            .find(|c| c.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }
        let inner = named_children(first);
        match inner.as_slice() {
            [lit] if lit.kind() == "string" => {
                Some(clean_docstring(&string_literal_value(self.text(*lit))))
            }
            _ => None,
        }
    }

    fn import(&self, node: Node<'_>) -> ImportStmt {
        let mut modules = Vec::new();
        let mut bindings = Vec::new();
        let mut cursor = node.walk();
        for n in node.children_by_field_name("name", &mut cursor) {
            let (path, alias) = self.aliased(n);
            if let Some(local) = alias {
                bindings.push(ImportBinding {
                    local,
                    target: path.clone(),
                });
            }
            modules.push(path);
        }
        ImportStmt {
            line: line_of(node),
            modules,
            level: 0,
            bindings,
        }
    }

    /// Dotted path and optional `as` name of an import list entry.
    fn aliased(&self, n: Node<'_>) -> (String, Option<String>) {
        if n.kind() == "aliased_import" {
            let path = n.child_by_field_name("name").unwrap_or(n);
            let alias = n
                .child_by_field_name("alias")
                .map(|a| self.text(a).to_string());
            (compact(self.text(path)), alias)
        } else {
            (compact(self.text(n)), None)
        }
    }

    fn import_from(&self, node: Node<'_>) -> ImportStmt {
        let mut modules = Vec::new();
        let mut level = 0;
        if let Some(module) = node.child_by_field_name("module_name") {
            if module.kind() == "relative_import" {
                for part in named_children(module) {
                    match part.kind() {
                        "import_prefix" => level = self.text(part).matches('.').count(),
                        "dotted_name" => modules.push(compact(self.text(part))),
                        _ => {}
                    }
                }
            } else {
                modules.push(compact(self.text(module)));
            }
        }

        let mut bindings = Vec::new();
        if let (0, Some(module)) = (level, modules.first()) {
            let mut cursor = node.walk();
            for n in node.children_by_field_name("name", &mut cursor) {
                let (name, alias) = self.aliased(n);
                bindings.push(ImportBinding {
                    local: alias.unwrap_or_else(|| name.clone()),
                    target: format!("{module}.{name}"),
                });
            }
        }
        ImportStmt {
            line: line_of(node),
            modules,
            level,
            bindings,
        }
    }

    fn callee(&self, node: Node<'_>) -> Callee {
        match node.kind() {
            "identifier" => Callee::Direct(self.text(node).to_string()),
            "attribute" => Callee::Attribute(compact(self.text(node))),
            _ => Callee::Other(compact(self.text(node))),
        }
    }
}

fn loop_kind(kind: &str) -> Option<ControlKind> {
    match kind {
        "for_statement" => Some(ControlKind::ForLoop),
        "while_statement" => Some(ControlKind::WhileLoop),
        _ => None,
    }
}

/// Every loop with its depth. Depth is structural: non-loop nodes between two
/// loops (conditionals, nested defs, `with` blocks) do not reset it. Iterative
/// so that pathologically deep input cannot exhaust the stack.
fn loop_sites(root: Node<'_>) -> Vec<LoopSite> {
    let mut out = Vec::new();
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        for child in named_children(node) {
            let kind = loop_kind(child.kind());
            let child_depth = depth + usize::from(kind.is_some());
            if let Some(kind) = kind {
                out.push(LoopSite {
                    kind,
                    line: line_of(child),
                    depth: child_depth,
                });
            }
            stack.push((child, child_depth));
        }
    }
    out.sort_by_key(|l| (l.line, l.depth));
    out
}

fn contains_kind(root: Node<'_>, kind: &str) -> bool {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == kind {
            return true;
        }
        stack.extend(named_children(node));
    }
    false
}

fn classify_handler(handler: Node<'_>) -> HandlerBody {
    let Some(block) = named_children(handler)
        .into_iter()
        .rev()
        .find(|c| c.kind() == "block")
    else {
        return HandlerBody::Empty;
    };
    let stmts: Vec<Node<'_>> = named_children(block)
        .into_iter()
        .filter(|c| c.kind() != "comment")
        .collect();
    match stmts.as_slice() {
        [] => HandlerBody::Empty,
        [only] if is_noop(*only) => HandlerBody::NoOp,
        _ => HandlerBody::Substantive,
    }
}

fn is_noop(stmt: Node<'_>) -> bool {
    match stmt.kind() {
        "pass_statement" => true,
        "expression_statement" => {
            matches!(named_children(stmt).as_slice(), [e] if e.kind() == "ellipsis")
        }
        _ => false,
    }
}

fn string_literal_value(raw: &str) -> String {
    let body = raw.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = body
            .strip_prefix(quote)
            .and_then(|b| b.strip_suffix(quote))
        {
            return inner.to_string();
        }
    }
    body.to_string()
}

/// First line loses its leading whitespace, the rest lose their common
/// indentation, and surrounding blank lines are dropped.
fn clean_docstring(raw: &str) -> String {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or("").trim_start();
    let rest: Vec<&str> = lines.collect();
    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = Vec::with_capacity(rest.len() + 1);
    cleaned.push(first);
    for line in rest {
        cleaned.push(line.get(margin..).unwrap_or_else(|| line.trim_start()));
    }
    while cleaned.first().is_some_and(|l| l.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|l| l.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
