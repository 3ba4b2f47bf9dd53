//! Code generation.
//!
//! Turns a resolved, validated and analyzed page into its three artifacts:
//! static HTML carrying `data-zen-*` markers, scoped CSS, and the page's
//! JavaScript bundle (hydration runtime, rewritten scripts, evaluators and
//! the instance registry).

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::analyze::AnalyzedExpression;
use crate::config::CompileOptions;
use crate::ir::{
    AttributeValue, ElementNode, ExpressionIR, LoopContext, ScriptBlock, ScriptIR,
    ScriptStatement, SourceLocation, StyleIR, TemplateNode, TextSpan, ZenIR,
};
use crate::parse::is_void_element;
use crate::renamer::{apply_edits, edits_for, script_references, Reference, Rewrite};
use crate::validate::{CompileResult, CompilerError, ErrorKind};

const RUNTIME: &str = include_str!("runtime.js");

lazy_static! {
    static ref INSTANCE_NAME_RE: Regex = Regex::new(r"^__zen_comp_(\d+)_").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BindingKind {
    Text,
    Attribute,
    Conditional,
    Optional,
    Loop,
}

/// One hydration marker emitted into the HTML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    pub kind: BindingKind,
    /// Marker attribute carrying the expression id.
    pub target: String,
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptImport {
    pub source: String,
    pub code: String,
    pub type_only: bool,
    pub side_effect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCode {
    pub html: String,
    pub styles: Vec<String>,
    pub js: String,
    /// Rewritten page scripts without imports.
    pub script: String,
    /// Evaluator functions, one per expression.
    pub expressions: String,
    pub imports: Vec<ScriptImport>,
    pub bindings: Vec<Binding>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// HTML
// ═══════════════════════════════════════════════════════════════════════════════

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\"', "&quot;")
        .replace('\'', "&#39;")
}

struct HtmlEmitter<'a> {
    file_path: &'a str,
    expressions: HashMap<&'a str, &'a ExpressionIR>,
    bindings: Vec<Binding>,
}

impl<'a> HtmlEmitter<'a> {
    fn new(ir: &'a ZenIR) -> Self {
        HtmlEmitter {
            file_path: &ir.file_path,
            expressions: ir
                .template
                .expressions
                .iter()
                .map(|e| (e.id.as_str(), e))
                .collect(),
            bindings: Vec::new(),
        }
    }

    fn bind(
        &mut self,
        id: &str,
        kind: BindingKind,
        target: &str,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<()> {
        let expr = self.expressions.get(id).copied().ok_or_else(|| {
            CompilerError::internal(
                &format!("Marker references unregistered expression \"{}\".", id),
                self.file_path,
            )
        })?;
        self.bindings.push(Binding {
            id: id.to_string(),
            kind,
            target: target.to_string(),
            location: expr.location,
            loop_context: loop_context.or(expr.loop_context.as_ref()).cloned(),
        });
        Ok(())
    }

    fn nodes(&mut self, nodes: &[TemplateNode], out: &mut String) -> CompileResult<()> {
        for node in nodes {
            self.node(node, out)?;
        }
        Ok(())
    }

    fn node(&mut self, node: &TemplateNode, out: &mut String) -> CompileResult<()> {
        match node {
            TemplateNode::Text(t) => out.push_str(&escape_html(&t.value)),
            TemplateNode::Doctype(doc) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(&doc.name);
                out.push('>');
            }
            TemplateNode::Expression(e) => {
                self.bind(&e.expr_id, BindingKind::Text, "data-zen-text", e.loop_context.as_ref())?;
                out.push_str(&format!(
                    "<span data-zen-text=\"{}\" style=\"display: contents;\"></span>",
                    e.expr_id
                ));
            }
            TemplateNode::Element(el) => self.element(el, out)?,
            TemplateNode::ConditionalFragment(cond) => {
                self.bind(
                    &cond.condition,
                    BindingKind::Conditional,
                    "data-zen-conditional",
                    cond.loop_context.as_ref(),
                )?;
                out.push_str(&format!(
                    "<div data-zen-conditional=\"{}\" style=\"display: contents;\">",
                    cond.condition
                ));
                out.push_str("<div data-zen-branch=\"true\" style=\"display: contents;\">");
                self.nodes(&cond.consequent, out)?;
                out.push_str("</div><div data-zen-branch=\"false\" style=\"display: contents;\">");
                self.nodes(&cond.alternate, out)?;
                out.push_str("</div></div>");
            }
            TemplateNode::OptionalFragment(opt) => {
                self.bind(
                    &opt.condition,
                    BindingKind::Optional,
                    "data-zen-optional",
                    opt.loop_context.as_ref(),
                )?;
                out.push_str(&format!(
                    "<div data-zen-optional=\"{}\" style=\"display: contents;\">",
                    opt.condition
                ));
                self.nodes(&opt.fragment, out)?;
                out.push_str("</div>");
            }
            TemplateNode::LoopFragment(lp) => {
                self.bind(&lp.source, BindingKind::Loop, "data-zen-loop", lp.loop_context.as_ref())?;
                out.push_str(&format!(
                    "<template data-zen-loop=\"{}\" data-zen-item=\"{}\"",
                    lp.source, lp.item_var
                ));
                if let Some(index) = &lp.index_var {
                    out.push_str(&format!(" data-zen-index=\"{}\"", index));
                }
                if let Some(key) = &lp.key {
                    self.bind(key, BindingKind::Attribute, "data-zen-key", None)?;
                    out.push_str(&format!(" data-zen-key=\"{}\"", key));
                }
                out.push('>');
                self.nodes(&lp.body, out)?;
                out.push_str("</template>");
            }
            TemplateNode::Component(c) => {
                return Err(CompilerError::at(
                    ErrorKind::Internal,
                    &format!("Component <{}> reached code generation unresolved.", c.name),
                    self.file_path,
                    c.location,
                ))
            }
            TemplateNode::Slot(s) => {
                return Err(CompilerError::at(
                    ErrorKind::Internal,
                    "Slot marker reached code generation outside a component.",
                    self.file_path,
                    s.location,
                ))
            }
        }
        Ok(())
    }

    fn element(&mut self, el: &ElementNode, out: &mut String) -> CompileResult<()> {
        out.push('<');
        out.push_str(&el.tag);
        for attr in &el.attributes {
            out.push(' ');
            match &attr.value {
                AttributeValue::Static(v) => {
                    out.push_str(&format!("{}=\"{}\"", attr.name, escape_html(v)))
                }
                AttributeValue::Expression(id) => {
                    let target = format!("data-zen-attr-{}", attr.name);
                    self.bind(id, BindingKind::Attribute, &target, attr.loop_context.as_ref())?;
                    out.push_str(&format!("{}=\"{}\"", target, id));
                }
                AttributeValue::Handler(name) => {
                    out.push_str(&format!("{}=\"{}\"", attr.name, escape_html(name)))
                }
            }
        }

        if is_void_element(&el.tag) && el.children.is_empty() {
            out.push_str(" />");
            return Ok(());
        }
        out.push('>');
        self.nodes(&el.children, out)?;
        out.push_str("</");
        out.push_str(&el.tag);
        out.push('>');
        Ok(())
    }
}

/// Serializes the template tree to HTML and returns the markers it emitted.
pub fn generate_html(ir: &ZenIR) -> CompileResult<(String, Vec<Binding>)> {
    let mut emitter = HtmlEmitter::new(ir);
    let mut html = String::new();
    emitter.nodes(&ir.template.nodes, &mut html)?;
    Ok((html, emitter.bindings))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CSS SCOPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Removes comments, leaving strings intact.
fn strip_css_comments(css: &str) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut i = 0;
    let mut quote: Option<u8> = None;
    let mut copied = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'/' && bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&css[copied..i]);
                i = css[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
                copied = i;
                continue;
            }
            None => {}
        }
        i += 1;
    }
    out.push_str(&css[copied.min(css.len())..]);
    out
}

/// Index of the `}` closing the block opened at `open`.
fn css_block_end(css: &str, open: usize) -> Option<usize> {
    let bytes = css.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Where the marker attribute goes in the first compound selector: before
/// its first pseudo-class or at its end.
fn compound_insert_at(selector: &str) -> usize {
    let bytes = selector.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' | b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            b':' | b' ' | b'\t' | b'\n' | b'>' | b'+' | b'~' if depth == 0 => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn split_selector_list(prelude: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in prelude.bytes().enumerate() {
        match b {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&prelude[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&prelude[start..]);
    parts
}

/// `.title` inside `Card` matches both descendants of the component's root
/// and the root itself.
fn scope_selector(selector: &str, marker: &str) -> String {
    let selector = selector.trim();
    if let Some(inner) = selector
        .strip_prefix(":global(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return inner.trim().to_string();
    }
    if selector.is_empty() || selector.starts_with(":root") || selector == "html" || selector == "body" {
        return selector.to_string();
    }
    let at = compound_insert_at(selector);
    format!(
        "{} {}, {}{}{}",
        marker,
        selector,
        &selector[..at],
        marker,
        &selector[at..]
    )
}

fn scope_rules(css: &str, marker: &str, out: &mut String) {
    let mut rest = css;
    loop {
        let open = match rest.find(|c| c == '{' || c == ';') {
            Some(i) => i,
            None => {
                out.push_str(rest);
                return;
            }
        };
        if rest.as_bytes()[open] == b';' {
            // Statement at-rule such as `@import`.
            out.push_str(&rest[..=open]);
            rest = &rest[open + 1..];
            continue;
        }
        let close = match css_block_end(rest, open) {
            Some(i) => i,
            None => {
                out.push_str(rest);
                return;
            }
        };
        let prelude = rest[..open].trim();
        let leading = &rest[..rest.len() - rest.trim_start().len()];
        out.push_str(leading);

        if let Some(at_rule) = prelude.strip_prefix('@') {
            let name = at_rule.split(|c: char| c.is_whitespace() || c == '(').next().unwrap_or("");
            if matches!(name, "media" | "supports" | "container" | "layer" | "document") {
                out.push_str(prelude);
                out.push_str(" {");
                scope_rules(&rest[open + 1..close], marker, out);
                out.push('}');
            } else {
                out.push_str(prelude);
                out.push(' ');
                out.push_str(&rest[open..=close]);
            }
        } else {
            let scoped: Vec<String> = split_selector_list(prelude)
                .into_iter()
                .map(|s| scope_selector(s, marker))
                .filter(|s| !s.is_empty())
                .collect();
            out.push_str(&scoped.join(", "));
            out.push(' ');
            out.push_str(&rest[open..=close]);
        }
        rest = &rest[close + 1..];
    }
}

/// Prefixes every rule of `css` with the component's marker attribute.
pub fn scope_css(css: &str, component: &str) -> String {
    let marker = format!("[data-zen-component=\"{}\"]", component);
    let mut out = String::with_capacity(css.len() * 2);
    scope_rules(&strip_css_comments(css), &marker, &mut out);
    out.trim().to_string()
}

pub fn generate_styles(styles: &[StyleIR], options: &CompileOptions) -> Vec<String> {
    styles
        .iter()
        .map(|style| match &style.scope {
            Some(component) if options.scope_styles && !style.global => {
                scope_css(&style.raw, component)
            }
            _ => style.raw.trim().to_string(),
        })
        .filter(|css| !css.is_empty())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites one block for the bundle: states read and write through the
/// document state object, page props through `props`, imports are hoisted.
fn emit_script_block(
    block: &ScriptBlock,
    states: &HashSet<&str>,
    props: &HashSet<&str>,
    file_path: &str,
) -> CompileResult<String> {
    let references = script_references(block).map_err(|e| {
        CompilerError::at(
            ErrorKind::InvalidScript,
            &format!("Invalid script syntax: {}", e),
            block.source_file.as_deref().unwrap_or(file_path),
            block.location,
        )
    })?;

    let mut skipped: Vec<TextSpan> = Vec::new();
    let mut edits = Vec::new();
    for statement in &block.statements {
        match statement {
            ScriptStatement::Import { span, .. } => {
                skipped.push(*span);
                edits.push((span.start, span.end, String::new()));
            }
            ScriptStatement::State { name, head, .. } => {
                skipped.push(*head);
                edits.push((head.start, head.end, format!("state.{}", name)));
            }
            ScriptStatement::Prop { name, default, span } => {
                skipped.push(*span);
                let replacement = match default {
                    Some(value) => format!(
                        "if (props.{0} === undefined) props.{0} = ({1});",
                        name, value
                    ),
                    None => String::new(),
                };
                edits.push((span.start, span.end, replacement));
            }
            _ => {}
        }
    }

    let kept: Vec<Reference> = references
        .into_iter()
        .filter(|r| !r.binding && !skipped.iter().any(|s| s.contains(r.span.start)))
        .collect();
    edits.extend(edits_for(&kept, |r| {
        if states.contains(r.name.as_str()) {
            Some(Rewrite::Name(format!("state.{}", r.name)))
        } else if props.contains(r.name.as_str()) {
            Some(Rewrite::Name(format!("props.{}", r.name)))
        } else {
            None
        }
    }));
    Ok(apply_edits(&block.raw, edits).trim().to_string())
}

fn collect_imports(script: &ScriptIR) -> Vec<ScriptImport> {
    let mut seen = HashSet::new();
    let mut imports = Vec::new();
    for import in &script.imports {
        if import.source.ends_with(".zen") {
            continue;
        }
        let code = import.code.trim().trim_end_matches(';').to_string();
        if !seen.insert(code.clone()) {
            continue;
        }
        imports.push(ScriptImport {
            source: import.source.clone(),
            type_only: code.starts_with("import type "),
            side_effect: import.locals.is_empty(),
            code: format!("{};", code),
        });
    }
    imports
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct InstanceRecord {
    states: Vec<String>,
    handlers: Vec<String>,
}

/// `__zen_comp_3_count` belongs to instance `comp-3`; everything else to the
/// page.
fn owner_of(name: &str) -> Option<usize> {
    INSTANCE_NAME_RE
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn instance_records(
    ir: &ZenIR,
    handlers: &[String],
) -> (InstanceRecord, BTreeMap<usize, InstanceRecord>) {
    let mut page = InstanceRecord::default();
    let mut instances: BTreeMap<usize, InstanceRecord> = BTreeMap::new();
    for state in ir.states() {
        match owner_of(&state) {
            Some(n) => instances.entry(n).or_default().states.push(state),
            None => page.states.push(state),
        }
    }
    for handler in handlers {
        match owner_of(handler) {
            Some(n) => instances.entry(n).or_default().handlers.push(handler.clone()),
            None => page.handlers.push(handler.clone()),
        }
    }
    (page, instances)
}

fn register_call(id: &str, record: &InstanceRecord) -> String {
    let states: Vec<String> = record
        .states
        .iter()
        .map(|s| serde_json::to_string(s).unwrap_or_default())
        .collect();
    format!(
        "__zenith.register({}, {{ state: [{}], handlers: {{ {} }} }});",
        serde_json::to_string(id).unwrap_or_default(),
        states.join(", "),
        record.handlers.join(", ")
    )
}

/// A handler name bound in the template, at its first binding site.
struct HandlerUse {
    name: String,
    location: SourceLocation,
}

/// Handler names bound in the template and the event types they listen to.
fn collect_handlers(nodes: &[TemplateNode]) -> (Vec<HandlerUse>, BTreeSet<String>) {
    fn walk(nodes: &[TemplateNode], handlers: &mut Vec<HandlerUse>, events: &mut BTreeSet<String>) {
        for node in nodes {
            if let TemplateNode::Element(el) = node {
                for attr in &el.attributes {
                    if let AttributeValue::Handler(name) = &attr.value {
                        if let Some(event) = attr.name.strip_prefix("data-zen-") {
                            events.insert(event.to_string());
                        }
                        if !handlers.iter().any(|h| &h.name == name) {
                            handlers.push(HandlerUse {
                                name: name.clone(),
                                location: attr.location,
                            });
                        }
                    }
                }
            }
            match node {
                TemplateNode::Element(el) => walk(&el.children, handlers, events),
                TemplateNode::ConditionalFragment(f) => {
                    walk(&f.consequent, handlers, events);
                    walk(&f.alternate, handlers, events);
                }
                TemplateNode::OptionalFragment(f) => walk(&f.fragment, handlers, events),
                TemplateNode::LoopFragment(f) => walk(&f.body, handlers, events),
                _ => {}
            }
        }
    }
    let mut handlers = Vec::new();
    let mut events = BTreeSet::new();
    walk(nodes, &mut handlers, &mut events);
    (handlers, events)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUNDLE
// ═══════════════════════════════════════════════════════════════════════════════

pub fn generate(
    ir: &ZenIR,
    analyzed: &[AnalyzedExpression],
    options: &CompileOptions,
) -> CompileResult<GeneratedCode> {
    let (html, bindings) = generate_html(ir)?;
    let styles = generate_styles(&ir.styles, options);

    let empty = ScriptIR::default();
    let script = ir.script.as_ref().unwrap_or(&empty);
    let states: HashSet<&str> = script.states.keys().map(String::as_str).collect();
    let props: HashSet<&str> = script.props.keys().map(String::as_str).collect();

    let mut blocks = Vec::new();
    for block in &script.blocks {
        let code = emit_script_block(block, &states, &props, &ir.file_path)?;
        if !code.is_empty() {
            blocks.push(code);
        }
    }
    let script_code = blocks.join("\n\n");
    let imports = collect_imports(script);

    let (handlers, events) = collect_handlers(&ir.template.nodes);
    let declared: HashSet<String> = script
        .top_level_names()
        .into_iter()
        .chain(script.import_locals())
        .collect();
    let mut registered = Vec::new();
    for HandlerUse { name, location } in handlers {
        if name == "undefined" {
            continue;
        }
        if !declared.contains(&name) {
            return Err(CompilerError::at(
                ErrorKind::UndeclaredReference { name: name.clone() },
                &format!("Event handler '{}' is not declared in any script.", name),
                &ir.file_path,
                location,
            )
            .with_hint("Declare the handler as a function in the page or component script."));
        }
        registered.push(name);
    }
    let (page, instances) = instance_records(ir, &registered);

    let expressions_code = analyzed
        .iter()
        .map(AnalyzedExpression::to_evaluator)
        .collect::<Vec<_>>()
        .join("\n");
    let expression_table = analyzed
        .iter()
        .map(|e| {
            let params: Vec<String> = e
                .dependencies
                .parameters()
                .iter()
                .map(|p| format!("\"{}\"", p))
                .collect();
            format!(
                "  [\"{}\", {}, [{}], {}],",
                e.id,
                e.evaluator_name(),
                params.join(", "),
                !e.loop_variables.is_empty()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut js = String::new();
    for import in imports.iter().filter(|i| !i.type_only) {
        js.push_str(&import.code);
        js.push('\n');
    }
    if !imports.is_empty() {
        js.push('\n');
    }
    js.push_str(RUNTIME);
    js.push_str(&format!(
        "\nconst __zenith = __zenithRuntime({{ runtimeData: {} }});\n",
        serde_json::to_string(&options.runtime_data).unwrap_or_default()
    ));
    js.push_str("const { state, props, loaderData, stores } = __zenith.scope;\n");
    if !script_code.is_empty() {
        js.push('\n');
        js.push_str(&script_code);
        js.push('\n');
    }
    if !expressions_code.is_empty() {
        js.push('\n');
        js.push_str(&expressions_code);
        js.push('\n');
        js.push_str(&format!("\n__zenith.expressions([\n{}\n]);\n", expression_table));
    }
    js.push('\n');
    js.push_str(&register_call("page", &page));
    js.push('\n');
    for (n, record) in &instances {
        js.push_str(&register_call(&format!("comp-{}", n), record));
        js.push('\n');
    }
    let events: Vec<String> = events.iter().map(|e| format!("\"{}\"", e)).collect();
    js.push_str(&format!("__zenith.start([{}]);\n", events.join(", ")));

    tracing::trace!(
        file = %ir.file_path,
        bindings = bindings.len(),
        instances = instances.len(),
        "generated page bundle"
    );

    Ok(GeneratedCode {
        html,
        styles,
        js,
        script: script_code,
        expressions: expressions_code,
        imports,
        bindings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_zen_file;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_markers_and_void_elements() {
        let ir = parse_zen_file(
            "<script>\nstate name = ''\nfunction save() {}\n</script>\n<form onsubmit={save}><input :value={name} /><br><p>Hi {name}</p></form>",
            "page.zen",
        )
        .unwrap();
        let (html, bindings) = generate_html(&ir).unwrap();
        assert!(html.contains("<form data-zen-submit=\"save\">"));
        assert!(html.contains("<input data-zen-attr-value=\"expr_0\" />"));
        assert!(html.contains("<br />"));
        assert!(html.contains("<p>Hi <span data-zen-text=\"expr_1\" style=\"display: contents;\"></span></p>"));
        let kinds: Vec<BindingKind> = bindings.iter().map(|b| b.kind).collect();
        assert_eq!(kinds, vec![BindingKind::Attribute, BindingKind::Text]);
    }

    #[test]
    fn test_scope_css() {
        assert_eq!(
            scope_css(".chip { color: red }", "Chip"),
            "[data-zen-component=\"Chip\"] .chip, .chip[data-zen-component=\"Chip\"] { color: red }"
        );
        assert_eq!(
            scope_css("a:hover, p > span {}", "X"),
            "[data-zen-component=\"X\"] a:hover, a[data-zen-component=\"X\"]:hover, [data-zen-component=\"X\"] p > span, p[data-zen-component=\"X\"] > span {}"
        );
    }

    #[test]
    fn test_scope_css_at_rules() {
        let css = "/* note */@media (max-width: 600px) { .a { x: 1 } }\n@keyframes spin { from { a: 0 } to { a: 1 } }\n:global(body) { margin: 0 }";
        let scoped = scope_css(css, "Nav");
        assert!(scoped.starts_with(
            "@media (max-width: 600px) { [data-zen-component=\"Nav\"] .a, .a[data-zen-component=\"Nav\"] { x: 1 } }"
        ));
        assert!(scoped.contains("@keyframes spin { from { a: 0 } to { a: 1 } }"));
        assert!(scoped.ends_with("body { margin: 0 }"));
        assert!(!scoped.contains("note"));
    }

    #[test]
    fn test_script_rewrite_goes_through_state_object() {
        let ir = parse_zen_file(
            "<script>\nimport { format } from 'date-fns'\nprop title = 'Home'\nstate count = 0\nfunction increment() { count += 1; console.log(title, { count }) }\n</script>\n<button onclick={increment}>{count}</button>",
            "page.zen",
        )
        .unwrap();
        let generated = generate(&ir, &[], &CompileOptions::default()).unwrap();
        assert!(generated.script.contains("if (props.title === undefined) props.title = ('Home');"));
        assert!(generated.script.contains("state.count = 0"));
        assert!(generated
            .script
            .contains("function increment() { state.count += 1; console.log(props.title, { count: state.count }) }"));
        assert!(!generated.script.contains("import"));
        assert_eq!(generated.imports.len(), 1);
        assert!(generated.js.starts_with("import { format } from 'date-fns';\n"));
        assert!(generated
            .js
            .contains("__zenith.register(\"page\", { state: [\"count\"], handlers: { increment } });"));
        assert!(generated.js.contains("__zenith.start([\"click\"]);"));
    }

    #[test]
    fn test_undeclared_handler_rejected() {
        let ir = parse_zen_file("<button onclick={missing}>x</button>", "page.zen").unwrap();
        let err = generate(&ir, &[], &CompileOptions::default()).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UndeclaredReference {
                name: "missing".into()
            }
        );
    }

    #[test]
    fn test_undeclared_handler_points_at_its_attribute() {
        let src = "<main>\n  <p>hi</p>\n  <button onclick={save}>Save</button>\n</main>";
        let ir = parse_zen_file(src, "page.zen").unwrap();
        let err = generate(&ir, &[], &CompileOptions::default()).unwrap_err();
        assert_eq!((err.line, err.column), (3, 20));
        assert_eq!(err.file, "page.zen");
    }

    #[test]
    fn test_instance_ownership() {
        assert_eq!(owner_of("__zen_comp_12_count"), Some(12));
        assert_eq!(owner_of("count"), None);
        assert_eq!(owner_of("__zen_h0"), None);
    }
}
