//! Parse Module for Zenith Compiler
//!
//! Turns one `.zen` source file into [`ZenIR`]: blocks are extracted,
//! expressions replaced by placeholders, the markup balance-checked and
//! annotated, then parsed with html5ever and converted to template nodes.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use regex::Regex;
use std::collections::HashMap;

use crate::ir::{
    AttributeIR, AttributeValue, ComponentNode, DoctypeNode, ElementNode, ExpressionIR,
    ExpressionNode, LoopContext, ScriptIR, SlotNode, SourceLocation, StyleIR, TemplateIR,
    TemplateNode, TextNode, ZenIR,
};
use crate::lexer::{
    extract_blocks, find_tag_end, normalize_expressions, parse_tag_attributes, NormalizedMarkup,
    RawExpression, SourceFile, PLACEHOLDER_RE,
};
use crate::renamer::{check_expression, is_function_expression, is_identifier};
use crate::script::{analyze_scripts, lift_handler, push_synthetic_handler};
use crate::transform::lower_fragments;
use crate::validate::{CompileResult, CompilerError, ErrorKind};

const LOC_ATTR: &str = "data-zen-loc";
const ORIG_NAME_ATTR: &str = "data-zen-orig-name";
const ORIG_ATTRS_ATTR: &str = "data-zen-orig-attrs";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose end tag may be omitted.
const OPTIONAL_CLOSE: &[&str] = &[
    "p", "li", "dt", "dd", "tr", "td", "th", "thead", "tbody", "tfoot", "option", "optgroup",
    "colgroup", "caption", "rb", "rt", "rtc", "rp", "html", "head", "body",
];

/// Elements whose content is text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

lazy_static! {
    static ref HTML_COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag.to_ascii_lowercase().as_str())
}

/// A tag is a component usage when its source spelling starts uppercase or
/// is a dotted compound name such as `Card.Header`.
pub fn is_component_tag(tag_name: &str) -> bool {
    tag_name
        .chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
        || tag_name.contains('.')
}

/// `onclick`, `onClick` and `on:click` all name the `click` event.
pub fn event_name(attr: &str) -> Option<String> {
    let lower = attr.to_ascii_lowercase();
    if let Some(event) = lower.strip_prefix("on:") {
        return (!event.is_empty()).then(|| event.to_string());
    }
    let event = lower.strip_prefix("on")?;
    if event.len() > 1 && event.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(event.to_string())
    } else {
        None
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION ID GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Monotonic `expr_<n>` ids, one generator per compilation unit.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: usize,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator whose ids never collide with `existing`.
    pub fn after(existing: &[ExpressionIR]) -> Self {
        let next = existing
            .iter()
            .filter_map(|e| e.id.strip_prefix("expr_")?.parse::<usize>().ok())
            .max()
            .map(|n| n + 1)
            .unwrap_or(0);
        IdGenerator { next }
    }

    pub fn next_id(&mut self) -> String {
        let id = format!("expr_{}", self.next);
        self.next += 1;
        id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARSE CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// An inline event handler lifted into a named function.
#[derive(Debug, Clone, PartialEq)]
pub struct LiftedHandler {
    pub name: String,
    pub source: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValuePart {
    Text(String),
    Code(String),
}

/// Raw attribute value before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeInput {
    Static(String),
    Code(String),
    /// Static text interleaved with expressions.
    Mixed(Vec<ValuePart>),
}

/// Expression registry and handler list shared by the DOM conversion and
/// fragment lowering of one file.
pub struct ParseContext {
    pub file_path: String,
    pub expressions: Vec<ExpressionIR>,
    pub handlers: Vec<LiftedHandler>,
    ids: IdGenerator,
}

impl ParseContext {
    pub fn new(file_path: &str) -> Self {
        ParseContext {
            file_path: file_path.to_string(),
            expressions: Vec::new(),
            handlers: Vec::new(),
            ids: IdGenerator::new(),
        }
    }

    pub fn expression(&self, id: &str) -> Option<&ExpressionIR> {
        self.expressions.iter().find(|e| e.id == id)
    }

    pub fn discard(&mut self, id: &str) {
        self.expressions.retain(|e| e.id != id);
    }

    /// Registers an expression and returns its id. The code must parse as a
    /// JavaScript expression.
    pub fn register(
        &mut self,
        code: &str,
        location: SourceLocation,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<String> {
        let code = HTML_COMMENT_RE.replace_all(code, "").trim().to_string();
        check_expression(&code).map_err(|e| {
            CompilerError::at(
                ErrorKind::InvalidExpression,
                &format!("Invalid expression `{}`: {}", code, e),
                &self.file_path,
                location,
            )
        })?;
        let id = self.ids.next_id();
        self.expressions.push(ExpressionIR {
            id: id.clone(),
            code,
            location,
            loop_context: loop_context.cloned(),
            source_file: None,
        });
        Ok(id)
    }

    pub fn lift_handler(
        &mut self,
        code: &str,
        location: SourceLocation,
        loop_context: Option<&LoopContext>,
    ) -> String {
        let name = format!("__zen_h{}", self.handlers.len());
        let source = lift_handler(&name, code, loop_context);
        self.handlers.push(LiftedHandler {
            name: name.clone(),
            source,
            location,
        });
        name
    }

    /// A bare identifier names the handler; anything else is lifted.
    pub fn handler_value(
        &mut self,
        code: &str,
        location: SourceLocation,
        loop_context: Option<&LoopContext>,
    ) -> AttributeValue {
        let code = code.trim();
        if is_identifier(code) {
            AttributeValue::Handler(code.to_string())
        } else {
            AttributeValue::Handler(self.lift_handler(code, location, loop_context))
        }
    }

    pub fn convert_attribute(
        &mut self,
        name: &str,
        input: AttributeInput,
        is_component: bool,
        location: SourceLocation,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<AttributeIR> {
        let (name, reactive) = match name.strip_prefix(':') {
            Some(stripped) => (stripped, true),
            None => (name, false),
        };

        let event = if is_component { None } else { event_name(name) };
        if let Some(event) = event {
            let code = match &input {
                AttributeInput::Static(s) | AttributeInput::Code(s) => s.clone(),
                AttributeInput::Mixed(_) => {
                    return Err(CompilerError::at(
                        ErrorKind::InvalidExpression,
                        &format!("Event attribute '{}' cannot interpolate text.", name),
                        &self.file_path,
                        location,
                    ))
                }
            };
            if !code.trim().is_empty() {
                return Ok(AttributeIR {
                    name: format!("data-zen-{}", event),
                    value: self.handler_value(&code, location, loop_context),
                    location,
                    loop_context: loop_context.cloned(),
                });
            }
        }

        let value = match input {
            AttributeInput::Static(s) if reactive => {
                AttributeValue::Expression(self.register(&s, location, loop_context)?)
            }
            AttributeInput::Static(s) => AttributeValue::Static(s),
            AttributeInput::Code(c) if is_component && is_function_expression(&c) => {
                AttributeValue::Handler(self.lift_handler(&c, location, loop_context))
            }
            AttributeInput::Code(c) => {
                AttributeValue::Expression(self.register(&c, location, loop_context)?)
            }
            AttributeInput::Mixed(parts) => AttributeValue::Expression(self.register(
                &template_literal(&parts),
                location,
                loop_context,
            )?),
        };
        Ok(AttributeIR {
            name: name.to_string(),
            value,
            location,
            loop_context: loop_context.cloned(),
        })
    }
}

fn template_literal(parts: &[ValuePart]) -> String {
    let mut out = String::from("`");
    for part in parts {
        match part {
            ValuePart::Text(text) => out.push_str(
                &text
                    .replace('\\', "\\\\")
                    .replace('`', "\\`")
                    .replace("${", "\\${"),
            ),
            ValuePart::Code(code) => {
                out.push_str("${");
                out.push_str(code.trim());
                out.push('}');
            }
        }
    }
    out.push('`');
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// MARKUP SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

struct OpenTag {
    name: String,
    offset: usize,
}

struct PreparedMarkup {
    html: String,
    has_html: bool,
}

fn tag_name_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'-' | b'_' | b'.' | b':'))
    {
        i += 1;
    }
    i
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|p| from + p)
}

/// Checks tag balance and rewrites every opening tag for the HTML parser:
/// a `data-zen-loc` marker, the original spelling of mixed-case tag and
/// attribute names, and `<X/>` expanded to `<X></X>` for non-void tags.
fn prepare_markup(normalized: &NormalizedMarkup, file: &SourceFile) -> CompileResult<PreparedMarkup> {
    let text = normalized.text.as_str();
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + text.len() / 4);
    let mut stack: Vec<OpenTag> = Vec::new();
    let mut has_html = false;
    let mut copied = 0;
    let mut i = 0;

    let error_at = |message: &str, pos: usize| {
        file.error(
            ErrorKind::MalformedMarkup,
            message,
            normalized.original_offset(pos),
        )
    };

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if bytes[i..].starts_with(b"<!--") {
            i = find_from(bytes, i + 4, b"-->").map(|e| e + 3).unwrap_or(bytes.len());
            continue;
        }
        if matches!(bytes.get(i + 1), Some(b'!') | Some(b'?')) {
            i = find_from(bytes, i, b">").map(|e| e + 1).unwrap_or(bytes.len());
            continue;
        }
        let closing = bytes.get(i + 1) == Some(&b'/');
        let name_start = if closing { i + 2 } else { i + 1 };
        if !bytes.get(name_start).map_or(false, |b| b.is_ascii_alphabetic()) {
            i += 1;
            continue;
        }
        let name_end = tag_name_end(bytes, name_start);
        let name = &text[name_start..name_end];
        let lower = name.to_ascii_lowercase();
        let end = find_tag_end(bytes, i)
            .ok_or_else(|| error_at(&format!("Unterminated tag <{}>.", name), i))?;

        if closing {
            if !is_void_element(&lower) {
                match stack.iter().rposition(|t| t.name == lower) {
                    None => {
                        return Err(error_at(
                            &format!("Unexpected closing tag </{}>.", name),
                            i,
                        ))
                    }
                    Some(pos) => {
                        if let Some(open) = stack[pos + 1..]
                            .iter()
                            .find(|t| !OPTIONAL_CLOSE.contains(&t.name.as_str()))
                        {
                            return Err(error_at(
                                &format!("Unclosed <{}> before </{}>.", open.name, name),
                                open.offset,
                            ));
                        }
                        stack.truncate(pos);
                    }
                }
            }
            i = end + 1;
            continue;
        }

        let inner = &text[name_end..end];
        let trimmed = inner.trim_end();
        let self_closing = trimmed.ends_with('/');
        let attr_region = if self_closing {
            &trimmed[..trimmed.len() - 1]
        } else {
            inner
        };
        let void = is_void_element(&lower);
        let loc = file.location(normalized.original_offset(i));

        out.push_str(&text[copied..i]);
        out.push('<');
        out.push_str(name);
        out.push_str(&format!(" {}=\"{}:{}\"", LOC_ATTR, loc.line, loc.column));
        if name != lower {
            out.push_str(&format!(" {}=\"{}\"", ORIG_NAME_ATTR, name));
        }
        let cased: Vec<String> = parse_tag_attributes(attr_region)
            .into_keys()
            .filter(|k| k.chars().any(|c| c.is_ascii_uppercase()))
            .collect();
        if !cased.is_empty() {
            out.push_str(&format!(" {}=\"{}\"", ORIG_ATTRS_ATTR, cased.join(",")));
        }
        out.push_str(attr_region);
        if self_closing && !void {
            out.push_str(&format!("></{}>", name));
        } else if self_closing {
            out.push_str(" />");
        } else {
            out.push('>');
        }
        if lower == "html" {
            has_html = true;
        }
        i = end + 1;
        copied = i;

        if self_closing || void {
            continue;
        }
        if RAW_TEXT_ELEMENTS.contains(&lower.as_str()) {
            let close = format!("</{}", lower);
            i = find_from(bytes, i, close.as_bytes()).ok_or_else(|| {
                error_at(&format!("Unclosed <{}>.", name), i)
            })?;
        }
        stack.push(OpenTag {
            name: lower,
            offset: name_start - 1,
        });
    }
    out.push_str(&text[copied..]);

    if let Some(open) = stack
        .iter()
        .find(|t| !OPTIONAL_CLOSE.contains(&t.name.as_str()))
    {
        return Err(error_at(&format!("Unclosed <{}>.", open.name), open.offset));
    }

    Ok(PreparedMarkup { html: out, has_html })
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE PARSING
// ═══════════════════════════════════════════════════════════════════════════════

fn push_text(nodes: &mut Vec<TemplateNode>, value: &str, location: SourceLocation) {
    if value.is_empty() {
        return;
    }
    let value = if value.trim().is_empty() {
        if value.contains('\n') {
            return;
        }
        " "
    } else {
        value
    };
    nodes.push(TemplateNode::Text(TextNode {
        value: value.to_string(),
        location,
        loop_context: None,
    }));
}

fn parse_loc(value: &str) -> Option<SourceLocation> {
    let (line, column) = value.split_once(':')?;
    Some(SourceLocation::new(line.parse().ok()?, column.parse().ok()?))
}

struct DomConverter<'c, 'f> {
    ctx: &'c mut ParseContext,
    file: &'f SourceFile<'f>,
    placeholders: &'f IndexMap<String, RawExpression>,
    has_html: bool,
}

impl<'c, 'f> DomConverter<'c, 'f> {
    fn convert_document(&mut self, document: &Handle) -> CompileResult<Vec<TemplateNode>> {
        let mut nodes = Vec::new();
        for child in document.children.borrow().iter() {
            match &child.data {
                NodeData::Doctype { name, .. } if self.has_html => {
                    nodes.push(TemplateNode::Doctype(DoctypeNode {
                        name: name.to_string(),
                        location: SourceLocation::default(),
                    }))
                }
                NodeData::Element { .. } => self.convert_top(child, &mut nodes)?,
                _ => {}
            }
        }
        Ok(nodes)
    }

    /// Without `<html>` in the source, the wrappers the HTML parser adds are
    /// flattened away.
    fn convert_top(&mut self, handle: &Handle, out: &mut Vec<TemplateNode>) -> CompileResult<()> {
        if let NodeData::Element { name, .. } = &handle.data {
            let tag = name.local.to_string();
            if !self.has_html && matches!(tag.as_str(), "html" | "head" | "body") {
                for child in handle.children.borrow().iter() {
                    self.convert_top(child, out)?;
                }
                return Ok(());
            }
        }
        out.extend(self.convert_node(handle, SourceLocation::default())?);
        Ok(())
    }

    fn convert_children(
        &mut self,
        handles: &[Handle],
        location: SourceLocation,
    ) -> CompileResult<Vec<TemplateNode>> {
        let mut nodes = Vec::new();
        for handle in handles {
            nodes.extend(self.convert_node(handle, location)?);
        }
        Ok(nodes)
    }

    fn convert_node(
        &mut self,
        handle: &Handle,
        parent_location: SourceLocation,
    ) -> CompileResult<Vec<TemplateNode>> {
        match &handle.data {
            NodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                self.convert_text(&text, parent_location)
            }
            NodeData::Element { .. } => Ok(vec![self.convert_element(handle, parent_location)?]),
            _ => Ok(vec![]),
        }
    }

    fn convert_text(
        &mut self,
        text: &str,
        location: SourceLocation,
    ) -> CompileResult<Vec<TemplateNode>> {
        let mut nodes = Vec::new();
        let mut last = 0;
        for m in PLACEHOLDER_RE.find_iter(text) {
            push_text(&mut nodes, &text[last..m.start()], location);
            match self.placeholders.get(m.as_str()) {
                Some(raw) => {
                    let at = self.file.location(raw.offset);
                    let id = self.ctx.register(&raw.code, at, None)?;
                    nodes.push(TemplateNode::Expression(ExpressionNode {
                        expr_id: id,
                        location: at,
                        loop_context: None,
                    }));
                }
                None => push_text(&mut nodes, m.as_str(), location),
            }
            last = m.end();
        }
        push_text(&mut nodes, &text[last..], location);
        Ok(nodes)
    }

    fn attribute_input(&self, value: &str) -> (AttributeInput, Option<SourceLocation>) {
        if let Some(raw) = self.placeholders.get(value.trim()) {
            return (
                AttributeInput::Code(raw.code.clone()),
                Some(self.file.location(raw.offset)),
            );
        }
        if !PLACEHOLDER_RE.is_match(value) {
            return (AttributeInput::Static(value.to_string()), None);
        }
        let mut parts = Vec::new();
        let mut first = None;
        let mut last = 0;
        for m in PLACEHOLDER_RE.find_iter(value) {
            if m.start() > last {
                parts.push(ValuePart::Text(value[last..m.start()].to_string()));
            }
            match self.placeholders.get(m.as_str()) {
                Some(raw) => {
                    first.get_or_insert_with(|| self.file.location(raw.offset));
                    parts.push(ValuePart::Code(raw.code.clone()));
                }
                None => parts.push(ValuePart::Text(m.as_str().to_string())),
            }
            last = m.end();
        }
        if last < value.len() {
            parts.push(ValuePart::Text(value[last..].to_string()));
        }
        (AttributeInput::Mixed(parts), first)
    }

    fn convert_element(
        &mut self,
        handle: &Handle,
        parent_location: SourceLocation,
    ) -> CompileResult<TemplateNode> {
        let (name, attrs, template_contents) = match &handle.data {
            NodeData::Element {
                name,
                attrs,
                template_contents,
                ..
            } => (name, attrs, template_contents),
            _ => return Err(CompilerError::internal("Expected an element node.", self.file.path)),
        };
        let attrs = attrs.borrow();

        let mut spelling = name.local.to_string();
        let mut location = parent_location;
        let mut original_names: HashMap<String, String> = HashMap::new();
        for attr in attrs.iter() {
            match &*attr.name.local {
                LOC_ATTR => location = parse_loc(&attr.value).unwrap_or(location),
                ORIG_NAME_ATTR => spelling = attr.value.to_string(),
                ORIG_ATTRS_ATTR => {
                    for original in attr.value.split(',') {
                        original_names.insert(original.to_ascii_lowercase(), original.to_string());
                    }
                }
                _ => {}
            }
        }

        let child_handles: Vec<Handle> = match template_contents.borrow().as_ref() {
            Some(contents) => contents.children.borrow().clone(),
            None => handle.children.borrow().clone(),
        };
        let children = self.convert_children(&child_handles, location)?;

        if spelling.eq_ignore_ascii_case("slot") {
            let name = attrs
                .iter()
                .find(|a| &*a.name.local == "name")
                .map(|a| a.value.to_string())
                .filter(|n| !n.is_empty());
            return Ok(TemplateNode::Slot(SlotNode {
                name,
                fallback: children,
                location,
                loop_context: None,
            }));
        }

        let is_component = is_component_tag(&spelling);
        let mut attributes = Vec::new();
        for attr in attrs.iter() {
            let local = attr.name.local.to_string();
            if matches!(local.as_str(), LOC_ATTR | ORIG_NAME_ATTR | ORIG_ATTRS_ATTR) {
                continue;
            }
            let local = original_names
                .get(&local.to_ascii_lowercase())
                .cloned()
                .unwrap_or(local);
            let attr_name = match &attr.name.prefix {
                Some(prefix) => format!("{}:{}", prefix, local),
                None => local,
            };
            let (input, at) = self.attribute_input(&attr.value);
            attributes.push(self.ctx.convert_attribute(
                &attr_name,
                input,
                is_component,
                at.unwrap_or(location),
                None,
            )?);
        }

        Ok(if is_component {
            TemplateNode::Component(ComponentNode {
                name: spelling,
                attributes,
                children,
                location,
                loop_context: None,
            })
        } else {
            TemplateNode::Element(ElementNode {
                tag: spelling,
                attributes,
                children,
                location,
                loop_context: None,
            })
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN PARSING FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parses one `.zen` file into its IR. Inline handlers are lifted into
/// synthetic script blocks.
pub fn parse_zen_file(source: &str, file_path: &str) -> CompileResult<ZenIR> {
    let file = SourceFile::new(file_path, source);
    let blocks = extract_blocks(&file)?;
    let mut script = analyze_scripts(&blocks.scripts, &file)?;
    let normalized = normalize_expressions(&blocks.markup, &file)?;
    let prepared = prepare_markup(&normalized, &file)?;

    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut prepared.html.as_bytes())
        .map_err(|e| {
            CompilerError::new(
                ErrorKind::MalformedMarkup,
                &format!("Failed to parse HTML: {}", e),
                file_path,
                1,
                1,
            )
        })?;

    let mut ctx = ParseContext::new(file_path);
    let nodes = DomConverter {
        ctx: &mut ctx,
        file: &file,
        placeholders: &normalized.expressions,
        has_html: prepared.has_html,
    }
    .convert_document(&dom.document)?;
    let nodes = lower_fragments(nodes, &mut ctx)?;

    let ParseContext {
        expressions,
        handlers,
        ..
    } = ctx;
    if !handlers.is_empty() {
        let script = script.get_or_insert_with(ScriptIR::default);
        for handler in handlers {
            push_synthetic_handler(script, handler.source, handler.location, file_path)?;
        }
    }

    let styles = blocks
        .styles
        .iter()
        .map(|block| StyleIR {
            raw: block.content.clone(),
            global: block.attributes.contains_key("global"),
            scope: None,
            location: file.location(block.offset),
        })
        .collect();

    tracing::trace!(
        file = file_path,
        expressions = expressions.len(),
        "parsed template"
    );

    Ok(ZenIR {
        file_path: file_path.to_string(),
        template: TemplateIR {
            raw: source.to_string(),
            nodes,
            expressions,
        },
        script,
        styles,
    })
}

/// Template half of [`parse_zen_file`].
pub fn parse_template(html: &str, file_path: &str) -> CompileResult<TemplateIR> {
    parse_zen_file(html, file_path).map(|ir| ir.template)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
