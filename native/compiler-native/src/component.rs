//! Component and layout inlining.
//!
//! The resolver repeatedly replaces the first unresolved component usage in
//! the page tree with a fresh copy of the component's IR until no usage is
//! left. Layouts are resolved before ordinary components. Every component
//! usage gets its own instance id, and the copy's script names are rewritten
//! to `__zen_comp_<n>_<name>` so sibling instances never share state.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::config::CompileOptions;
use crate::discovery::{ComponentMetadata, ComponentRegistry};
use crate::ir::{
    AttributeIR, AttributeValue, ComponentNode, ElementNode, ExpressionIR, LoopContext, ScriptIR,
    ScriptStatement, StyleIR, TemplateIR, TemplateNode, TextSpan, ZenIR,
};
use crate::layout::{layout_renames, shared_states};
use crate::parse::{event_name, IdGenerator};
use crate::renamer::{
    apply_edits, edits_for, is_identifier, program_references, rewrite_expression, Reference,
    Rewrite,
};
use crate::scope::BindingTable;
use crate::script::{
    blank_declaration_keywords, build_block, lift_handler, merge_block, push_synthetic_handler,
};
use crate::validate::{CompileResult, CompilerError, ErrorKind};

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum UsageKind {
    Layout,
    Component,
}

/// Substitutions applied to one inlined copy.
#[derive(Debug, Default)]
struct Bindings {
    /// Script names of the copy and their instance-scoped replacements.
    renames: HashMap<String, String>,
    /// Declared props and the caller code bound to each.
    props: HashMap<String, String>,
    /// Layout states dropped in favor of the page's declaration.
    shared_states: HashSet<String>,
}

impl Bindings {
    fn decide(&self, reference: &Reference, loop_context: Option<&LoopContext>) -> Option<Rewrite> {
        if loop_context.map_or(false, |ctx| ctx.contains(&reference.name)) {
            return None;
        }
        if let Some(name) = self.renames.get(&reference.name) {
            return Some(Rewrite::Name(name.clone()));
        }
        if let Some(value) = self.props.get(&reference.name) {
            return Some(Rewrite::Name(value.clone()));
        }
        if reference.name == "props" {
            let (prop, _) = reference.member.as_ref()?;
            return self.props.get(prop).cloned().map(Rewrite::Member);
        }
        None
    }

    fn handler(&self, name: &str) -> Option<String> {
        if let Some(renamed) = self.renames.get(name) {
            return Some(renamed.clone());
        }
        self.props
            .get(name)
            .filter(|value| is_identifier(value))
            .cloned()
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// The parts of the page IR an inlining step writes to.
struct Page<'p> {
    file_path: &'p str,
    expressions: &'p mut Vec<ExpressionIR>,
    script: &'p mut Option<ScriptIR>,
    styles: &'p mut Vec<StyleIR>,
}

impl<'p> Page<'p> {
    fn expression_code(&self, id: &str) -> CompileResult<String> {
        self.expressions
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.code.trim().to_string())
            .ok_or_else(|| {
                CompilerError::internal(
                    &format!("Component attribute references missing expression ID \"{}\".", id),
                    self.file_path,
                )
            })
    }

    fn discard_expression(&mut self, id: &str) {
        self.expressions.retain(|e| e.id != id);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TREE SEARCH
// ═══════════════════════════════════════════════════════════════════════════════

fn child_lists(node: &TemplateNode) -> Vec<&Vec<TemplateNode>> {
    match node {
        TemplateNode::Element(el) => vec![&el.children],
        TemplateNode::Component(c) => vec![&c.children],
        TemplateNode::Slot(s) => vec![&s.fallback],
        TemplateNode::ConditionalFragment(f) => vec![&f.consequent, &f.alternate],
        TemplateNode::OptionalFragment(f) => vec![&f.fragment],
        TemplateNode::LoopFragment(f) => vec![&f.body],
        _ => vec![],
    }
}

fn child_lists_mut(node: &mut TemplateNode) -> Vec<&mut Vec<TemplateNode>> {
    match node {
        TemplateNode::Element(el) => vec![&mut el.children],
        TemplateNode::Component(c) => vec![&mut c.children],
        TemplateNode::Slot(s) => vec![&mut s.fallback],
        TemplateNode::ConditionalFragment(f) => vec![&mut f.consequent, &mut f.alternate],
        TemplateNode::OptionalFragment(f) => vec![&mut f.fragment],
        TemplateNode::LoopFragment(f) => vec![&mut f.body],
        _ => vec![],
    }
}

/// First component usage in document order accepted by `accept`.
fn find_first<'n>(
    nodes: &'n [TemplateNode],
    accept: &mut dyn FnMut(&ComponentNode) -> bool,
) -> Option<&'n ComponentNode> {
    for node in nodes {
        if let TemplateNode::Component(component) = node {
            if accept(component) {
                return Some(component);
            }
        }
        for list in child_lists(node) {
            if let Some(found) = find_first(list, accept) {
                return Some(found);
            }
        }
    }
    None
}

/// Replaces the first usage accepted by `is_target` with `replace(usage)`.
fn replace_first<F>(
    nodes: &mut Vec<TemplateNode>,
    is_target: &dyn Fn(&ComponentNode) -> bool,
    replace: &mut F,
) -> CompileResult<bool>
where
    F: FnMut(ComponentNode) -> CompileResult<Vec<TemplateNode>>,
{
    for i in 0..nodes.len() {
        let hit = matches!(&nodes[i], TemplateNode::Component(c) if is_target(c));
        if hit {
            if let TemplateNode::Component(usage) = nodes.remove(i) {
                let replacement = replace(usage)?;
                nodes.splice(i..i, replacement);
                return Ok(true);
            }
        }
        for list in child_lists_mut(&mut nodes[i]) {
            if replace_first(list, is_target, replace)? {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COPY REBINDING
// ═══════════════════════════════════════════════════════════════════════════════

struct Rebinder<'b> {
    ids: &'b HashMap<String, String>,
    bindings: &'b Bindings,
    usage_context: Option<&'b LoopContext>,
}

impl<'b> Rebinder<'b> {
    fn id(&self, id: &mut String) {
        if let Some(new_id) = self.ids.get(id.as_str()) {
            *id = new_id.clone();
        }
    }

    fn context(&self, context: &mut Option<LoopContext>) {
        if let Some(ctx) = context.as_mut() {
            if let Some(source) = ctx.map_source.as_mut() {
                self.id(source);
            }
        }
        *context = LoopContext::merge(self.usage_context, context.as_ref());
    }

    fn attributes(&self, attributes: &mut [AttributeIR]) {
        for attribute in attributes {
            match &mut attribute.value {
                AttributeValue::Expression(id) => self.id(id),
                AttributeValue::Handler(name) => {
                    if let Some(replacement) = self.bindings.handler(name) {
                        *name = replacement;
                    }
                }
                AttributeValue::Static(_) => {}
            }
            self.context(&mut attribute.loop_context);
        }
    }

    fn nodes(&self, nodes: &mut [TemplateNode]) {
        for node in nodes {
            self.node(node);
        }
    }

    fn node(&self, node: &mut TemplateNode) {
        match node {
            TemplateNode::Element(el) => {
                self.attributes(&mut el.attributes);
                self.context(&mut el.loop_context);
                self.nodes(&mut el.children);
            }
            TemplateNode::Component(c) => {
                self.attributes(&mut c.attributes);
                self.context(&mut c.loop_context);
                self.nodes(&mut c.children);
            }
            TemplateNode::Slot(s) => {
                self.context(&mut s.loop_context);
                self.nodes(&mut s.fallback);
            }
            TemplateNode::Text(t) => self.context(&mut t.loop_context),
            TemplateNode::Expression(e) => {
                self.id(&mut e.expr_id);
                self.context(&mut e.loop_context);
            }
            TemplateNode::ConditionalFragment(f) => {
                self.id(&mut f.condition);
                self.context(&mut f.loop_context);
                self.nodes(&mut f.consequent);
                self.nodes(&mut f.alternate);
            }
            TemplateNode::OptionalFragment(f) => {
                self.id(&mut f.condition);
                self.context(&mut f.loop_context);
                self.nodes(&mut f.fragment);
            }
            TemplateNode::LoopFragment(f) => {
                self.id(&mut f.source);
                if let Some(key) = f.key.as_mut() {
                    self.id(key);
                }
                self.context(&mut f.loop_context);
                self.nodes(&mut f.body);
            }
            TemplateNode::Doctype(_) => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLOTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct SlotContent {
    default: Vec<TemplateNode>,
    named: IndexMap<String, Vec<TemplateNode>>,
}

/// `Card.Header` inside a `Card` usage names the `header` slot.
fn compound_slot(child: &str, parent: &str) -> Option<String> {
    let rest = child.get(parent.len()..)?;
    if child[..parent.len()].eq_ignore_ascii_case(parent) && rest.len() > 1 && rest.starts_with('.') {
        Some(rest[1..].to_lowercase())
    } else {
        None
    }
}

fn take_slot_attribute(attributes: &mut Vec<AttributeIR>) -> Option<String> {
    let index = attributes.iter().position(|a| {
        a.name == "slot" && matches!(a.value, AttributeValue::Static(_))
    })?;
    match attributes.remove(index).value {
        AttributeValue::Static(name) => Some(name.to_lowercase()),
        _ => None,
    }
}

fn collect_slot_content(usage_name: &str, children: Vec<TemplateNode>) -> SlotContent {
    let mut content = SlotContent::default();
    for child in children {
        let target = match child {
            TemplateNode::Component(c) => match compound_slot(&c.name, usage_name) {
                Some(slot) => {
                    content.named.entry(slot).or_default().extend(c.children);
                    continue;
                }
                None => {
                    let mut c = c;
                    let slot = take_slot_attribute(&mut c.attributes);
                    (slot, TemplateNode::Component(c))
                }
            },
            TemplateNode::Element(mut el) => {
                let slot = take_slot_attribute(&mut el.attributes);
                (slot, TemplateNode::Element(el))
            }
            other => (None, other),
        };
        match target {
            (Some(slot), node) if slot != "default" => {
                content.named.entry(slot).or_default().push(node)
            }
            (_, node) => content.default.push(node),
        }
    }
    content
}

struct SlotFiller<'c> {
    content: &'c SlotContent,
    used: HashSet<String>,
    default_used: bool,
}

impl<'c> SlotFiller<'c> {
    fn has_default_content(&self) -> bool {
        self.content.default.iter().any(|n| !n.is_blank())
    }

    fn fill(&mut self, nodes: Vec<TemplateNode>) -> Vec<TemplateNode> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            match node {
                TemplateNode::Slot(slot) => {
                    let name = slot
                        .name
                        .as_deref()
                        .map(str::to_lowercase)
                        .filter(|n| n != "default");
                    match name {
                        Some(name) => match self.content.named.get(&name) {
                            Some(content) => {
                                self.used.insert(name);
                                out.extend(content.iter().cloned());
                            }
                            None => out.extend(self.fill(slot.fallback)),
                        },
                        None => {
                            self.default_used = true;
                            if self.has_default_content() {
                                out.extend(self.content.default.iter().cloned());
                            } else {
                                out.extend(self.fill(slot.fallback));
                            }
                        }
                    }
                }
                mut other => {
                    for list in child_lists_mut(&mut other) {
                        let children = std::mem::take(list);
                        *list = self.fill(children);
                    }
                    out.push(other);
                }
            }
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESOLVER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ComponentResolver<'a> {
    layouts: &'a ComponentRegistry,
    components: &'a ComponentRegistry,
    max_iterations: usize,
    ids: IdGenerator,
    instances: usize,
    layout_instances: usize,
    forwarded_handlers: usize,
    styled: HashSet<(UsageKind, String)>,
}

impl<'a> ComponentResolver<'a> {
    pub fn new(
        layouts: &'a ComponentRegistry,
        components: &'a ComponentRegistry,
        options: &CompileOptions,
    ) -> Self {
        ComponentResolver {
            layouts,
            components,
            max_iterations: options.max_resolution_iterations,
            ids: IdGenerator::new(),
            instances: 0,
            layout_instances: 0,
            forwarded_handlers: 0,
            styled: HashSet::new(),
        }
    }

    /// Next usage to inline: the first layout usage if any, otherwise the
    /// first component usage.
    fn next_target(
        &self,
        nodes: &[TemplateNode],
        file_path: &str,
    ) -> CompileResult<Option<(UsageKind, &'a ComponentMetadata)>> {
        let layouts = self.layouts;
        let mut layout_error = None;
        let layout_usage = find_first(nodes, &mut |c| match layouts.lookup(&c.name) {
            Ok(found) => found.is_some(),
            Err(e) => {
                layout_error.get_or_insert(e);
                true
            }
        });
        if let Some(error) = layout_error {
            return Err(error);
        }
        if let Some(usage) = layout_usage {
            if let Some(metadata) = layouts.lookup(&usage.name)? {
                return Ok(Some((UsageKind::Layout, metadata)));
            }
        }

        let usage = match find_first(nodes, &mut |_| true) {
            Some(usage) => usage,
            None => return Ok(None),
        };
        let components = self.components;
        match components.lookup(&usage.name)? {
            Some(metadata) => Ok(Some((UsageKind::Component, metadata))),
            None => Err(CompilerError::at(
                ErrorKind::UnknownComponent {
                    name: usage.name.clone(),
                },
                &format!("Unknown component: <{}>.", usage.name),
                file_path,
                usage.location,
            )
            .with_hint("Component tags resolve against files in the components directory by name.")),
        }
    }

    /// Inlines every layout and component usage of `ir`. Returns the number
    /// of usages replaced.
    pub fn resolve(&mut self, ir: &mut ZenIR) -> CompileResult<usize> {
        self.ids = IdGenerator::after(&ir.template.expressions);
        let ZenIR {
            file_path,
            template,
            script,
            styles,
        } = ir;
        let TemplateIR {
            nodes, expressions, ..
        } = template;
        let file_path = file_path.as_str();

        let mut iterations = 0usize;
        loop {
            let (kind, metadata) = match self.next_target(nodes, file_path)? {
                Some(target) => target,
                None => break,
            };
            iterations += 1;
            if iterations > self.max_iterations {
                return Err(CompilerError::new(
                    ErrorKind::ResolutionLimit {
                        limit: self.max_iterations,
                    },
                    &format!(
                        "Component resolution exceeded {} iterations while inlining <{}>.",
                        self.max_iterations, metadata.name
                    ),
                    file_path,
                    1,
                    1,
                )
                .with_hint("Check for components that include themselves."));
            }

            let key = metadata.name.to_lowercase();
            let mut page = Page {
                file_path,
                expressions: &mut *expressions,
                script: &mut *script,
                styles: &mut *styles,
            };
            let mut replace = |usage: ComponentNode| self.inline(kind, metadata, usage, &mut page);
            let replaced = replace_first(
                nodes,
                &|c: &ComponentNode| c.name.to_lowercase() == key,
                &mut replace,
            )?;
            if !replaced {
                return Err(CompilerError::new(
                    ErrorKind::ResolutionStalled,
                    &format!("Usage of <{}> was found but could not be replaced.", metadata.name),
                    file_path,
                    1,
                    1,
                ));
            }
        }

        tracing::debug!(file = %file_path, iterations, "components resolved");
        Ok(iterations)
    }

    fn inline(
        &mut self,
        kind: UsageKind,
        metadata: &ComponentMetadata,
        usage: ComponentNode,
        page: &mut Page,
    ) -> CompileResult<Vec<TemplateNode>> {
        let component_file = metadata.file_path.as_str();
        let ZenIR {
            template,
            script: component_script,
            styles: component_styles,
            ..
        } = metadata.ir.clone();

        let instance = match kind {
            UsageKind::Component => {
                let n = self.instances;
                self.instances += 1;
                Some(n)
            }
            UsageKind::Layout => None,
        };

        let mut bindings = Bindings::default();
        if let Some(script) = &component_script {
            match instance {
                Some(n) => {
                    for name in script.top_level_names() {
                        let scoped = format!("__zen_comp_{}_{}", n, name);
                        bindings.renames.insert(name, scoped);
                    }
                }
                None => {
                    bindings.renames = layout_renames(script, self.layout_instances);
                    bindings.shared_states = shared_states(script, page.script.as_ref());
                    self.layout_instances += 1;
                }
            }
        }

        // Props
        let declared: Vec<(String, Option<String>)> = component_script
            .as_ref()
            .map(|s| {
                s.props
                    .values()
                    .map(|p| (p.name.clone(), p.default.clone()))
                    .collect()
            })
            .unwrap_or_default();
        let table = BindingTable::from_script(page.script.as_ref());
        for (name, default) in &declared {
            let value = match usage.attribute(name).map(|a| &a.value) {
                Some(AttributeValue::Static(s)) => js_string(s),
                Some(AttributeValue::Expression(id)) => {
                    let code = page.expression_code(id)?;
                    page.discard_expression(id);
                    if is_identifier(&code) && table.is_caller_binding(&code) {
                        code
                    } else {
                        format!("({})", code)
                    }
                }
                Some(AttributeValue::Handler(handler)) => handler.clone(),
                None => default
                    .as_ref()
                    .map(|d| format!("({})", d))
                    .unwrap_or_else(|| "undefined".to_string()),
            };
            bindings.props.insert(name.clone(), value);
        }

        // Expressions
        let ids: HashMap<String, String> = template
            .expressions
            .iter()
            .map(|e| (e.id.clone(), self.ids.next_id()))
            .collect();
        for expr in &template.expressions {
            let code = rewrite_expression(&expr.code, |r| {
                bindings.decide(r, expr.loop_context.as_ref())
            })
            .map_err(|e| {
                CompilerError::at(
                    ErrorKind::InvalidExpression,
                    &format!("Invalid expression syntax: {}", e),
                    expr.source_file.as_deref().unwrap_or(component_file),
                    expr.location,
                )
                .with_context(expr.code.clone())
            })?;
            let mut loop_context = expr.loop_context.clone();
            if let Some(source) = loop_context.as_mut().and_then(|c| c.map_source.as_mut()) {
                if let Some(new_id) = ids.get(source.as_str()) {
                    *source = new_id.clone();
                }
            }
            page.expressions.push(ExpressionIR {
                id: ids[&expr.id].clone(),
                code,
                location: expr.location,
                loop_context: LoopContext::merge(usage.loop_context.as_ref(), loop_context.as_ref()),
                source_file: Some(
                    expr.source_file
                        .clone()
                        .unwrap_or_else(|| component_file.to_string()),
                ),
            });
        }

        let mut nodes = template.nodes;
        Rebinder {
            ids: &ids,
            bindings: &bindings,
            usage_context: usage.loop_context.as_ref(),
        }
        .nodes(&mut nodes);

        // Slots
        let content = collect_slot_content(&usage.name, usage.children.clone());
        let mut filler = SlotFiller {
            content: &content,
            used: HashSet::new(),
            default_used: false,
        };
        let mut nodes = filler.fill(nodes);
        let unmatched = content
            .named
            .keys()
            .find(|name| !filler.used.contains(*name))
            .cloned()
            .or_else(|| {
                (filler.has_default_content() && !filler.default_used).then(|| "default".to_string())
            });
        if let Some(slot) = unmatched {
            return Err(CompilerError::at(
                ErrorKind::UnmatchedSlot {
                    component: metadata.name.clone(),
                    slot: slot.clone(),
                },
                &format!("<{}> has no slot named \"{}\" for the content passed to it.", metadata.name, slot),
                page.file_path,
                usage.location,
            )
            .with_hint("Add a matching <Slot name=\"...\" /> to the component or remove the content."));
        }

        if let Some(n) = instance {
            self.mark_roots(&mut nodes, &metadata.name, n);
            self.forward_attributes(&mut nodes, &usage, &declared, metadata, page)?;
        }

        if let Some(script) = component_script {
            merge_component_script(script, &bindings, component_file, page)?;
        }

        if self.styled.insert((kind, metadata.name.to_lowercase())) {
            for style in component_styles {
                let scope = match kind {
                    UsageKind::Component if !style.global => Some(metadata.name.clone()),
                    _ => None,
                };
                page.styles.push(StyleIR { scope, ..style });
            }
        }

        tracing::debug!(
            component = %metadata.name,
            instance = ?instance.map(|n| format!("comp-{}", n)),
            layout = kind == UsageKind::Layout,
            "inlined usage"
        );
        Ok(nodes)
    }

    fn mark_roots(&self, nodes: &mut [TemplateNode], name: &str, instance: usize) {
        for node in nodes {
            if let TemplateNode::Element(el) = node {
                let markers = [
                    ("data-zen-component", name.to_string()),
                    ("data-zen-instance", format!("comp-{}", instance)),
                    ("data-zen-replaced", "true".to_string()),
                ];
                for (marker, value) in markers {
                    el.attributes.retain(|a| a.name != marker);
                    el.attributes.push(AttributeIR {
                        name: marker.to_string(),
                        value: AttributeValue::Static(value),
                        location: el.location,
                        loop_context: el.loop_context.clone(),
                    });
                }
            }
        }
    }

    /// Attributes of the usage that are not declared props land on the
    /// component's single root element.
    fn forward_attributes(
        &mut self,
        nodes: &mut [TemplateNode],
        usage: &ComponentNode,
        declared: &[(String, Option<String>)],
        metadata: &ComponentMetadata,
        page: &mut Page,
    ) -> CompileResult<()> {
        let forwarded: Vec<&AttributeIR> = usage
            .attributes
            .iter()
            .filter(|a| a.name != "slot" && !declared.iter().any(|(p, _)| p == &a.name))
            .collect();
        if forwarded.is_empty() {
            return Ok(());
        }

        let mut roots = nodes.iter_mut().filter(|n| !n.is_blank());
        let root = match (roots.next(), roots.next()) {
            (Some(TemplateNode::Element(el)), None) => el,
            _ => {
                tracing::warn!(
                    component = %metadata.name,
                    file = %page.file_path,
                    "attributes on a component without a single root element are dropped"
                );
                return Ok(());
            }
        };

        for attribute in forwarded {
            let attribute = match event_name(&attribute.name) {
                Some(event) => AttributeIR {
                    name: format!("data-zen-{}", event),
                    value: AttributeValue::Handler(self.forwarded_handler(attribute, usage, page)?),
                    location: attribute.location,
                    loop_context: attribute.loop_context.clone(),
                },
                None => attribute.clone(),
            };
            merge_root_attribute(root, attribute);
        }
        Ok(())
    }

    fn forwarded_handler(
        &mut self,
        attribute: &AttributeIR,
        usage: &ComponentNode,
        page: &mut Page,
    ) -> CompileResult<String> {
        let code = match &attribute.value {
            AttributeValue::Handler(name) => return Ok(name.clone()),
            AttributeValue::Static(code) => code.trim().to_string(),
            AttributeValue::Expression(id) => {
                let code = page.expression_code(id)?;
                page.discard_expression(id);
                code
            }
        };
        if is_identifier(&code) {
            return Ok(code);
        }
        let name = format!("__zen_fwd_h{}", self.forwarded_handlers);
        self.forwarded_handlers += 1;
        let source = lift_handler(&name, &code, usage.loop_context.as_ref());
        let script = page.script.get_or_insert_with(ScriptIR::default);
        push_synthetic_handler(script, source, attribute.location, page.file_path)?;
        Ok(name)
    }
}

fn merge_root_attribute(root: &mut ElementNode, attribute: AttributeIR) {
    if let Some(existing) = root.attributes.iter_mut().find(|a| a.name == attribute.name) {
        if attribute.name == "class" {
            if let (AttributeValue::Static(current), AttributeValue::Static(extra)) =
                (&mut existing.value, &attribute.value)
            {
                current.push(' ');
                current.push_str(extra);
                return;
            }
        }
        *existing = attribute;
        return;
    }
    root.attributes.push(attribute);
}

/// Rewrites each block of a component's script with the usage's bindings
/// and appends it to the page script. Prop declarations and `.zen` imports
/// are removed; layout states the page already declares are dropped.
fn merge_component_script(
    script: ScriptIR,
    bindings: &Bindings,
    component_file: &str,
    page: &mut Page,
) -> CompileResult<()> {
    for block in script.blocks {
        let parsable = blank_declaration_keywords(&block);
        let references = program_references(&parsable).map_err(|e| {
            CompilerError::at(
                ErrorKind::InvalidScript,
                &format!("Invalid script syntax: {}", e),
                component_file,
                block.location,
            )
        })?;

        let removed: Vec<TextSpan> = block
            .statements
            .iter()
            .filter_map(|statement| match statement {
                ScriptStatement::Prop { span, .. } => Some(*span),
                ScriptStatement::Import { source, span, .. } if source.ends_with(".zen") => {
                    Some(*span)
                }
                ScriptStatement::State { name, span, .. }
                    if bindings.shared_states.contains(name) =>
                {
                    Some(*span)
                }
                _ => None,
            })
            .collect();
        let kept: Vec<Reference> = references
            .into_iter()
            .filter(|r| !removed.iter().any(|span| span.contains(r.span.start)))
            .collect();

        let mut edits = edits_for(&kept, |r| bindings.decide(r, None));
        edits.extend(removed.iter().map(|span| (span.start, span.end, String::new())));
        let raw = apply_edits(&block.raw, edits);

        let mut attributes = block.attributes.clone();
        attributes.shift_remove("props");
        let target = page.script.get_or_insert_with(ScriptIR::default);
        let mut merged = build_block(
            target.blocks.len(),
            &raw,
            attributes,
            block.location,
            component_file,
        )?;
        merged.synthetic = block.synthetic;
        merged.source_file = Some(
            block
                .source_file
                .clone()
                .unwrap_or_else(|| component_file.to_string()),
        );
        merge_block(target, merged, component_file)?;
    }
    Ok(())
}

/// Inlines all layouts and components used by `ir`.
pub fn resolve_components(
    ir: &mut ZenIR,
    layouts: &ComponentRegistry,
    components: &ComponentRegistry,
    options: &CompileOptions,
) -> CompileResult<usize> {
    ComponentResolver::new(layouts, components, options).resolve(ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::parse_component;
    use crate::parse::parse_zen_file;

    fn registry(files: &[(&str, &str)]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::default();
        for (path, source) in files {
            registry.insert(parse_component(source, path).unwrap());
        }
        registry
    }

    fn resolve(page: &str, layouts: &[(&str, &str)], components: &[(&str, &str)]) -> CompileResult<ZenIR> {
        let mut ir = parse_zen_file(page, "pages/index.zen")?;
        resolve_components(
            &mut ir,
            &registry(layouts),
            &registry(components),
            &CompileOptions::default(),
        )?;
        Ok(ir)
    }

    fn codes(ir: &ZenIR) -> Vec<String> {
        ir.template.expressions.iter().map(|e| e.code.clone()).collect()
    }

    fn root(ir: &ZenIR, index: usize) -> &ElementNode {
        let elements: Vec<&ElementNode> = ir
            .template
            .nodes
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(el) => Some(el),
                _ => None,
            })
            .collect();
        elements[index]
    }

    const COUNTER: &str = "<script>\nstate count = 0\nfunction increment() { count += 1 }\n</script>\n<button onclick={increment}>{count}</button>";

    #[test]
    fn test_instances_are_isolated() {
        let ir = resolve(
            "<Counter />\n<Counter />",
            &[],
            &[("components/Counter.zen", COUNTER)],
        )
        .unwrap();
        let states = ir.states();
        assert_eq!(states, vec!["__zen_comp_0_count", "__zen_comp_1_count"]);
        assert_eq!(codes(&ir), vec!["__zen_comp_0_count", "__zen_comp_1_count"]);

        let first = root(&ir, 0);
        let second = root(&ir, 1);
        assert_eq!(
            first.attribute("data-zen-click").map(|a| &a.value),
            Some(&AttributeValue::Handler("__zen_comp_0_increment".into()))
        );
        assert_eq!(
            second.attribute("data-zen-instance").map(|a| &a.value),
            Some(&AttributeValue::Static("comp-1".into()))
        );
        assert_eq!(
            first.attribute("data-zen-replaced").map(|a| &a.value),
            Some(&AttributeValue::Static("true".into()))
        );

        let script = ir.script.as_ref().unwrap();
        assert!(script.blocks[1]
            .raw
            .contains("function __zen_comp_1_increment() { __zen_comp_1_count += 1 }"));
    }

    #[test]
    fn test_prop_binding() {
        let greeting = "<script>\nprop name = \"World\"\nprop greeting\n</script>\n<p>{greeting} {name}</p>";
        let ir = resolve(
            "<script>\nstate user = 'Ada'\n</script>\n<Greeting greeting=\"Hi\" name={user} />\n<Greeting />",
            &[],
            &[("components/Greeting.zen", greeting)],
        )
        .unwrap();
        assert_eq!(
            codes(&ir),
            vec!["\"Hi\"", "user", "undefined", "(\"World\")"]
        );
        // Props never become page props.
        assert!(ir.props().is_empty());
    }

    #[test]
    fn test_inline_expression_prop_is_parenthesized() {
        let badge = "<script>\nprop value\n</script>\n<span>{value * 2}</span>";
        let ir = resolve(
            "<script>\nstate n = 1\n</script>\n<Badge value={n + 1} />",
            &[],
            &[("components/Badge.zen", badge)],
        )
        .unwrap();
        assert_eq!(codes(&ir), vec!["(n + 1) * 2"]);
    }

    #[test]
    fn test_named_and_default_slots() {
        let card = "<div class=\"card\"><header><Slot name=\"header\" /></header><Slot /></div>";
        let ir = resolve(
            "<Card><Card.Header><h2>Title</h2></Card.Header><p>Body</p><span slot=\"header\">!</span></Card>",
            &[],
            &[("components/Card.zen", card)],
        )
        .unwrap();
        let card = root(&ir, 0);
        let header = match &card.children[0] {
            TemplateNode::Element(el) => el,
            other => panic!("unexpected {:?}", other),
        };
        let header_tags: Vec<&str> = header
            .children
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(el) => Some(el.tag.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(header_tags, vec!["h2", "span"]);
        assert!(matches!(&card.children[1], TemplateNode::Element(el) if el.tag == "p"));
    }

    #[test]
    fn test_unmatched_slot_is_an_error() {
        let err = resolve(
            "<Plain><p slot=\"footer\">x</p></Plain>",
            &[],
            &[("components/Plain.zen", "<div><Slot /></div>")],
        )
        .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnmatchedSlot {
                component: "Plain".into(),
                slot: "footer".into()
            }
        );

        let err = resolve(
            "<Leaf>content</Leaf>",
            &[],
            &[("components/Leaf.zen", "<hr />")],
        )
        .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnmatchedSlot { ref slot, .. } if slot == "default"));
    }

    #[test]
    fn test_layout_wraps_page_at_document_scope() {
        let layout = "<script>\nprop title\nstate open = false\n</script>\n<main><h1>{title}</h1><button onclick={() => open = !open}>menu</button><Slot /></main>\n<style>main { margin: 0 }</style>";
        let ir = resolve(
            "<script>\nstate count = 0\n</script>\n<Main title=\"Home\"><p>{count}</p></Main>",
            &[("layouts/Main.zen", layout)],
            &[],
        )
        .unwrap();

        assert_eq!(ir.states(), vec!["count", "open"]);
        let main = root(&ir, 0);
        assert_eq!(main.tag, "main");
        assert!(main.attribute("data-zen-component").is_none());
        assert_eq!(
            main.children.iter().filter(|n| !n.is_blank()).count(),
            3
        );
        let script = ir.script.as_ref().unwrap();
        assert!(script.functions.contains(&"__zen_layout_0_h0".to_string()));
        assert_eq!(ir.styles.len(), 1);
        assert_eq!(ir.styles[0].scope, None);
    }

    #[test]
    fn test_component_in_loop_inherits_loop_context() {
        let item = "<script>\nprop label\n</script>\n<li>{label}</li>";
        let ir = resolve(
            "<script>\nstate items = []\n</script>\n<ul>{items.map(item => <Item label={item.name} />)}</ul>",
            &[],
            &[("components/Item.zen", item)],
        )
        .unwrap();
        let expr = ir
            .template
            .expressions
            .iter()
            .find(|e| e.code == "(item.name)")
            .expect("inlined label expression");
        assert!(expr.loop_context.as_ref().unwrap().contains("item"));
        assert_eq!(expr.source_file.as_deref(), Some("components/Item.zen"));
    }

    #[test]
    fn test_attributes_forward_to_single_root() {
        let button = "<button class=\"btn\"><Slot /></button>";
        let ir = resolve(
            "<script>\nfunction save() {}\n</script>\n<Button class=\"wide\" onclick={save} id=\"go\">Go</Button>",
            &[],
            &[("components/Button.zen", button)],
        )
        .unwrap();
        let button = root(&ir, 0);
        assert_eq!(
            button.attribute("class").map(|a| &a.value),
            Some(&AttributeValue::Static("btn wide".into()))
        );
        assert_eq!(
            button.attribute("data-zen-click").map(|a| &a.value),
            Some(&AttributeValue::Handler("save".into()))
        );
        assert!(button.attribute("id").is_some());
        assert!(ir.template.expressions.is_empty());
    }

    #[test]
    fn test_component_styles_are_scoped_once() {
        let chip = "<span class=\"chip\">x</span>\n<style>.chip { color: red }</style>";
        let ir = resolve("<Chip /><Chip />", &[], &[("components/Chip.zen", chip)]).unwrap();
        assert_eq!(ir.styles.len(), 1);
        assert_eq!(ir.styles[0].scope.as_deref(), Some("Chip"));
    }

    #[test]
    fn test_unknown_component() {
        let err = resolve("<div><Missing /></div>", &[], &[]).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownComponent {
                name: "Missing".into()
            }
        );
    }

    #[test]
    fn test_recursive_component_hits_the_limit() {
        let mut ir = parse_zen_file("<Tree />", "pages/index.zen").unwrap();
        let components = registry(&[("components/Tree.zen", "<div><Tree /></div>")]);
        let options = CompileOptions {
            max_resolution_iterations: 8,
            ..CompileOptions::default()
        };
        let err = resolve_components(&mut ir, &ComponentRegistry::default(), &components, &options)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ResolutionLimit { limit: 8 });
    }

    #[test]
    fn test_compound_slot_name() {
        assert_eq!(compound_slot("Card.Header", "Card"), Some("header".into()));
        assert_eq!(compound_slot("card.footer", "Card"), Some("footer".into()));
        assert_eq!(compound_slot("Cardigan", "Card"), None);
        assert_eq!(compound_slot("Card.", "Card"), None);
    }
}
