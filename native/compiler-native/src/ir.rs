//! Intermediate representation shared by every compiler stage.
//!
//! The IR is a plain owned tree: nodes are owned by their parent's child
//! list, expressions live in one flat list per template and are referenced
//! by id. Nothing here points back up the tree.

#[cfg(feature = "napi")]
use napi_derive::napi;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl Default for SourceLocation {
    fn default() -> Self {
        SourceLocation { line: 1, column: 1 }
    }
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        SourceLocation { line, column }
    }

    /// Location reached after reading `text` starting at this location.
    pub fn advance(&self, text: &str) -> SourceLocation {
        match text.rfind('\n') {
            Some(idx) => SourceLocation {
                line: self.line + text.matches('\n').count() as u32,
                column: text[idx + 1..].chars().count() as u32 + 1,
            },
            None => SourceLocation {
                line: self.line,
                column: self.column + text.chars().count() as u32,
            },
        }
    }
}

/// Byte range inside a script block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        TextSpan { start, end }
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOP CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct LoopContext {
    pub variables: Vec<String>,
    pub map_source: Option<String>,
}

impl LoopContext {
    pub fn new(variables: Vec<String>, map_source: Option<String>) -> Self {
        LoopContext {
            variables,
            map_source,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v == name)
    }

    /// Nests `inner` inside `outer`. Inner variables shadow outer ones of
    /// the same name and are listed last.
    pub fn merge(outer: Option<&LoopContext>, inner: Option<&LoopContext>) -> Option<LoopContext> {
        match (outer, inner) {
            (None, None) => None,
            (Some(o), None) => Some(o.clone()),
            (None, Some(i)) => Some(i.clone()),
            (Some(o), Some(i)) => {
                let mut variables: Vec<String> = o
                    .variables
                    .iter()
                    .filter(|v| !i.contains(v))
                    .cloned()
                    .collect();
                variables.extend(i.variables.iter().cloned());
                Some(LoopContext {
                    variables,
                    map_source: i.map_source.clone().or_else(|| o.map_source.clone()),
                })
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionIR {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
    /// File the expression was written in, when it differs from the page.
    #[serde(default)]
    pub source_file: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE NODES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
    Expression(ExpressionNode),
    Component(ComponentNode),
    Slot(SlotNode),
    ConditionalFragment(ConditionalFragmentNode),
    OptionalFragment(OptionalFragmentNode),
    LoopFragment(LoopFragmentNode),
    Doctype(DoctypeNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementNode {
    pub tag: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

impl ElementNode {
    pub fn attribute(&self, name: &str) -> Option<&AttributeIR> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextNode {
    pub value: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionNode {
    pub expr_id: String,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNode {
    /// Source spelling, e.g. `Card` or `Card.Header`.
    pub name: String,
    pub attributes: Vec<AttributeIR>,
    pub children: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

impl ComponentNode {
    pub fn attribute(&self, name: &str) -> Option<&AttributeIR> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// `<Slot/>` marker inside a component or layout body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotNode {
    pub name: Option<String>,
    /// Content rendered when the caller supplies nothing for this slot.
    pub fallback: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFragmentNode {
    pub condition: String,
    pub consequent: Vec<TemplateNode>,
    pub alternate: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFragmentNode {
    pub condition: String,
    pub fragment: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopFragmentNode {
    pub source: String,
    pub item_var: String,
    pub index_var: Option<String>,
    /// Expression id producing the stable key of each item.
    #[serde(default)]
    pub key: Option<String>,
    pub body: Vec<TemplateNode>,
    #[serde(default)]
    pub location: SourceLocation,
    /// Context visible inside the body (outer variables plus this loop's).
    pub loop_context: Option<LoopContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctypeNode {
    pub name: String,
    #[serde(default)]
    pub location: SourceLocation,
}

impl TemplateNode {
    pub fn location(&self) -> SourceLocation {
        match self {
            TemplateNode::Element(n) => n.location,
            TemplateNode::Text(n) => n.location,
            TemplateNode::Expression(n) => n.location,
            TemplateNode::Component(n) => n.location,
            TemplateNode::Slot(n) => n.location,
            TemplateNode::ConditionalFragment(n) => n.location,
            TemplateNode::OptionalFragment(n) => n.location,
            TemplateNode::LoopFragment(n) => n.location,
            TemplateNode::Doctype(n) => n.location,
        }
    }

    pub fn loop_context(&self) -> Option<&LoopContext> {
        match self {
            TemplateNode::Element(n) => n.loop_context.as_ref(),
            TemplateNode::Text(n) => n.loop_context.as_ref(),
            TemplateNode::Expression(n) => n.loop_context.as_ref(),
            TemplateNode::Component(n) => n.loop_context.as_ref(),
            TemplateNode::Slot(n) => n.loop_context.as_ref(),
            TemplateNode::ConditionalFragment(n) => n.loop_context.as_ref(),
            TemplateNode::OptionalFragment(n) => n.loop_context.as_ref(),
            TemplateNode::LoopFragment(n) => n.loop_context.as_ref(),
            TemplateNode::Doctype(_) => None,
        }
    }

    /// True for text made only of whitespace.
    pub fn is_blank(&self) -> bool {
        matches!(self, TemplateNode::Text(t) if t.value.trim().is_empty())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum AttributeValue {
    Static(String),
    /// Id of a registered expression.
    Expression(String),
    /// Name of an event-handler function.
    Handler(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeIR {
    pub name: String,
    pub value: AttributeValue,
    #[serde(default)]
    pub location: SourceLocation,
    pub loop_context: Option<LoopContext>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE / SCRIPT / STYLE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateIR {
    pub raw: String,
    pub nodes: Vec<TemplateNode>,
    pub expressions: Vec<ExpressionIR>,
}

impl TemplateIR {
    pub fn expression(&self, id: &str) -> Option<&ExpressionIR> {
        self.expressions.iter().find(|e| e.id == id)
    }
}

/// One statement of the declarative script subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScriptStatement {
    /// `state name = value`; `head` covers the keyword through the name.
    State {
        name: String,
        value: String,
        head: TextSpan,
        span: TextSpan,
    },
    Prop {
        name: String,
        default: Option<String>,
        span: TextSpan,
    },
    Import {
        source: String,
        locals: Vec<String>,
        span: TextSpan,
    },
    Function {
        name: String,
        span: TextSpan,
    },
    /// `let`/`const`/`var`/`class`; `function` is set when the initializer
    /// is an arrow or function expression.
    Variable {
        names: Vec<String>,
        function: bool,
        span: TextSpan,
    },
    Other {
        span: TextSpan,
    },
}

impl ScriptStatement {
    pub fn span(&self) -> TextSpan {
        match self {
            ScriptStatement::State { span, .. }
            | ScriptStatement::Prop { span, .. }
            | ScriptStatement::Import { span, .. }
            | ScriptStatement::Function { span, .. }
            | ScriptStatement::Variable { span, .. }
            | ScriptStatement::Other { span } => *span,
        }
    }

    /// Name of the function this top-level statement defines, if any.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            ScriptStatement::Function { name, .. } => Some(name),
            ScriptStatement::Variable {
                names,
                function: true,
                ..
            } => names.first().map(String::as_str),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptBlock {
    pub index: usize,
    pub raw: String,
    pub attributes: IndexMap<String, String>,
    /// Location of the first byte of `raw` in the source file.
    pub location: SourceLocation,
    /// Set for handler functions lifted out of the template.
    #[serde(default)]
    pub synthetic: bool,
    /// File the block was written in, when it differs from the page.
    #[serde(default)]
    pub source_file: Option<String>,
    pub statements: Vec<ScriptStatement>,
}

impl ScriptBlock {
    pub fn location_of(&self, offset: usize) -> SourceLocation {
        let end = offset.min(self.raw.len());
        self.location.advance(&self.raw[..end])
    }

    pub fn line_text(&self, offset: usize) -> String {
        let end = offset.min(self.raw.len());
        let start = self.raw[..end].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let stop = self.raw[end..]
            .find('\n')
            .map(|i| end + i)
            .unwrap_or(self.raw.len());
        self.raw[start..stop].trim().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDeclarationInfo {
    pub name: String,
    pub value: String,
    pub script_index: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropDeclaration {
    pub name: String,
    pub default: Option<String>,
    pub script_index: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDeclaration {
    pub source: String,
    pub code: String,
    pub locals: Vec<String>,
    pub script_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ScriptIR {
    pub blocks: Vec<ScriptBlock>,
    pub states: IndexMap<String, StateDeclarationInfo>,
    pub props: IndexMap<String, PropDeclaration>,
    pub imports: Vec<ImportDeclaration>,
    pub functions: Vec<String>,
    pub variables: Vec<String>,
}

impl ScriptIR {
    /// Every name a script block declares at top level, imports excluded.
    pub fn top_level_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.keys().cloned().collect();
        for name in self.functions.iter().chain(self.variables.iter()) {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    pub fn import_locals(&self) -> Vec<String> {
        self.imports
            .iter()
            .flat_map(|i| i.locals.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleIR {
    pub raw: String,
    /// `<style global>` is never scoped.
    #[serde(default)]
    pub global: bool,
    /// Component whose rules are prefixed with its marker selector.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZenIR {
    pub file_path: String,
    pub template: TemplateIR,
    pub script: Option<ScriptIR>,
    pub styles: Vec<StyleIR>,
}

impl ZenIR {
    pub fn states(&self) -> Vec<String> {
        self.script
            .as_ref()
            .map(|s| s.states.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn props(&self) -> Vec<String> {
        self.script
            .as_ref()
            .map(|s| s.props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_inner_shadows_outer() {
        let outer = LoopContext::new(vec!["item".into(), "i".into()], Some("expr_0".into()));
        let inner = LoopContext::new(vec!["item".into()], Some("expr_3".into()));
        let merged = LoopContext::merge(Some(&outer), Some(&inner)).unwrap();
        assert_eq!(merged.variables, vec!["i".to_string(), "item".to_string()]);
        assert_eq!(merged.map_source.as_deref(), Some("expr_3"));
    }

    #[test]
    fn test_merge_with_missing_side() {
        let outer = LoopContext::new(vec!["row".into()], None);
        assert_eq!(LoopContext::merge(Some(&outer), None), Some(outer.clone()));
        assert_eq!(LoopContext::merge(None, None), None);
    }

    #[test]
    fn test_location_advance() {
        let start = SourceLocation::new(3, 5);
        assert_eq!(start.advance("abc"), SourceLocation::new(3, 8));
        assert_eq!(start.advance("ab\ncd"), SourceLocation::new(4, 3));
    }

    #[test]
    fn test_attribute_value_serialization() {
        let json = serde_json::to_string(&AttributeValue::Handler("save".into())).unwrap();
        assert_eq!(json, r#"{"kind":"handler","value":"save"}"#);
    }
}
