use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ir::{
    AttributeIR, AttributeValue, ComponentNode, ConditionalFragmentNode, ExpressionIR,
    ExpressionNode, LoopFragmentNode, OptionalFragmentNode, SlotNode, SourceLocation, TemplateNode,
};
use crate::visitor::{walk_nodes, TemplateVisitor};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_UNBALANCED_BRACE: &str = "Z-ERR-PARSE-001";
pub const ERR_MALFORMED_MARKUP: &str = "Z-ERR-PARSE-002";
pub const ERR_UNTERMINATED_BLOCK: &str = "Z-ERR-PARSE-003";
pub const ERR_INVALID_EXPRESSION: &str = "Z-ERR-PARSE-004";
pub const ERR_INVALID_SCRIPT: &str = "Z-ERR-PARSE-005";
pub const ERR_STATE_REDECLARATION: &str = "Z-ERR-STATE-001";
pub const ERR_ILLEGAL_MUTATION: &str = "Z-ERR-STATE-002";
pub const ERR_UNDECLARED_REFERENCE: &str = "Z-ERR-SCOPE-002";
pub const ERR_FUNCTION_IN_TEMPLATE: &str = "Z-ERR-SCOPE-003";
pub const ERR_UNKNOWN_COMPONENT: &str = "Z-ERR-RESOLVE-001";
pub const ERR_UNMATCHED_SLOT: &str = "Z-ERR-RESOLVE-002";
pub const ERR_RESOLUTION_STALLED: &str = "Z-ERR-RESOLVE-003";
pub const ERR_RESOLUTION_LIMIT: &str = "Z-ERR-RESOLVE-004";
pub const ERR_IO: &str = "Z-ERR-IO-001";
pub const ERR_INTERNAL: &str = "Z-ERR-INTERNAL-001";

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR KINDS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCategory {
    Parse,
    Legality,
    Resolution,
    Io,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Parse => "PARSE_ERROR",
            ErrorCategory::Legality => "LEGALITY_ERROR",
            ErrorCategory::Resolution => "RESOLUTION_ERROR",
            ErrorCategory::Io => "IO_ERROR",
            ErrorCategory::Internal => "COMPILER_INVARIANT_VIOLATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ErrorKind {
    UnbalancedBrace,
    MalformedMarkup,
    UnterminatedBlock,
    InvalidExpression,
    InvalidScript,
    StateRedeclaration {
        name: String,
        first: SourceLocation,
        second: SourceLocation,
    },
    IllegalMutation {
        state_name: String,
        function_name: Option<String>,
        script_index: usize,
    },
    UndeclaredReference {
        name: String,
    },
    FunctionInTemplate,
    UnknownComponent {
        name: String,
    },
    UnmatchedSlot {
        component: String,
        slot: String,
    },
    ResolutionStalled,
    ResolutionLimit {
        limit: usize,
    },
    Io,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnbalancedBrace => ERR_UNBALANCED_BRACE,
            ErrorKind::MalformedMarkup => ERR_MALFORMED_MARKUP,
            ErrorKind::UnterminatedBlock => ERR_UNTERMINATED_BLOCK,
            ErrorKind::InvalidExpression => ERR_INVALID_EXPRESSION,
            ErrorKind::InvalidScript => ERR_INVALID_SCRIPT,
            ErrorKind::StateRedeclaration { .. } => ERR_STATE_REDECLARATION,
            ErrorKind::IllegalMutation { .. } => ERR_ILLEGAL_MUTATION,
            ErrorKind::UndeclaredReference { .. } => ERR_UNDECLARED_REFERENCE,
            ErrorKind::FunctionInTemplate => ERR_FUNCTION_IN_TEMPLATE,
            ErrorKind::UnknownComponent { .. } => ERR_UNKNOWN_COMPONENT,
            ErrorKind::UnmatchedSlot { .. } => ERR_UNMATCHED_SLOT,
            ErrorKind::ResolutionStalled => ERR_RESOLUTION_STALLED,
            ErrorKind::ResolutionLimit { .. } => ERR_RESOLUTION_LIMIT,
            ErrorKind::Io => ERR_IO,
            ErrorKind::Internal => ERR_INTERNAL,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorKind::UnbalancedBrace
            | ErrorKind::MalformedMarkup
            | ErrorKind::UnterminatedBlock
            | ErrorKind::InvalidExpression
            | ErrorKind::InvalidScript => ErrorCategory::Parse,
            ErrorKind::StateRedeclaration { .. }
            | ErrorKind::IllegalMutation { .. }
            | ErrorKind::UndeclaredReference { .. }
            | ErrorKind::FunctionInTemplate => ErrorCategory::Legality,
            ErrorKind::UnknownComponent { .. }
            | ErrorKind::UnmatchedSlot { .. }
            | ErrorKind::ResolutionStalled
            | ErrorKind::ResolutionLimit { .. } => ErrorCategory::Resolution,
            ErrorKind::Io => ErrorCategory::Io,
            ErrorKind::Internal => ErrorCategory::Internal,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_UNBALANCED_BRACE => "Every template expression is delimited by balanced braces.",
        ERR_MALFORMED_MARKUP => "Markup is well formed before any HTML is emitted.",
        ERR_UNTERMINATED_BLOCK => "Script and style blocks are always closed.",
        ERR_INVALID_EXPRESSION => "Template expressions are valid JavaScript expressions.",
        ERR_INVALID_SCRIPT => "Script blocks stay within the declarative subset.",
        ERR_STATE_REDECLARATION => "Each state name is declared exactly once per compiled file.",
        ERR_ILLEGAL_MUTATION => {
            "Reactive state may only be written inside event handlers."
        }
        ERR_UNDECLARED_REFERENCE => {
            "Expressions only reference declared state, props, stores or loop variables."
        }
        ERR_FUNCTION_IN_TEMPLATE => {
            "Functions are never created in template position; handlers are named."
        }
        ERR_UNKNOWN_COMPONENT => "All components are resolved at compile time.",
        ERR_UNMATCHED_SLOT => "All slot content lands in a declared slot.",
        ERR_RESOLUTION_STALLED | ERR_RESOLUTION_LIMIT => {
            "Component resolution always terminates."
        }
        ERR_IO => "Discovery only reads from the file system.",
        ERR_INTERNAL => "All bindings must reference an ID that exists in the registry.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub kind: ErrorKind,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub context: Option<String>,
    pub hints: Vec<String>,
}

pub type CompileResult<T> = std::result::Result<T, CompilerError>;

impl CompilerError {
    pub fn new(kind: ErrorKind, message: &str, file: &str, line: u32, column: u32) -> Self {
        Self::with_details(kind, message, file, line, column, None, vec![])
    }

    pub fn with_details(
        kind: ErrorKind,
        message: &str,
        file: &str,
        line: u32,
        column: u32,
        context: Option<String>,
        hints: Vec<String>,
    ) -> Self {
        let code = kind.code();
        CompilerError {
            code: code.to_string(),
            error_type: kind.category().as_str().to_string(),
            kind,
            message: message.to_string(),
            guarantee: get_guarantee(code).to_string(),
            file: file.to_string(),
            line,
            column,
            context,
            hints,
        }
    }

    pub fn at(kind: ErrorKind, message: &str, file: &str, location: SourceLocation) -> Self {
        Self::new(kind, message, file, location.line, location.column)
    }

    pub fn internal(message: &str, file: &str) -> Self {
        Self::new(ErrorKind::Internal, message, file, 1, 1)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STRUCTURAL VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

struct StructureValidator<'a> {
    file: &'a str,
    registry: HashSet<&'a str>,
    error: Option<CompilerError>,
}

impl<'a> StructureValidator<'a> {
    fn fail(&mut self, error: CompilerError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn check_id(&mut self, id: &str, what: &str, location: SourceLocation) {
        if !self.registry.contains(id) {
            self.fail(CompilerError::at(
                ErrorKind::Internal,
                &format!("{} references missing expression ID \"{}\".", what, id),
                self.file,
                location,
            ));
        }
    }
}

impl<'a> TemplateVisitor for StructureValidator<'a> {
    fn visit_component(&mut self, component: &ComponentNode) {
        self.fail(CompilerError::at(
            ErrorKind::UnknownComponent {
                name: component.name.clone(),
            },
            &format!("Unresolved component: <{}>.", component.name),
            self.file,
            component.location,
        ));
    }

    fn visit_slot(&mut self, slot: &SlotNode) {
        let name = slot.name.clone().unwrap_or_else(|| "default".to_string());
        self.fail(
            CompilerError::at(
                ErrorKind::UnmatchedSlot {
                    component: String::new(),
                    slot: name,
                },
                "<Slot/> used outside of a component or layout body.",
                self.file,
                slot.location,
            )
            .with_hint("Slots are only meaningful inside components and layouts."),
        );
    }

    fn visit_attribute(&mut self, attribute: &AttributeIR) {
        if let AttributeValue::Expression(id) = &attribute.value {
            let what = format!("Attr \"{}\"", attribute.name);
            self.check_id(id, &what, attribute.location);
        }
    }

    fn visit_expression(&mut self, expression: &ExpressionNode) {
        self.check_id(&expression.expr_id, "Text binding", expression.location);
    }

    fn visit_conditional(&mut self, fragment: &ConditionalFragmentNode) {
        self.check_id(&fragment.condition, "Condition", fragment.location);
        walk_nodes(self, &fragment.consequent);
        walk_nodes(self, &fragment.alternate);
    }

    fn visit_optional(&mut self, fragment: &OptionalFragmentNode) {
        self.check_id(&fragment.condition, "Optional condition", fragment.location);
        walk_nodes(self, &fragment.fragment);
    }

    fn visit_loop(&mut self, fragment: &LoopFragmentNode) {
        self.check_id(&fragment.source, "Loop source", fragment.location);
        if let Some(key) = &fragment.key {
            self.check_id(key, "Loop key", fragment.location);
        }
        walk_nodes(self, &fragment.body);
    }
}

/// Checks a fully resolved tree: no component or slot markers remain and
/// every referenced expression id is registered.
pub fn validate_structure(
    nodes: &[TemplateNode],
    expressions: &[ExpressionIR],
    file: &str,
) -> CompileResult<()> {
    let mut validator = StructureValidator {
        file,
        registry: expressions.iter().map(|e| e.id.as_str()).collect(),
        error: None,
    };
    walk_nodes(&mut validator, nodes);
    match validator.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ElementNode, TextNode};

    fn mock_loc() -> SourceLocation {
        SourceLocation { line: 1, column: 1 }
    }

    #[test]
    fn test_error_carries_code_and_guarantee() {
        let err = CompilerError::new(
            ErrorKind::UndeclaredReference {
                name: "missing".into(),
            },
            "Unknown identifier 'missing'.",
            "page.zen",
            4,
            9,
        );
        assert_eq!(err.code, ERR_UNDECLARED_REFERENCE);
        assert_eq!(err.category(), ErrorCategory::Legality);
        assert_eq!(err.error_type, "LEGALITY_ERROR");
        assert!(err.guarantee.contains("declared"));
        assert_eq!(
            err.to_string(),
            "[Z-ERR-SCOPE-002] Unknown identifier 'missing'. (page.zen:4:9)"
        );
    }

    #[test]
    fn test_error_survives_json_round_trip() {
        let err = CompilerError::new(
            ErrorKind::StateRedeclaration {
                name: "count".into(),
                first: SourceLocation { line: 2, column: 1 },
                second: SourceLocation { line: 7, column: 3 },
            },
            "State 'count' is declared twice.",
            "page.zen",
            7,
            3,
        )
        .with_hint("Rename one of the declarations.");

        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"stateRedeclaration\""));
        assert!(json.contains("\"name\":\"count\""));
        let back: CompilerError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_unresolved_component_rejected() {
        let nodes = vec![TemplateNode::Component(ComponentNode {
            name: "Card".into(),
            attributes: vec![],
            children: vec![],
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_structure(&nodes, &[], "page.zen").unwrap_err();
        assert_eq!(err.code, ERR_UNKNOWN_COMPONENT);
    }

    #[test]
    fn test_unregistered_expression_rejected() {
        let nodes = vec![TemplateNode::Element(ElementNode {
            tag: "p".into(),
            attributes: vec![],
            children: vec![
                TemplateNode::Text(TextNode {
                    value: "hi".into(),
                    location: mock_loc(),
                    loop_context: None,
                }),
                TemplateNode::Expression(ExpressionNode {
                    expr_id: "expr_9".into(),
                    location: mock_loc(),
                    loop_context: None,
                }),
            ],
            location: mock_loc(),
            loop_context: None,
        })];
        let err = validate_structure(&nodes, &[], "page.zen").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("expr_9"));
    }
}
