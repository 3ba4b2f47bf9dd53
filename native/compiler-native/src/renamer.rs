//! Identifier analysis and span-based rewriting of expressions and scripts.
//!
//! oxc is used only to locate identifiers: references, top-level bindings,
//! shorthand properties and `object.property` accesses. Rewrites are applied
//! to the original source text by span, in reverse order, so everything the
//! rewrite does not touch stays byte-identical.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, AssignmentExpression, AssignmentTarget, BindingIdentifier,
    Expression, Function, IdentifierReference, JSXElementName, ObjectProperty,
    SimpleAssignmentTarget, StaticMemberExpression, UpdateExpression,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_syntax::scope::ScopeFlags;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::ir::{ScriptBlock, TextSpan};
use crate::script::blank_declaration_keywords;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref RESERVED: HashSet<&'static str> = [
        "true", "false", "null", "undefined", "this", "new", "typeof", "void", "delete",
        "function", "class", "return", "if", "else", "for", "while", "do", "var", "let",
        "const", "in", "of", "instanceof", "yield", "await", "async", "super", "import",
        "export", "default", "switch", "case", "break", "continue", "throw", "try", "catch",
        "finally", "with", "debugger", "enum",
    ]
    .into_iter()
    .collect();
}

pub fn source_type() -> SourceType {
    SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true)
}

/// True for a plain identifier that is not a keyword or literal name.
pub fn is_identifier(code: &str) -> bool {
    let code = code.trim();
    IDENTIFIER_RE.is_match(code) && !RESERVED.contains(code)
}

fn to_text_span(span: Span) -> TextSpan {
    TextSpan::new(span.start as usize, span.end as usize)
}

pub fn unwrap_parens<'b, 'a>(mut expr: &'b Expression<'a>) -> &'b Expression<'a> {
    while let Expression::ParenthesizedExpression(p) = expr {
        expr = &p.expression;
    }
    expr
}

pub fn check_expression(code: &str) -> Result<(), String> {
    let allocator = Allocator::default();
    Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map(|_| ())
        .map_err(|errors| format!("{:?}", errors))
}

/// True when the expression is, after parentheses, an arrow or function
/// expression.
pub fn is_function_expression(code: &str) -> bool {
    let allocator = Allocator::default();
    match Parser::new(&allocator, code, source_type()).parse_expression() {
        Ok(expr) => matches!(
            unwrap_parens(&expr),
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_)
        ),
        Err(_) => false,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFERENCE COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// One identifier occurrence that a rewrite may target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub span: TextSpan,
    /// `{ name }` object shorthand; a rename must keep the key.
    pub shorthand: bool,
    /// Declaration site of a top-level script binding rather than a use.
    pub binding: bool,
    /// Set when the reference is the object of `name.property`: the
    /// property name and the span of the whole member expression.
    pub member: Option<(String, TextSpan)>,
    /// Target of an assignment or update, either `name` itself or, with
    /// `member` set, `name.property`.
    pub write: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Replace the identifier.
    Name(String),
    /// Replace the whole `name.property` expression.
    Member(String),
}

#[derive(Default)]
struct ReferenceCollector {
    frames: Vec<TextSpan>,
    bindings: Vec<(String, TextSpan)>,
    references: Vec<(String, TextSpan)>,
    shorthand: HashSet<usize>,
    members: HashMap<usize, (String, TextSpan)>,
    writes: HashSet<usize>,
}

/// Start offset of the identifier written by `target`, for `name` and
/// `name.property` targets.
fn simple_target_start(target: &SimpleAssignmentTarget<'_>) -> Option<usize> {
    match target {
        SimpleAssignmentTarget::AssignmentTargetIdentifier(ident) => Some(ident.span.start as usize),
        SimpleAssignmentTarget::StaticMemberExpression(member) => match &member.object {
            Expression::Identifier(object) => Some(object.span.start as usize),
            _ => None,
        },
        _ => None,
    }
}

impl<'a> Visit<'a> for ReferenceCollector {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        self.references
            .push((ident.name.to_string(), to_text_span(ident.span)));
    }

    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.bindings
            .push((ident.name.to_string(), to_text_span(ident.span)));
    }

    fn visit_function(&mut self, func: &Function<'a>, flags: ScopeFlags) {
        // The function's own name sits outside its frame.
        self.frames.push(TextSpan::new(
            func.params.span.start as usize,
            func.span.end as usize,
        ));
        walk::walk_function(self, func, flags);
    }

    fn visit_arrow_function_expression(&mut self, func: &ArrowFunctionExpression<'a>) {
        self.frames.push(to_text_span(func.span));
        walk::walk_arrow_function_expression(self, func);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            self.shorthand.insert(prop.value.span().start as usize);
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_static_member_expression(&mut self, member: &StaticMemberExpression<'a>) {
        if let Expression::Identifier(object) = &member.object {
            self.members.insert(
                object.span.start as usize,
                (member.property.name.to_string(), to_text_span(member.span)),
            );
        }
        walk::walk_static_member_expression(self, member);
    }

    fn visit_assignment_expression(&mut self, expr: &AssignmentExpression<'a>) {
        let target = match &expr.left {
            AssignmentTarget::AssignmentTargetIdentifier(ident) => Some(ident.span.start as usize),
            AssignmentTarget::StaticMemberExpression(member) => match &member.object {
                Expression::Identifier(object) => Some(object.span.start as usize),
                _ => None,
            },
            _ => None,
        };
        self.writes.extend(target);
        walk::walk_assignment_expression(self, expr);
    }

    fn visit_update_expression(&mut self, expr: &UpdateExpression<'a>) {
        self.writes.extend(simple_target_start(&expr.argument));
        walk::walk_update_expression(self, expr);
    }

    // Tag names are not variable references.
    fn visit_jsx_element_name(&mut self, _name: &JSXElementName<'a>) {}
}

impl ReferenceCollector {
    fn innermost_frame(&self, at: usize) -> Option<TextSpan> {
        self.frames
            .iter()
            .filter(|f| f.contains(at))
            .min_by_key(|f| f.end - f.start)
            .copied()
    }

    fn is_shadowed(&self, name: &str, at: usize) -> bool {
        self.bindings.iter().any(|(bound, span)| {
            bound == name
                && self
                    .innermost_frame(span.start)
                    .map_or(false, |frame| frame.contains(at))
        })
    }

    /// Free references, plus top-level bindings when `program` is set.
    fn finish(self, program: bool) -> Vec<Reference> {
        let mut out: Vec<Reference> = self
            .references
            .iter()
            .filter(|(name, span)| !self.is_shadowed(name, span.start))
            .map(|(name, span)| Reference {
                name: name.clone(),
                span: *span,
                shorthand: self.shorthand.contains(&span.start),
                binding: false,
                member: self.members.get(&span.start).cloned(),
                write: self.writes.contains(&span.start),
            })
            .collect();
        if program {
            for (name, span) in &self.bindings {
                if self.innermost_frame(span.start).is_none() {
                    out.push(Reference {
                        name: name.clone(),
                        span: *span,
                        shorthand: false,
                        binding: true,
                        member: None,
                        write: false,
                    });
                }
            }
        }
        out.sort_by_key(|r| r.span.start);
        out
    }
}

/// Free identifier references of a template expression, in source order.
pub fn expression_references(code: &str) -> Result<Vec<Reference>, String> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| format!("{:?}", errors))?;
    let mut collector = ReferenceCollector::default();
    collector.visit_expression(&expr);
    Ok(collector.finish(false))
}

/// Free references and top-level bindings of a whole program.
pub fn program_references(src: &str) -> Result<Vec<Reference>, String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, src, source_type()).parse();
    if let Some(error) = ret.errors.first() {
        return Err(format!("{:?}", error));
    }
    let mut collector = ReferenceCollector::default();
    collector.visit_program(&ret.program);
    Ok(collector.finish(true))
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWRITING
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies `(start, end, replacement)` edits; edits must not overlap.
pub fn apply_edits(code: &str, mut edits: Vec<(usize, usize, String)>) -> String {
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = code.to_string();
    for (start, end, replacement) in edits {
        if start <= end && end <= out.len() {
            out.replace_range(start..end, &replacement);
        }
    }
    out
}

pub fn edits_for<F>(references: &[Reference], mut decide: F) -> Vec<(usize, usize, String)>
where
    F: FnMut(&Reference) -> Option<Rewrite>,
{
    let mut edits = Vec::new();
    for reference in references {
        match decide(reference) {
            Some(Rewrite::Name(name)) => {
                let replacement = if reference.shorthand {
                    format!("{}: {}", reference.name, name)
                } else {
                    name
                };
                edits.push((reference.span.start, reference.span.end, replacement));
            }
            Some(Rewrite::Member(code)) => {
                if let Some((_, span)) = &reference.member {
                    edits.push((span.start, span.end, code));
                }
            }
            None => {}
        }
    }
    edits
}

pub fn rewrite_expression<F>(code: &str, decide: F) -> Result<String, String>
where
    F: FnMut(&Reference) -> Option<Rewrite>,
{
    let references = expression_references(code)?;
    Ok(apply_edits(code, edits_for(&references, decide)))
}

/// References of a script block, parsed with its `state`/`prop` keywords
/// blanked. Spans index into `block.raw`.
pub fn script_references(block: &ScriptBlock) -> Result<Vec<Reference>, String> {
    program_references(&blank_declaration_keywords(block))
}

/// Rewrites a script block. Edits are applied to the raw text, so the
/// `state`/`prop` keywords survive.
pub fn rewrite_script<F>(block: &ScriptBlock, decide: F) -> Result<String, String>
where
    F: FnMut(&Reference) -> Option<Rewrite>,
{
    let references = script_references(block)?;
    Ok(apply_edits(&block.raw, edits_for(&references, decide)))
}

/// Renames free references (and, in scripts, top-level bindings) by map.
pub fn rename_expression(code: &str, renames: &HashMap<String, String>) -> Result<String, String> {
    rewrite_expression(code, |r| renames.get(&r.name).cloned().map(Rewrite::Name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SourceLocation;
    use indexmap::IndexMap;

    fn renames(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect()
    }

    #[test]
    fn test_identifier_check() {
        assert!(is_identifier("save"));
        assert!(is_identifier(" $el "));
        assert!(!is_identifier("save()"));
        assert!(!is_identifier("true"));
        assert!(!is_identifier("a.b"));
    }

    #[test]
    fn test_function_expression_check() {
        assert!(is_function_expression("() => count++"));
        assert!(is_function_expression("(function (e) { go(e) })"));
        assert!(!is_function_expression("save"));
        assert!(!is_function_expression("items.map(i => i)"));
    }

    #[test]
    fn test_rename_respects_shadowing() {
        let map = renames(&[("count", "__zen_comp_0_count"), ("item", "X")]);
        let out = rename_expression("items.map(item => item + count)", &map).unwrap();
        assert_eq!(out, "items.map(item => item + __zen_comp_0_count)");
    }

    #[test]
    fn test_rename_keeps_property_names_and_shorthand() {
        let map = renames(&[("count", "c2")]);
        let out = rename_expression("({ count, total: obj.count + count })", &map).unwrap();
        assert_eq!(out, "({ count: c2, total: obj.count + c2 })");
    }

    #[test]
    fn test_member_rewrite() {
        let out = rewrite_expression("props.title + title", |r| {
            if r.name == "props" {
                r.member
                    .as_ref()
                    .map(|(p, _)| Rewrite::Member(format!("\"{}\"", p)))
            } else {
                None
            }
        })
        .unwrap();
        assert_eq!(out, "\"title\" + title");
    }

    #[test]
    fn test_jsx_tags_are_not_references() {
        let refs = expression_references("<Card title={name}>{body}</Card>").unwrap();
        let names: Vec<&str> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["name", "body"]);
    }

    #[test]
    fn test_rewrite_script_renames_bindings() {
        let raw = "state count = 0\nfunction increment() {\n  count++\n}\nconst total = () => count * 2";
        let block = crate::script::build_block(
            0,
            raw,
            IndexMap::new(),
            SourceLocation::default(),
            "c.zen",
        )
        .unwrap();
        let map = renames(&[
            ("count", "__zen_comp_0_count"),
            ("increment", "__zen_comp_0_increment"),
            ("total", "__zen_comp_0_total"),
        ]);
        let out = rewrite_script(&block, |r| map.get(&r.name).cloned().map(Rewrite::Name)).unwrap();
        assert_eq!(
            out,
            "state __zen_comp_0_count = 0\nfunction __zen_comp_0_increment() {\n  __zen_comp_0_count++\n}\nconst __zen_comp_0_total = () => __zen_comp_0_count * 2"
        );
    }

    #[test]
    fn test_writes_are_marked() {
        let refs = program_references(
            "let a = 0, b = 0, o = {}\na = 1\nb++\no.x = 2\nfunction f(a) { a = 3 }\nconsole.log(a)",
        )
        .unwrap();
        let writes: Vec<(&str, bool)> = refs
            .iter()
            .filter(|r| r.write)
            .map(|r| (r.name.as_str(), r.member.is_some()))
            .collect();
        assert_eq!(writes, vec![("a", false), ("b", false), ("o", true)]);
    }

    #[test]
    fn test_parameter_shadows_top_level_binding() {
        let raw = "const step = 1\nfunction add(step) { return step }";
        let block = crate::script::build_block(
            0,
            raw,
            IndexMap::new(),
            SourceLocation::default(),
            "c.zen",
        )
        .unwrap();
        let map = renames(&[("step", "S")]);
        let out = rewrite_script(&block, |r| map.get(&r.name).cloned().map(Rewrite::Name)).unwrap();
        assert_eq!(out, "const S = 1\nfunction add(step) { return step }");
    }
}
