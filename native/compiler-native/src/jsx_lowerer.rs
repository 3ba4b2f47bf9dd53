//! JSX lowering for expression code.
//!
//! Markup left inside an expression after fragment lowering (for example a
//! `.map` with destructured parameters) is rewritten into explicit element
//! construction calls: `__zenith.h(tag, attributes, children)` and
//! `__zenith.fragment(children)`. Only the JSX spans are replaced; the rest
//! of the expression text is kept as written.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Expression, JSXAttributeItem, JSXAttributeName, JSXAttributeValue, JSXChild, JSXElement,
    JSXFragment,
};
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::{GetSpan, Span};

use crate::renamer::{apply_edits, source_type, unwrap_parens};
use crate::transform::{contains_jsx, get_tag_name};

// ═══════════════════════════════════════════════════════════════════════════════
// JSX SPAN COLLECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Outermost JSX elements and fragments; nested markup is handled when the
/// enclosing span is converted.
#[derive(Default)]
struct JsxSpanCollector {
    spans: Vec<Span>,
}

impl<'a> Visit<'a> for JsxSpanCollector {
    fn visit_jsx_element(&mut self, el: &JSXElement<'a>) {
        self.spans.push(el.span);
    }

    fn visit_jsx_fragment(&mut self, frag: &JSXFragment<'a>) {
        self.spans.push(frag.span);
    }
}

/// Rewrites every JSX construct in `code` into `__zenith` calls. Code
/// without markup is returned unchanged.
pub fn lower_jsx(code: &str) -> Result<String, String> {
    if !contains_jsx(code) {
        return Ok(code.to_string());
    }
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, code, source_type())
        .parse_expression()
        .map_err(|errors| format!("{:?}", errors))?;

    let mut collector = JsxSpanCollector::default();
    collector.visit_expression(&expr);

    let mut edits = Vec::with_capacity(collector.spans.len());
    for span in collector.spans {
        let (start, end) = (span.start as usize, span.end as usize);
        edits.push((start, end, lower_markup(&code[start..end])?));
    }
    Ok(apply_edits(code, edits))
}

/// Converts source text that is exactly one JSX element or fragment.
fn lower_markup(markup: &str) -> Result<String, String> {
    let allocator = Allocator::default();
    let expr = Parser::new(&allocator, markup, source_type())
        .parse_expression()
        .map_err(|errors| format!("{:?}", errors))?;
    let lowerer = JsxLowerer { code: markup };
    match unwrap_parens(&expr) {
        Expression::JSXElement(el) => lowerer.element(el),
        Expression::JSXFragment(frag) => lowerer.fragment(frag),
        _ => Ok(markup.to_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JSX LOWERER
// ═══════════════════════════════════════════════════════════════════════════════

struct JsxLowerer<'s> {
    code: &'s str,
}

impl<'s> JsxLowerer<'s> {
    fn source(&self, span: Span) -> &'s str {
        &self.code[span.start as usize..span.end as usize]
    }

    fn embedded(&self, span: Span) -> Result<String, String> {
        lower_jsx(self.source(span))
    }

    fn element(&self, el: &JSXElement) -> Result<String, String> {
        let tag = get_tag_name(&el.opening_element.name);

        let mut props = Vec::new();
        for item in &el.opening_element.attributes {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let name = match &attr.name {
                        JSXAttributeName::Identifier(id) => id.name.to_string(),
                        JSXAttributeName::NamespacedName(ns) => {
                            format!("{}:{}", ns.namespace.name, ns.name.name)
                        }
                    };
                    let value = match &attr.value {
                        None => "true".to_string(),
                        Some(JSXAttributeValue::StringLiteral(s)) => json_string(&s.value),
                        Some(JSXAttributeValue::ExpressionContainer(container)) => {
                            match container.expression.as_expression() {
                                Some(expr) => self.embedded(expr.span())?,
                                None => "undefined".to_string(),
                            }
                        }
                        Some(JSXAttributeValue::Element(inner)) => self.element(inner)?,
                        Some(JSXAttributeValue::Fragment(inner)) => self.fragment(inner)?,
                    };
                    props.push(format!("{}: {}", json_string(&name), value));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    props.push(format!("...({})", self.embedded(spread.argument.span())?));
                }
            }
        }
        let props = if props.is_empty() {
            "null".to_string()
        } else {
            format!("{{ {} }}", props.join(", "))
        };

        Ok(format!(
            "__zenith.h({}, {}, {})",
            json_string(&tag),
            props,
            self.children(&el.children)?
        ))
    }

    fn fragment(&self, frag: &JSXFragment) -> Result<String, String> {
        Ok(format!("__zenith.fragment({})", self.children(&frag.children)?))
    }

    fn children(&self, children: &[JSXChild]) -> Result<String, String> {
        let mut out = Vec::new();
        for child in children {
            match child {
                JSXChild::Text(t) => {
                    let text = t.value.trim();
                    if !text.is_empty() {
                        out.push(json_string(text));
                    }
                }
                JSXChild::Element(el) => out.push(self.element(el)?),
                JSXChild::Fragment(frag) => out.push(self.fragment(frag)?),
                JSXChild::ExpressionContainer(container) => {
                    if let Some(expr) = container.expression.as_expression() {
                        out.push(self.embedded(expr.span())?);
                    }
                }
                JSXChild::Spread(spread) => {
                    out.push(format!("...({})", self.embedded(spread.expression.span())?));
                }
            }
        }
        Ok(if out.is_empty() {
            "null".to_string()
        } else {
            format!("[{}]", out.join(", "))
        })
    }
}

fn json_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
