//! Fragment lowering.
//!
//! Template expressions whose value is markup are replaced by structured
//! nodes: `cond ? <A/> : <B/>` becomes a conditional fragment, `cond && <A/>`
//! an optional fragment, and `list.map((item, i) => <li/>)` a loop fragment.
//! Anything else stays an expression node.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    CallExpression, Expression, FormalParameters, FunctionBody, JSXAttributeItem,
    JSXAttributeName, JSXAttributeValue, JSXChild, JSXElement, JSXElementName, JSXMemberExpression,
    JSXMemberExpressionObject, Statement,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, Span};
use oxc_syntax::operator::LogicalOperator;

use crate::ir::{
    AttributeValue, ComponentNode, ConditionalFragmentNode, ElementNode, ExpressionNode,
    LoopContext, LoopFragmentNode, OptionalFragmentNode, SlotNode, SourceLocation, TemplateNode,
    TextNode,
};
use crate::parse::{is_component_tag, AttributeInput, ParseContext};
use crate::renamer::{is_identifier, source_type, unwrap_parens};
use crate::validate::CompileResult;

/// Cheap pre-check before parsing: does the code contain a JSX tag?
pub fn contains_jsx(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.windows(2).any(|w| {
        w[0] == b'<' && (w[1].is_ascii_alphabetic() || w[1] == b'>')
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRAGMENT LOWERING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn lower_fragments(
    nodes: Vec<TemplateNode>,
    ctx: &mut ParseContext,
) -> CompileResult<Vec<TemplateNode>> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        out.extend(lower_node(node, ctx)?);
    }
    Ok(out)
}

fn lower_node(node: TemplateNode, ctx: &mut ParseContext) -> CompileResult<Vec<TemplateNode>> {
    Ok(match node {
        TemplateNode::Expression(expr) => return lower_expression_node(expr, ctx),
        TemplateNode::Element(mut el) => {
            el.children = lower_fragments(el.children, ctx)?;
            vec![TemplateNode::Element(el)]
        }
        TemplateNode::Component(mut comp) => {
            comp.children = lower_fragments(comp.children, ctx)?;
            vec![TemplateNode::Component(comp)]
        }
        TemplateNode::Slot(mut slot) => {
            slot.fallback = lower_fragments(slot.fallback, ctx)?;
            vec![TemplateNode::Slot(slot)]
        }
        other => vec![other],
    })
}

fn lower_expression_node(
    node: ExpressionNode,
    ctx: &mut ParseContext,
) -> CompileResult<Vec<TemplateNode>> {
    let expr = match ctx.expression(&node.expr_id) {
        Some(expr) if contains_jsx(&expr.code) => expr.clone(),
        _ => return Ok(vec![TemplateNode::Expression(node)]),
    };

    let allocator = Allocator::default();
    let parsed = match Parser::new(&allocator, &expr.code, source_type()).parse_expression() {
        Ok(parsed) => parsed,
        Err(_) => return Ok(vec![TemplateNode::Expression(node)]),
    };
    let lowered = FragmentLowerer {
        ctx: &mut *ctx,
        code: &expr.code,
        base: expr.location,
    }
    .lower(&parsed, node.loop_context.as_ref())?;

    match lowered {
        Some(nodes) => {
            ctx.discard(&node.expr_id);
            Ok(nodes)
        }
        None => Ok(vec![TemplateNode::Expression(node)]),
    }
}

/// Converts one parsed expression. Sub-expressions are registered with the
/// context using their source text.
struct FragmentLowerer<'c, 's> {
    ctx: &'c mut ParseContext,
    code: &'s str,
    base: SourceLocation,
}

impl<'c, 's> FragmentLowerer<'c, 's> {
    fn source(&self, span: Span) -> &'s str {
        &self.code[span.start as usize..span.end as usize]
    }

    fn location(&self, span: Span) -> SourceLocation {
        self.base.advance(&self.code[..span.start as usize])
    }

    fn register(
        &mut self,
        span: Span,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<String> {
        let location = self.location(span);
        let code = self.source(span);
        self.ctx.register(code, location, loop_context)
    }

    fn expression_node(
        &mut self,
        span: Span,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<TemplateNode> {
        let expr_id = self.register(span, loop_context)?;
        Ok(TemplateNode::Expression(ExpressionNode {
            expr_id,
            location: self.location(span),
            loop_context: loop_context.cloned(),
        }))
    }

    fn has_jsx(&self, expr: &Expression) -> bool {
        contains_jsx(self.source(expr.span()))
    }

    /// `None` when the expression has no markup shape to lower.
    fn lower(
        &mut self,
        expr: &Expression,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<Option<Vec<TemplateNode>>> {
        let expr = unwrap_parens(expr);
        let location = self.location(expr.span());
        match expr {
            Expression::JSXElement(el) => Ok(Some(vec![self.element(el, loop_context)?])),
            Expression::JSXFragment(frag) => {
                Ok(Some(self.children(&frag.children, loop_context)?))
            }
            Expression::ConditionalExpression(cond)
                if self.has_jsx(&cond.consequent) || self.has_jsx(&cond.alternate) =>
            {
                let condition = self.register(cond.test.span(), loop_context)?;
                let consequent = self.branch(&cond.consequent, loop_context)?;
                let alternate = self.branch(&cond.alternate, loop_context)?;
                Ok(Some(vec![TemplateNode::ConditionalFragment(
                    ConditionalFragmentNode {
                        condition,
                        consequent,
                        alternate,
                        location,
                        loop_context: loop_context.cloned(),
                    },
                )]))
            }
            Expression::LogicalExpression(logical)
                if logical.operator == LogicalOperator::And && self.has_jsx(&logical.right) =>
            {
                let condition = self.register(logical.left.span(), loop_context)?;
                let fragment = self.branch(&logical.right, loop_context)?;
                Ok(Some(vec![TemplateNode::OptionalFragment(
                    OptionalFragmentNode {
                        condition,
                        fragment,
                        location,
                        loop_context: loop_context.cloned(),
                    },
                )]))
            }
            Expression::CallExpression(call) => Ok(self
                .loop_fragment(call, loop_context)?
                .map(|node| vec![node])),
            _ => Ok(None),
        }
    }

    /// A conditional branch: markup is lowered, empty values render nothing,
    /// anything else becomes an expression node.
    fn branch(
        &mut self,
        expr: &Expression,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<Vec<TemplateNode>> {
        if let Some(nodes) = self.lower(expr, loop_context)? {
            return Ok(nodes);
        }
        let empty = match unwrap_parens(expr) {
            Expression::NullLiteral(_) => true,
            Expression::BooleanLiteral(b) => !b.value,
            Expression::StringLiteral(s) => s.value.is_empty(),
            Expression::Identifier(id) => id.name == "undefined",
            _ => false,
        };
        if empty {
            return Ok(Vec::new());
        }
        Ok(vec![self.expression_node(expr.span(), loop_context)?])
    }

    fn simple_params(&self, params: &FormalParameters) -> Option<Vec<String>> {
        if params.rest.is_some() || params.items.is_empty() || params.items.len() > 2 {
            return None;
        }
        params
            .items
            .iter()
            .map(|param| {
                let text = self.source(param.span);
                let name = text.split(':').next().unwrap_or(text).trim();
                is_identifier(name).then(|| name.to_string())
            })
            .collect()
    }

    fn returned_expression<'b, 'a>(body: &'b FunctionBody<'a>) -> Option<&'b Expression<'a>> {
        match &body.statements[..] {
            [Statement::ReturnStatement(ret)] => ret.argument.as_ref(),
            _ => None,
        }
    }

    /// `source.map((item, index) => markup)` with plain identifier params.
    fn loop_fragment(
        &mut self,
        call: &CallExpression,
        outer: Option<&LoopContext>,
    ) -> CompileResult<Option<TemplateNode>> {
        let member = match unwrap_parens(&call.callee) {
            Expression::StaticMemberExpression(member) if member.property.name == "map" => member,
            _ => return Ok(None),
        };
        let callback = match call.arguments.first().and_then(|a| a.as_expression()) {
            Some(callback) => unwrap_parens(callback),
            None => return Ok(None),
        };
        let (params, body) = match callback {
            Expression::ArrowFunctionExpression(arrow) => {
                let body = if arrow.expression {
                    match arrow.body.statements.first() {
                        Some(Statement::ExpressionStatement(stmt)) => Some(&stmt.expression),
                        _ => None,
                    }
                } else {
                    Self::returned_expression(&arrow.body)
                };
                (self.simple_params(&arrow.params), body)
            }
            Expression::FunctionExpression(func) => (
                self.simple_params(&func.params),
                func.body.as_ref().and_then(|b| Self::returned_expression(b)),
            ),
            _ => return Ok(None),
        };
        let (params, body) = match (params, body) {
            (Some(params), Some(body)) if self.has_jsx(body) => (params, body),
            _ => return Ok(None),
        };

        let source = self.register(member.object.span(), outer)?;
        let item_var = params[0].clone();
        let index_var = params.get(1).cloned();
        let inner = LoopContext::merge(
            outer,
            Some(&LoopContext::new(params.clone(), Some(source.clone()))),
        );
        let mut body_nodes = self.branch(body, inner.as_ref())?;
        let key = self.take_key(&mut body_nodes, inner.as_ref())?;

        Ok(Some(TemplateNode::LoopFragment(LoopFragmentNode {
            source,
            item_var,
            index_var,
            key,
            body: body_nodes,
            location: self.location(call.span),
            loop_context: inner,
        })))
    }

    /// Removes `key` from a single-root loop body and returns its expression.
    fn take_key(
        &mut self,
        body: &mut [TemplateNode],
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<Option<String>> {
        let attributes = match body {
            [TemplateNode::Element(el)] => &mut el.attributes,
            [TemplateNode::Component(comp)] => &mut comp.attributes,
            _ => return Ok(None),
        };
        let pos = match attributes.iter().position(|a| a.name == "key") {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let attr = attributes.remove(pos);
        Ok(Some(match attr.value {
            AttributeValue::Expression(id) => id,
            AttributeValue::Static(value) | AttributeValue::Handler(value) => {
                let literal = serde_json::to_string(&value).unwrap_or_default();
                self.ctx.register(&literal, attr.location, loop_context)?
            }
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // JSX CONVERSION
    // ═══════════════════════════════════════════════════════════════════════════

    fn element(
        &mut self,
        el: &JSXElement,
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<TemplateNode> {
        let tag = get_tag_name(&el.opening_element.name);
        let location = self.location(el.span);
        let children = self.children(&el.children, loop_context)?;

        if tag.eq_ignore_ascii_case("slot") {
            let name = el.opening_element.attributes.iter().find_map(|item| match item {
                JSXAttributeItem::Attribute(attr) => match (&attr.name, &attr.value) {
                    (JSXAttributeName::Identifier(id), Some(JSXAttributeValue::StringLiteral(s)))
                        if id.name == "name" =>
                    {
                        Some(s.value.to_string())
                    }
                    _ => None,
                },
                _ => None,
            });
            return Ok(TemplateNode::Slot(SlotNode {
                name,
                fallback: children,
                location,
                loop_context: loop_context.cloned(),
            }));
        }

        let is_component = is_component_tag(&tag);
        let mut attributes = Vec::new();
        for item in &el.opening_element.attributes {
            let attr = match item {
                JSXAttributeItem::Attribute(attr) => attr,
                JSXAttributeItem::SpreadAttribute(spread) => {
                    tracing::warn!(
                        file = %self.ctx.file_path,
                        spread = self.source(spread.span),
                        "spread attributes are not supported in template markup"
                    );
                    continue;
                }
            };
            let name = match &attr.name {
                JSXAttributeName::Identifier(id) => id.name.to_string(),
                JSXAttributeName::NamespacedName(ns) => {
                    format!("{}:{}", ns.namespace.name, ns.name.name)
                }
            };
            let input = match &attr.value {
                None => AttributeInput::Static(String::new()),
                Some(JSXAttributeValue::StringLiteral(s)) => {
                    AttributeInput::Static(s.value.to_string())
                }
                Some(JSXAttributeValue::ExpressionContainer(container)) => {
                    match container.expression.as_expression() {
                        Some(expr) => AttributeInput::Code(self.source(expr.span()).to_string()),
                        None => continue,
                    }
                }
                Some(JSXAttributeValue::Element(inner)) => {
                    AttributeInput::Code(self.source(inner.span).to_string())
                }
                Some(JSXAttributeValue::Fragment(inner)) => {
                    AttributeInput::Code(self.source(inner.span).to_string())
                }
            };
            let at = self.location(attr.span);
            attributes.push(self.ctx.convert_attribute(
                &name,
                input,
                is_component,
                at,
                loop_context,
            )?);
        }

        Ok(if is_component {
            TemplateNode::Component(ComponentNode {
                name: tag,
                attributes,
                children,
                location,
                loop_context: loop_context.cloned(),
            })
        } else {
            TemplateNode::Element(ElementNode {
                tag,
                attributes,
                children,
                location,
                loop_context: loop_context.cloned(),
            })
        })
    }

    fn children(
        &mut self,
        children: &[JSXChild],
        loop_context: Option<&LoopContext>,
    ) -> CompileResult<Vec<TemplateNode>> {
        let mut nodes = Vec::new();
        for child in children {
            match child {
                JSXChild::Text(text) => {
                    let value = text.value.as_str();
                    let value = if value.contains('\n') { value.trim() } else { value };
                    if value.is_empty() {
                        continue;
                    }
                    let value = if value.trim().is_empty() { " " } else { value };
                    nodes.push(TemplateNode::Text(TextNode {
                        value: value.to_string(),
                        location: self.location(text.span),
                        loop_context: loop_context.cloned(),
                    }));
                }
                JSXChild::Element(el) => nodes.push(self.element(el, loop_context)?),
                JSXChild::Fragment(frag) => {
                    nodes.extend(self.children(&frag.children, loop_context)?)
                }
                JSXChild::ExpressionContainer(container) => {
                    if let Some(expr) = container.expression.as_expression() {
                        match self.lower(expr, loop_context)? {
                            Some(lowered) => nodes.extend(lowered),
                            None => nodes.push(self.expression_node(expr.span(), loop_context)?),
                        }
                    }
                }
                JSXChild::Spread(spread) => {
                    nodes.push(self.expression_node(spread.expression.span(), loop_context)?)
                }
            }
        }
        Ok(nodes)
    }
}

pub fn get_tag_name(name: &JSXElementName) -> String {
    match name {
        JSXElementName::Identifier(id) => id.name.to_string(),
        JSXElementName::IdentifierReference(id) => id.name.to_string(),
        JSXElementName::NamespacedName(ns) => format!("{}:{}", ns.namespace.name, ns.name.name),
        JSXElementName::MemberExpression(member) => get_member_name(member),
        JSXElementName::ThisExpression(_) => "this".to_string(),
    }
}

fn get_member_name(member: &JSXMemberExpression) -> String {
    let object = match &member.object {
        JSXMemberExpressionObject::IdentifierReference(id) => id.name.to_string(),
        JSXMemberExpressionObject::MemberExpression(inner) => get_member_name(inner),
        JSXMemberExpressionObject::ThisExpression(_) => "this".to_string(),
    };
    format!("{}.{}", object, member.property.name)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
