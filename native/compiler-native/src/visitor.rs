use crate::ir::{
    AttributeIR, ComponentNode, ConditionalFragmentNode, DoctypeNode, ElementNode, ExpressionNode,
    LoopFragmentNode, OptionalFragmentNode, SlotNode, TemplateNode, TextNode,
};

/// Read-only traversal over a template tree. Override the hooks you need;
/// the defaults walk every child list in document order.
pub trait TemplateVisitor {
    fn visit_node(&mut self, node: &TemplateNode) {
        walk_node(self, node);
    }

    fn visit_element(&mut self, element: &ElementNode) {
        for attribute in &element.attributes {
            self.visit_attribute(attribute);
        }
        walk_nodes(self, &element.children);
    }

    fn visit_component(&mut self, component: &ComponentNode) {
        for attribute in &component.attributes {
            self.visit_attribute(attribute);
        }
        walk_nodes(self, &component.children);
    }

    fn visit_slot(&mut self, slot: &SlotNode) {
        walk_nodes(self, &slot.fallback);
    }

    fn visit_attribute(&mut self, _attribute: &AttributeIR) {}

    fn visit_text(&mut self, _text: &TextNode) {}

    fn visit_expression(&mut self, _expression: &ExpressionNode) {}

    fn visit_doctype(&mut self, _doctype: &DoctypeNode) {}

    fn visit_conditional(&mut self, fragment: &ConditionalFragmentNode) {
        walk_nodes(self, &fragment.consequent);
        walk_nodes(self, &fragment.alternate);
    }

    fn visit_optional(&mut self, fragment: &OptionalFragmentNode) {
        walk_nodes(self, &fragment.fragment);
    }

    fn visit_loop(&mut self, fragment: &LoopFragmentNode) {
        walk_nodes(self, &fragment.body);
    }
}

pub fn walk_nodes<V: TemplateVisitor + ?Sized>(visitor: &mut V, nodes: &[TemplateNode]) {
    for node in nodes {
        visitor.visit_node(node);
    }
}

pub fn walk_node<V: TemplateVisitor + ?Sized>(visitor: &mut V, node: &TemplateNode) {
    match node {
        TemplateNode::Element(n) => visitor.visit_element(n),
        TemplateNode::Text(n) => visitor.visit_text(n),
        TemplateNode::Expression(n) => visitor.visit_expression(n),
        TemplateNode::Component(n) => visitor.visit_component(n),
        TemplateNode::Slot(n) => visitor.visit_slot(n),
        TemplateNode::ConditionalFragment(n) => visitor.visit_conditional(n),
        TemplateNode::OptionalFragment(n) => visitor.visit_optional(n),
        TemplateNode::LoopFragment(n) => visitor.visit_loop(n),
        TemplateNode::Doctype(n) => visitor.visit_doctype(n),
    }
}

/// Collects every expression id the tree references, in document order.
#[derive(Default)]
pub struct ExpressionIdCollector {
    pub ids: Vec<String>,
}

impl TemplateVisitor for ExpressionIdCollector {
    fn visit_attribute(&mut self, attribute: &AttributeIR) {
        if let crate::ir::AttributeValue::Expression(id) = &attribute.value {
            self.ids.push(id.clone());
        }
    }

    fn visit_expression(&mut self, expression: &ExpressionNode) {
        self.ids.push(expression.expr_id.clone());
    }

    fn visit_conditional(&mut self, fragment: &ConditionalFragmentNode) {
        self.ids.push(fragment.condition.clone());
        walk_nodes(self, &fragment.consequent);
        walk_nodes(self, &fragment.alternate);
    }

    fn visit_optional(&mut self, fragment: &OptionalFragmentNode) {
        self.ids.push(fragment.condition.clone());
        walk_nodes(self, &fragment.fragment);
    }

    fn visit_loop(&mut self, fragment: &LoopFragmentNode) {
        self.ids.push(fragment.source.clone());
        if let Some(key) = &fragment.key {
            self.ids.push(key.clone());
        }
        walk_nodes(self, &fragment.body);
    }
}

/// Collects the handler names bound through `data-zen-<event>` attributes.
#[derive(Default)]
pub struct HandlerCollector {
    pub handlers: Vec<String>,
}

impl TemplateVisitor for HandlerCollector {
    fn visit_attribute(&mut self, attribute: &AttributeIR) {
        if let crate::ir::AttributeValue::Handler(name) = &attribute.value {
            if !self.handlers.contains(name) {
                self.handlers.push(name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AttributeValue, SourceLocation};

    fn element(tag: &str, attributes: Vec<AttributeIR>, children: Vec<TemplateNode>) -> TemplateNode {
        TemplateNode::Element(ElementNode {
            tag: tag.into(),
            attributes,
            children,
            location: SourceLocation::default(),
            loop_context: None,
        })
    }

    fn attr(name: &str, value: AttributeValue) -> AttributeIR {
        AttributeIR {
            name: name.into(),
            value,
            location: SourceLocation::default(),
            loop_context: None,
        }
    }

    #[test]
    fn test_collectors_walk_in_document_order() {
        let tree = vec![element(
            "div",
            vec![attr("class", AttributeValue::Expression("expr_0".into()))],
            vec![
                element(
                    "button",
                    vec![attr("data-zen-click", AttributeValue::Handler("save".into()))],
                    vec![TemplateNode::Expression(ExpressionNode {
                        expr_id: "expr_1".into(),
                        location: SourceLocation::default(),
                        loop_context: None,
                    })],
                ),
                element(
                    "button",
                    vec![attr("data-zen-click", AttributeValue::Handler("save".into()))],
                    vec![],
                ),
            ],
        )];

        let mut ids = ExpressionIdCollector::default();
        walk_nodes(&mut ids, &tree);
        assert_eq!(ids.ids, vec!["expr_0", "expr_1"]);

        let mut handlers = HandlerCollector::default();
        walk_nodes(&mut handlers, &tree);
        assert_eq!(handlers.handlers, vec!["save"]);
    }
}
