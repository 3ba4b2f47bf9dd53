#[cfg(test)]
mod tests {
    use crate::ir::{AttributeValue, SourceLocation, TemplateNode};
    use crate::parse::parse_zen_file;
    use crate::validate::ErrorKind;

    fn elements(nodes: &[TemplateNode]) -> Vec<&str> {
        nodes
            .iter()
            .filter_map(|n| match n {
                TemplateNode::Element(el) => Some(el.tag.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_multi_script_extraction() {
        let src = r#"
<script>
    state count = 1
</script>
<div></div>
<script>
    function log() { console.log(count) }
</script>
"#;
        let ir = parse_zen_file(src, "pages/index.zen").unwrap();
        let script = ir.script.as_ref().unwrap();
        assert_eq!(script.blocks.len(), 2);
        assert!(script.blocks[0].raw.contains("state count = 1"));
        assert!(script.blocks[1].raw.contains("console.log(count)"));
        assert!(script.blocks.iter().all(|b| !b.raw.contains("<div>")));
        assert_eq!(ir.states(), vec!["count"]);
        assert_eq!(script.functions, vec!["log".to_string()]);
        assert_eq!(elements(&ir.template.nodes), vec!["div"]);
    }

    #[test]
    fn test_script_with_src_stays_in_markup() {
        let ir = parse_zen_file(
            "<script src=\"/analytics.js\"></script>\n<p>hi</p>",
            "pages/index.zen",
        )
        .unwrap();
        assert!(ir.script.is_none());
        assert_eq!(elements(&ir.template.nodes), vec!["script", "p"]);
    }

    #[test]
    fn test_import_extraction() {
        let src = "<script>\nimport { format } from 'date-fns'\nimport Card from '../components/Card.zen'\n</script>\n<p>x</p>";
        let ir = parse_zen_file(src, "pages/index.zen").unwrap();
        let script = ir.script.unwrap();
        let sources: Vec<&str> = script.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["date-fns", "../components/Card.zen"]);
        assert_eq!(script.imports[0].locals, vec!["format".to_string()]);
    }

    #[test]
    fn test_expression_locations_point_into_source() {
        let ir = parse_zen_file("<div>\n  <p>{count}</p>\n</div>", "pages/index.zen").unwrap();
        let expr = &ir.template.expressions[0];
        assert_eq!(expr.id, "expr_0");
        assert_eq!(expr.code, "count");
        assert_eq!(expr.location, SourceLocation::new(2, 7));
    }

    #[test]
    fn test_interpolated_attribute_becomes_template_literal() {
        let ir = parse_zen_file(
            "<div class=\"card {active ? 'on' : ''}\" id=\"main\"></div>",
            "pages/index.zen",
        )
        .unwrap();
        let div = match &ir.template.nodes[0] {
            TemplateNode::Element(el) => el,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            div.attribute("id").map(|a| &a.value),
            Some(&AttributeValue::Static("main".into()))
        );
        let id = match &div.attribute("class").unwrap().value {
            AttributeValue::Expression(id) => id.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(
            ir.template.expression(&id).unwrap().code,
            "`card ${active ? 'on' : ''}`"
        );
    }

    #[test]
    fn test_full_document_keeps_doctype() {
        let ir = parse_zen_file(
            "<!DOCTYPE html>\n<html><head><title>x</title></head><body><p>a</p></body></html>",
            "pages/index.zen",
        )
        .unwrap();
        assert!(matches!(&ir.template.nodes[0], TemplateNode::Doctype(d) if d.name == "html"));
        assert_eq!(elements(&ir.template.nodes), vec!["html"]);
    }

    #[test]
    fn test_parse_errors_carry_kind_and_position() {
        let err = parse_zen_file("<p>\n  {count + 1</p>", "pages/index.zen").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBrace);
        assert_eq!(err.file, "pages/index.zen");
        assert_eq!(err.line, 2);

        let err = parse_zen_file("<div><span></div>", "pages/index.zen").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedMarkup);

        let err = parse_zen_file("<script>\nstate a = 1\n", "pages/index.zen").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedBlock);

        let err = parse_zen_file("<p>{count +}</p>", "pages/index.zen").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidExpression);
    }
}
