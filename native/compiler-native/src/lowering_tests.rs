//! Fragment lowering through the whole pipeline: markup inside template
//! expressions must come out as hydration markers, never as strings parsed
//! at runtime.

#[cfg(test)]
mod tests {
    use crate::config::CompileOptions;
    use crate::discovery::ComponentRegistry;
    use crate::finalize::CompileOutput;
    use crate::lexer::PLACEHOLDER_RE;

    fn compile(src: &str) -> CompileOutput {
        let empty = ComponentRegistry::default();
        crate::compile_with(src, "pages/index.zen", &CompileOptions::default(), &empty, &empty)
            .unwrap()
    }

    #[test]
    fn test_conditional_lowering() {
        let out = compile(
            "<script>\nstate loggedIn = false\nstate name = 'Ada'\n</script>\n<nav>{loggedIn ? <span>Hi {name}</span> : <a href=\"/login\">Login</a>}</nav>",
        );
        assert!(out.html.starts_with("<nav><div data-zen-conditional=\""));
        assert!(out
            .html
            .contains("<div data-zen-branch=\"true\" style=\"display: contents;\"><span>Hi <span data-zen-text="));
        assert!(out.html.contains(
            "</div><div data-zen-branch=\"false\" style=\"display: contents;\"><a href=\"/login\">Login</a></div></div></nav>"
        ));
        assert!(out.js.contains("(state) { return (state.loggedIn); }"));
        assert!(out.js.contains("(state) { return (state.name); }"));
        assert!(!PLACEHOLDER_RE.is_match(&out.html));
    }

    #[test]
    fn test_loop_lowering_with_context() {
        let out = compile(
            "<script>\nstate items = []\n</script>\n<ul>{items.map((item, i) => <li key={item.id}>{i}: {item.label}</li>)}</ul>",
        );
        assert!(out.html.starts_with("<ul><template data-zen-loop=\""));
        assert!(out.html.contains("data-zen-item=\"item\" data-zen-index=\"i\" data-zen-key=\""));
        assert!(out.html.contains("\"><li><span data-zen-text="));
        assert!(out.html.ends_with("</li></template></ul>"));
        assert!(!out.html.contains("key=\"item"));

        // The source reads state; item expressions only see loop variables.
        assert!(out.js.contains("(state) { return (state.items); }"));
        assert!(out.js.contains("({ item, i }) { return (item.label); }"));
        assert!(out.js.contains("({ item, i }) { return (item.id); }"));
        assert!(out.js.contains("[], true],"));
    }

    #[test]
    fn test_optional_lowering_keeps_handlers() {
        let out = compile(
            "<script>\nstate open = true\nfunction close() { open = false }\n</script>\n{open && <p onclick={close}>Panel</p>}",
        );
        assert!(out.html.starts_with("<div data-zen-optional=\""));
        assert!(out
            .html
            .ends_with("style=\"display: contents;\"><p data-zen-click=\"close\">Panel</p></div>"));
        assert!(out.js.contains("function close() { state.open = false }"));
        assert!(out
            .js
            .contains("__zenith.register(\"page\", { state: [\"open\"], handlers: { close } });"));
        assert!(out.js.contains("__zenith.start([\"click\"]);"));
    }

    #[test]
    fn test_loop_handler_receives_loop_variables() {
        let out = compile(
            "<script>\nstate items = []\nfunction pick(item) { console.log(item) }\n</script>\n<ul>{items.map(item => <li onclick={() => pick(item)}>{item}</li>)}</ul>",
        );
        assert!(out.html.contains("<li data-zen-click=\"__zen_h0\">"));
        assert!(out.js.contains("function __zen_h0(event, { item })"));
        assert!(out.js.contains("handlers: { __zen_h0 }"));
    }

    #[test]
    fn test_unliftable_markup_becomes_element_calls() {
        let out = compile(
            "<script>\nstate items = []\n</script>\n<ul>{items.map(({ id }) => <li>{id}</li>)}</ul>",
        );
        assert!(out.html.contains("<ul><span data-zen-text=\"expr_0\" style=\"display: contents;\"></span></ul>"));
        assert!(out
            .js
            .contains(r#"return (state.items.map(({ id }) => __zenith.h("li", null, [id])));"#));
    }
}
