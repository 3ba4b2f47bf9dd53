//! Component inlining seen from the generated output.

#[cfg(test)]
mod tests {
    use crate::config::CompileOptions;
    use crate::discovery::{parse_component, ComponentRegistry};
    use crate::finalize::CompileOutput;
    use crate::validate::{CompileResult, ErrorKind};
    use pretty_assertions::assert_eq;

    fn registry(files: &[(&str, &str)]) -> ComponentRegistry {
        let mut registry = ComponentRegistry::default();
        for (path, source) in files {
            registry.insert(parse_component(source, path).unwrap());
        }
        registry
    }

    fn compile(
        page: &str,
        layouts: &[(&str, &str)],
        components: &[(&str, &str)],
    ) -> CompileResult<CompileOutput> {
        crate::compile_with(
            page,
            "pages/index.zen",
            &CompileOptions::default(),
            &registry(layouts),
            &registry(components),
        )
    }

    const COUNTER: &str = "<script>\nstate count = 0\nfunction increment() { count += 1 }\n</script>\n<button onclick={increment}>{count}</button>";

    #[test]
    fn test_each_instance_registers_its_own_scope() {
        let out = compile("<Counter />\n<Counter />", &[], &[("components/Counter.zen", COUNTER)]).unwrap();

        assert!(out.html.contains("data-zen-click=\"__zen_comp_0_increment\""));
        assert!(out.html.contains("data-zen-click=\"__zen_comp_1_increment\""));
        assert!(out
            .html
            .contains("data-zen-component=\"Counter\" data-zen-instance=\"comp-1\" data-zen-replaced=\"true\""));

        assert!(out
            .js
            .contains("function __zen_comp_0_increment() { state.__zen_comp_0_count += 1 }"));
        assert!(out.js.contains(
            "__zenith.register(\"comp-0\", { state: [\"__zen_comp_0_count\"], handlers: { __zen_comp_0_increment } });"
        ));
        assert!(out.js.contains(
            "__zenith.register(\"comp-1\", { state: [\"__zen_comp_1_count\"], handlers: { __zen_comp_1_increment } });"
        ));
        assert!(out.js.ends_with("__zenith.start([\"click\"]);\n"));
    }

    #[test]
    fn test_prop_bound_to_caller_state_stays_live() {
        let greeting = "<script>\nprop name = \"World\"\n</script>\n<p>Hello {name}</p>";
        let out = compile(
            "<script>\nstate user = 'Ada'\n</script>\n<Greeting name={user} />",
            &[],
            &[("components/Greeting.zen", greeting)],
        )
        .unwrap();
        assert!(out.js.contains("(state) { return (state.user); }"));
        assert!(out.html.starts_with("<p data-zen-component=\"Greeting\""));
    }

    #[test]
    fn test_component_styles_are_scoped() {
        let chip = "<span class=\"chip\">x</span>\n<style>.chip { color: red }</style>";
        let out = compile("<Chip />", &[], &[("components/Chip.zen", chip)]).unwrap();
        assert_eq!(
            out.styles,
            vec!["[data-zen-component=\"Chip\"] .chip, .chip[data-zen-component=\"Chip\"] { color: red }".to_string()]
        );
    }

    #[test]
    fn test_layout_shares_document_scope() {
        let layout = "<script>\nstate open = false\n</script>\n<main><button onclick={() => open = !open}>menu</button><Slot /></main>";
        let out = compile(
            "<script>\nstate count = 0\n</script>\n<Shell><p>{count}</p></Shell>",
            &[("layouts/Shell.zen", layout)],
            &[],
        )
        .unwrap();
        assert!(out.html.starts_with("<main><button data-zen-click=\"__zen_layout_0_h0\">menu</button>"));
        assert!(out.js.contains(
            "__zenith.register(\"page\", { state: [\"count\", \"open\"], handlers: { __zen_layout_0_h0 } });"
        ));
    }

    #[test]
    fn test_mutation_outside_handler_in_component_is_reported_there() {
        let counter = "<script>\nstate count = 0\nfunction reset() { count = 0 }\n</script>\n<p>{count}</p>";
        let err = compile("<Counter />", &[], &[("components/Counter.zen", counter)]).unwrap_err();
        assert_eq!(err.file, "components/Counter.zen");
        match err.kind {
            ErrorKind::IllegalMutation {
                state_name,
                function_name,
                ..
            } => {
                assert_eq!(state_name, "__zen_comp_0_count");
                assert_eq!(function_name.as_deref(), Some("__zen_comp_0_reset"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unknown_component_fails_the_page() {
        let err = compile("<main><Missing /></main>", &[], &[]).unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UnknownComponent {
                name: "Missing".into()
            }
        );
    }
}
