//! Safety Gate Tests for Zenith Compiler Invariants
//!
//! Every page below goes through the whole pipeline. Programs that break a
//! compile-time guarantee must fail with a structured error; nothing is
//! deferred to the runtime.

#[cfg(test)]
mod tests {
    use crate::config::CompileOptions;
    use crate::discovery::ComponentRegistry;
    use crate::finalize::CompileOutput;
    use crate::validate::{CompileResult, ErrorCategory, ErrorKind};

    fn compile_opts(src: &str, options: &CompileOptions) -> CompileResult<CompileOutput> {
        let empty = ComponentRegistry::default();
        crate::compile_with(src, "pages/index.zen", options, &empty, &empty)
    }

    fn compile(src: &str) -> CompileResult<CompileOutput> {
        compile_opts(src, &CompileOptions::default())
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // SLOTS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_orphan_slot_detection() {
        let err = compile("<div><slot /></div>").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnmatchedSlot { ref slot, .. } if slot == "default"));
        assert_eq!(err.category(), ErrorCategory::Resolution);

        let err = compile("<section>\n  <Slot name=\"aside\" />\n</section>").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::UnmatchedSlot { ref slot, .. } if slot == "aside"));
        assert_eq!(err.line, 2);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // REACTIVITY BOUNDARY
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_disallow_state_writes_at_top_level() {
        let err = compile("<script>\nstate count = 0\ncount = 10\n</script>\n<p>{count}</p>").unwrap_err();
        assert!(matches!(err.kind, ErrorKind::IllegalMutation { function_name: None, .. }));
        assert_eq!((err.line, err.column), (3, 1));
        assert_eq!(err.context.as_deref(), Some("count = 10"));
        assert!(!err.hints.is_empty());
    }

    #[test]
    fn test_disallow_state_writes_in_helpers() {
        let err = compile(
            "<script>\nstate count = 0\nfunction reset() { count = 0 }\nfunction bump() { count++ }\n</script>\n<button onclick={bump}>{count}</button>",
        )
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::IllegalMutation { function_name: Some(ref f), .. } if f == "reset"
        ));
    }

    #[test]
    fn test_allow_state_writes_in_event_handlers() {
        let out = compile(
            "<script>\nstate count = 0\nfunction bump() { count++; --count; count += 2; count ||= 1 }\n</script>\n<button onclick={bump}>{count}</button>",
        )
        .unwrap();
        assert!(out.js.contains(
            "function bump() { state.count++; --state.count; state.count += 2; state.count ||= 1 }"
        ));
    }

    #[test]
    fn test_async_inline_handler_may_write_state() {
        let out = compile(
            "<script>\nstate count = 0\nasync function save(e) { return e }\n</script>\n<button onclick={async (e) => { await save(e); count++ }}>{count}</button>",
        )
        .unwrap();
        assert!(out.html.contains("<button data-zen-click=\"__zen_h0\">"));
        assert!(out
            .js
            .contains("async function __zen_h0(e) { await save(e); state.count++ }"));
        assert!(out.js.contains("handlers: { __zen_h0 }"));
    }

    #[test]
    fn test_shadowed_state_names_are_not_mutations() {
        let out = compile(
            "<script>\nstate total = 0\nfunction sum(xs, total = 0) { for (const x of xs) total += x; return total }\n</script>\n<p>{sum([1, 2], total)}</p>",
        )
        .unwrap();
        assert!(out.js.contains("function sum(xs, total = 0) { for (const x of xs) total += x; return total }"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // REFERENCES
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_undeclared_identifier_rejected() {
        let err = compile("<script>\nstate count = 0\n</script>\n<p>{count + missing}</p>").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UndeclaredReference {
                name: "missing".into()
            }
        );
        assert_eq!(err.line, 4);
    }

    #[test]
    fn test_lenient_references_compile() {
        let options = CompileOptions {
            strict_references: false,
            ..CompileOptions::default()
        };
        let out = compile_opts("<p>{missing}</p>", &options).unwrap();
        assert!(out.js.contains("function _zen_expr_0() { return (missing); }"));
    }

    #[test]
    fn test_function_in_template_rejected() {
        let err = compile("<p>{() => 1}</p>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::FunctionInTemplate);
    }

    #[test]
    fn test_undeclared_handler_rejected() {
        let err = compile("<button onclick={save}>Save</button>").unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::UndeclaredReference {
                name: "save".into()
            }
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // OUTPUT
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_literal_placeholder_never_reaches_output() {
        let err = compile("<p>__ZENITH_EXPR_7__</p>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_static_page_has_no_bindings() {
        let out = compile("<main><h1 class=\"title\">Hello &amp; welcome</h1><br></main>").unwrap();
        assert_eq!(
            out.html,
            "<main><h1 class=\"title\">Hello &amp; welcome</h1><br /></main>"
        );
        assert!(!out.js.contains("__zenith.expressions"));
        assert!(out.js.ends_with("__zenith.start([]);\n"));
        assert!(out.bundle_plan.is_none());
    }

    #[test]
    fn test_output_is_deterministic() {
        let src = "<script>\nstate items = []\nstate open = false\nfunction toggle() { open = !open }\n</script>\n<button onclick={toggle}>{open ? 'close' : 'open'}</button>\n<ul>{items.map(item => <li>{item}</li>)}</ul>";
        let first = compile(src).unwrap();
        for _ in 0..3 {
            assert_eq!(compile(src).unwrap(), first);
        }
    }
}
