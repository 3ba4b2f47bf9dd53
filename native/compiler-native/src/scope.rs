//! Reference classification and validation for template expressions.
//!
//! Every free identifier of an expression resolves, in priority order, to a
//! loop variable, one of the data objects (`state`, `props`, `loaderData`,
//! `stores`), a declared state or prop, a script binding, an import or an
//! allowed global. Anything else is an undeclared reference.

use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::config::CompileOptions;
use crate::ir::{ExpressionIR, LoopContext, ScriptIR};
use crate::renamer::{expression_references, is_function_expression};
use crate::validate::{CompileResult, CompilerError, ErrorKind};

lazy_static! {
    pub static ref ZENITH_GLOBALS: HashSet<&'static str> = {
        let mut s = HashSet::new();
        // Standard JS globals
        s.insert("Math");
        s.insert("console");
        s.insert("JSON");
        s.insert("Date");
        s.insert("String");
        s.insert("Number");
        s.insert("Boolean");
        s.insert("Array");
        s.insert("Object");
        s.insert("Promise");
        s.insert("Map");
        s.insert("Set");
        s.insert("Error");
        s.insert("RegExp");
        s.insert("Symbol");
        s.insert("BigInt");
        s.insert("Intl");
        s.insert("undefined");
        s.insert("NaN");
        s.insert("Infinity");
        s.insert("isNaN");
        s.insert("isFinite");
        s.insert("parseInt");
        s.insert("parseFloat");
        s.insert("encodeURIComponent");
        s.insert("decodeURIComponent");
        s.insert("encodeURI");
        s.insert("decodeURI");
        // Browser environment
        s.insert("window");
        s.insert("document");
        s.insert("navigator");
        s.insert("location");
        s.insert("localStorage");
        s.insert("sessionStorage");
        s.insert("fetch");
        s.insert("setTimeout");
        s.insert("clearTimeout");
        s.insert("setInterval");
        s.insert("clearInterval");
        s.insert("requestAnimationFrame");
        s.insert("globalThis");
        // Runtime element construction
        s.insert("__zenith");
        s
    };
}

/// What a free identifier in an expression refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Loop,
    StateObject,
    PropsObject,
    LoaderData,
    Stores,
    State,
    Prop,
    Script,
    Import,
    Global,
    Unknown,
}

/// Names visible to template expressions of one compiled page.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    pub states: HashSet<String>,
    pub props: HashSet<String>,
    pub script: HashSet<String>,
    pub imports: HashSet<String>,
}

impl BindingTable {
    pub fn from_script(script: Option<&ScriptIR>) -> Self {
        let script = match script {
            Some(script) => script,
            None => return Self::default(),
        };
        BindingTable {
            states: script.states.keys().cloned().collect(),
            props: script.props.keys().cloned().collect(),
            script: script
                .functions
                .iter()
                .chain(script.variables.iter())
                .cloned()
                .collect(),
            imports: script.import_locals().into_iter().collect(),
        }
    }

    pub fn classify(&self, name: &str, loop_context: Option<&LoopContext>) -> Binding {
        if loop_context.map_or(false, |ctx| ctx.contains(name)) {
            return Binding::Loop;
        }
        match name {
            "state" => return Binding::StateObject,
            "props" => return Binding::PropsObject,
            "loaderData" => return Binding::LoaderData,
            "stores" => return Binding::Stores,
            _ => {}
        }
        if self.states.contains(name) {
            Binding::State
        } else if self.props.contains(name) {
            Binding::Prop
        } else if self.script.contains(name) {
            Binding::Script
        } else if self.imports.contains(name) {
            Binding::Import
        } else if ZENITH_GLOBALS.contains(name) {
            Binding::Global
        } else {
            Binding::Unknown
        }
    }

    /// True for any name a caller may pass to a component as a live binding.
    pub fn is_caller_binding(&self, name: &str) -> bool {
        self.states.contains(name)
            || self.script.contains(name)
            || self.imports.contains(name)
            || self.props.contains(name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ScopeValidator<'a> {
    pub table: &'a BindingTable,
    pub file_path: &'a str,
    pub strict: bool,
    pub stores: &'a [String],
}

impl<'a> ScopeValidator<'a> {
    pub fn new(table: &'a BindingTable, file_path: &'a str, options: &'a CompileOptions) -> Self {
        ScopeValidator {
            table,
            file_path,
            strict: options.strict_references,
            stores: &options.stores,
        }
    }

    fn error(&self, expr: &ExpressionIR, kind: ErrorKind, message: &str) -> CompilerError {
        let file = expr.source_file.as_deref().unwrap_or(self.file_path);
        CompilerError::at(kind, message, file, expr.location).with_context(expr.code.clone())
    }

    pub fn verify_expression(&self, expr: &ExpressionIR) -> CompileResult<()> {
        if is_function_expression(&expr.code) {
            return Err(self
                .error(
                    expr,
                    ErrorKind::FunctionInTemplate,
                    "Functions cannot be created in template position.",
                )
                .with_hint("Declare a named function in <script> and reference it by name."));
        }

        let references = expression_references(&expr.code).map_err(|e| {
            self.error(
                expr,
                ErrorKind::InvalidExpression,
                &format!("Invalid expression syntax: {}", e),
            )
        })?;

        for reference in references {
            match self.table.classify(&reference.name, expr.loop_context.as_ref()) {
                Binding::Unknown if self.strict => {
                    return Err(self
                        .error(
                            expr,
                            ErrorKind::UndeclaredReference {
                                name: reference.name.clone(),
                            },
                            &format!("Unknown identifier '{}'.", reference.name),
                        )
                        .with_hint("Declare it with `state`, `prop`, or in <script>."));
                }
                Binding::Unknown => {
                    tracing::warn!(
                        file = expr.source_file.as_deref().unwrap_or(self.file_path),
                        line = expr.location.line,
                        column = expr.location.column,
                        reference = %reference.name,
                        "unresolved reference"
                    );
                }
                Binding::Stores if !self.stores.is_empty() => {
                    if let Some((store, _)) = &reference.member {
                        if !self.stores.contains(store) {
                            let name = format!("stores.{}", store);
                            return Err(self.error(
                                expr,
                                ErrorKind::UndeclaredReference { name: name.clone() },
                                &format!("Unknown store '{}'.", name),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Validates every registered expression of a resolved page: text and
/// attribute bindings as well as conditions, loop sources and keys.
pub fn validate_references(
    expressions: &[ExpressionIR],
    table: &BindingTable,
    file_path: &str,
    options: &CompileOptions,
) -> CompileResult<()> {
    let validator = ScopeValidator::new(table, file_path, options);
    for expr in expressions {
        validator.verify_expression(expr)?;
    }
    Ok(())
}
