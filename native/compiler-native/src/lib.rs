//! # Zenith Compiler
//!
//! Compiles `.zen` single-file components (template + script + style) into
//! static HTML with `data-zen-*` markers, scoped CSS and a hydration bundle.
//!
//! ## Pipeline
//!
//! 1. **Parse**: blocks are extracted, template expressions are replaced by
//!    `__ZENITH_EXPR_n__` placeholders, the markup goes through html5ever and
//!    comes back as [`ir::TemplateNode`]s with fragments lowered.
//! 2. **Inline**: layouts first, then components, until no component tag is
//!    left. Every instance gets its own `comp-N` scope.
//! 3. **Validate**: structure (no component/slot survives), mutations (state
//!    writes only inside event handlers) and references (every identifier
//!    resolves to a declared binding).
//! 4. **Analyze**: each expression learns which of `state`, `props`,
//!    `loaderData`, `stores` and loop variables it reads.
//! 5. **Generate + finalize**: HTML, CSS and the runtime bundle. No
//!    placeholder may reach the output.
//!
//! ## Determinism
//!
//! Identical source, path and options always produce byte-identical output.
//! [`cache::CompileCache`] relies on this.

#[cfg(feature = "napi")]
use napi_derive::napi;

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod analyze;
pub mod cache;
pub mod codegen;
pub mod component;
pub mod config;
pub mod discovery;
pub mod finalize;
pub mod ir;
pub mod jsx_lowerer;
pub mod layout;
pub mod lexer;
pub mod mutation;
pub mod parse;
pub mod renamer;
pub mod routes;
pub mod scope;
pub mod script;
pub mod transform;
pub mod validate;
pub mod visitor;

#[cfg(test)]
mod component_tests;
#[cfg(test)]
mod lowering_tests;
#[cfg(test)]
mod parse_tests;
#[cfg(test)]
mod safety_tests;

pub use cache::CompileCache;
pub use config::CompileOptions;
pub use discovery::{ComponentMetadata, ComponentRegistry, DiscoveryCache};
pub use finalize::{BundlePlan, CompileOutput, VirtualModule};
pub use ir::ZenIR;
pub use parse::{parse_template, parse_zen_file};
pub use routes::{generate_route_manifest, match_route, RouteDefinition, RouteManifestEntry};
pub use validate::{CompileResult, CompilerError, ErrorCategory, ErrorKind};

// ═══════════════════════════════════════════════════════════════════════════════
// PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Runs the full pipeline over one page against pre-discovered registries.
pub fn compile_with(
    source: &str,
    file_path: &str,
    options: &CompileOptions,
    layouts: &ComponentRegistry,
    components: &ComponentRegistry,
) -> CompileResult<CompileOutput> {
    let mut ir = parse_zen_file(source, file_path)?;
    let inlined = component::resolve_components(&mut ir, layouts, components, options)?;

    validate::validate_structure(&ir.template.nodes, &ir.template.expressions, file_path)?;
    mutation::validate_mutations(&ir)?;

    let table = scope::BindingTable::from_script(ir.script.as_ref());
    scope::validate_references(&ir.template.expressions, &table, file_path, options)?;
    let analyzed = analyze::analyze_expressions(&ir.template.expressions, &table, file_path)?;

    let generated = codegen::generate(&ir, &analyzed, options)?;
    tracing::debug!(
        file = file_path,
        inlined,
        expressions = analyzed.len(),
        bindings = generated.bindings.len(),
        "compiled page"
    );
    finalize::finalize(file_path, generated)
}

/// One-shot compile without component discovery caching.
pub fn compile(source: &str, file_path: &str, options: &CompileOptions) -> CompileResult<CompileOutput> {
    Compiler::new(options.clone()).compile(source, file_path)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-lived compiler for a project: holds discovery snapshots and compiled
/// outputs across calls. Safe to share between threads.
#[derive(Debug, Default)]
pub struct Compiler {
    options: CompileOptions,
    discovery: DiscoveryCache,
    cache: CompileCache,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Compiler {
            options,
            discovery: DiscoveryCache::new(),
            cache: CompileCache::new(),
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    fn registry(&self, dir: Option<&str>) -> CompileResult<Arc<ComponentRegistry>> {
        match dir {
            Some(dir) => self.discovery.get_or_discover(Path::new(dir)),
            None => Ok(Arc::new(ComponentRegistry::default())),
        }
    }

    pub fn compile(&self, source: &str, file_path: &str) -> CompileResult<CompileOutput> {
        if let Some(output) = self.cache.get(file_path, source, &self.options) {
            tracing::trace!(file = file_path, "compile cache hit");
            return Ok(output);
        }
        let layouts = self.registry(self.options.layouts_dir.as_deref())?;
        let components = self.registry(self.options.components_dir.as_deref())?;
        let output = compile_with(source, file_path, &self.options, &layouts, &components)?;
        self.cache.set(file_path, source, &self.options, output.clone());
        Ok(output)
    }

    pub fn compile_file(&self, path: &Path) -> CompileResult<CompileOutput> {
        let file_path = path.to_string_lossy();
        let source = fs::read_to_string(path).map_err(|e| {
            CompilerError::new(
                ErrorKind::Io,
                &format!("Failed to read source: {}", e),
                &file_path,
                1,
                1,
            )
        })?;
        self.compile(&source, &file_path)
    }

    /// Compiles independent pages in parallel. A failing page never affects
    /// the others; results come back in input order.
    pub fn compile_many(&self, paths: &[PathBuf]) -> Vec<(PathBuf, CompileResult<CompileOutput>)> {
        paths
            .par_iter()
            .map(|path| (path.clone(), self.compile_file(path)))
            .collect()
    }

    /// Every page under `pagesDir`, compiled.
    pub fn compile_pages(&self) -> CompileResult<Vec<(PathBuf, CompileResult<CompileOutput>)>> {
        let pages = self.pages_dir()?;
        let paths = discovery::find_zen_files(&pages)?;
        Ok(self.compile_many(&paths))
    }

    pub fn route_manifest(&self) -> CompileResult<Vec<RouteDefinition>> {
        generate_route_manifest(&self.pages_dir()?)
    }

    fn pages_dir(&self) -> CompileResult<PathBuf> {
        self.options.pages_dir.as_deref().map(PathBuf::from).ok_or_else(|| {
            CompilerError::new(ErrorKind::Io, "No pagesDir configured.", "<options>", 1, 1)
        })
    }

    /// Drops everything derived from `path`. Component and layout changes
    /// invalidate their discovery root and every compiled page, since any
    /// page may inline them.
    pub fn invalidate(&self, path: &Path) {
        let roots = [
            self.options.components_dir.as_deref(),
            self.options.layouts_dir.as_deref(),
        ];
        let mut shared = false;
        for root in roots.into_iter().flatten() {
            if path.starts_with(root) {
                self.discovery.invalidate(Path::new(root));
                shared = true;
            }
        }
        if shared {
            self.cache.clear();
        } else {
            self.cache.invalidate(&path.to_string_lossy());
        }
    }

    pub fn invalidate_all(&self) {
        self.discovery.invalidate_all();
        self.cache.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NODE BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
fn to_napi_error(err: CompilerError) -> napi::Error {
    let reason = serde_json::to_string(&err).unwrap_or_else(|_| err.to_string());
    napi::Error::from_reason(reason)
}

#[cfg(feature = "napi")]
fn native_options(options: Option<serde_json::Value>) -> napi::Result<CompileOptions> {
    match options {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| napi::Error::from_reason(format!("Invalid compiler options: {}", e))),
        None => Ok(CompileOptions::default()),
    }
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_zen_native(
    source: String,
    file_path: String,
    options: Option<serde_json::Value>,
) -> napi::Result<CompileOutput> {
    let options = native_options(options)?;
    compile(&source, &file_path, &options).map_err(to_napi_error)
}

#[cfg(feature = "napi")]
#[napi]
pub fn parse_template_native(html: String, file_path: String) -> napi::Result<serde_json::Value> {
    let template = parse_template(&html, &file_path).map_err(to_napi_error)?;
    serde_json::to_value(template).map_err(|e| napi::Error::from_reason(e.to_string()))
}

#[cfg(feature = "napi")]
#[napi]
pub fn generate_route_manifest_native(pages_dir: String) -> napi::Result<serde_json::Value> {
    let routes = generate_route_manifest(Path::new(&pages_dir)).map_err(to_napi_error)?;
    serde_json::to_value(routes::manifest_entries(&routes))
        .map_err(|e| napi::Error::from_reason(e.to_string()))
}
