//! Final output assembly.
//!
//! Checks the generated HTML for expression placeholders that survived the
//! pipeline and, when the page imports npm packages, describes the entry for
//! the external bundler.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::codegen::GeneratedCode;
use crate::lexer::PLACEHOLDER_RE;
use crate::validate::{CompileResult, CompilerError, ErrorKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct VirtualModule {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct BundlePlan {
    /// Module source handed to the bundler as the page entry.
    pub entry: String,
    pub platform: String,
    pub format: String,
    pub resolve_roots: Vec<String>,
    pub virtual_modules: Vec<VirtualModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompileOutput {
    pub html: String,
    pub js: String,
    pub styles: Vec<String>,
    /// Import statements the bundler must resolve.
    pub npm_imports: Vec<String>,
    pub bundle_plan: Option<BundlePlan>,
}

/// No `__ZENITH_EXPR_n__` token may reach the output.
pub fn verify_no_placeholders(html: &str, file_path: &str) -> CompileResult<()> {
    let residual: Vec<&str> = PLACEHOLDER_RE.find_iter(html).map(|m| m.as_str()).collect();
    if residual.is_empty() {
        return Ok(());
    }
    Err(CompilerError::internal(
        &format!(
            "HTML contains expressions that were not compiled: {}",
            residual.join(", ")
        ),
        file_path,
    )
    .with_hint("All expressions must be replaced with hydration markers."))
}

fn bundle_plan(file_path: &str, generated: &GeneratedCode) -> Option<BundlePlan> {
    if generated.imports.iter().all(|i| i.type_only) {
        return None;
    }
    let resolve_root = Path::new(file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_string_lossy()
        .to_string();
    Some(BundlePlan {
        entry: generated.js.clone(),
        platform: "browser".to_string(),
        format: "esm".to_string(),
        resolve_roots: vec![resolve_root],
        virtual_modules: vec![VirtualModule {
            id: "\0zenith:runtime-data".to_string(),
            code: "export const runtimeData = (typeof globalThis !== 'undefined' ? globalThis : window).__ZENITH_PAGE__;".to_string(),
        }],
    })
}

pub fn finalize(file_path: &str, generated: GeneratedCode) -> CompileResult<CompileOutput> {
    verify_no_placeholders(&generated.html, file_path)?;
    if generated.html.trim().is_empty() && generated.js.trim().is_empty() {
        return Err(CompilerError::new(
            ErrorKind::Internal,
            "Code generation produced no output.",
            file_path,
            1,
            1,
        ));
    }

    let bundle_plan = bundle_plan(file_path, &generated);
    let npm_imports = generated
        .imports
        .iter()
        .filter(|i| !i.type_only)
        .map(|i| i.code.clone())
        .collect();
    Ok(CompileOutput {
        html: generated.html,
        js: generated.js,
        styles: generated.styles,
        npm_imports,
        bundle_plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ScriptImport;

    fn generated(html: &str, imports: Vec<ScriptImport>) -> GeneratedCode {
        GeneratedCode {
            html: html.to_string(),
            styles: vec![],
            js: "__zenith.start([]);".to_string(),
            script: String::new(),
            expressions: String::new(),
            imports,
            bindings: vec![],
        }
    }

    #[test]
    fn test_residual_placeholder_rejected() {
        let err = finalize("pages/a.zen", generated("<p>__ZENITH_EXPR_3__</p>", vec![])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains("__ZENITH_EXPR_3__"));
    }

    #[test]
    fn test_bundle_plan_only_for_npm_imports() {
        let out = finalize("pages/a.zen", generated("<p>hi</p>", vec![])).unwrap();
        assert!(out.bundle_plan.is_none());
        assert!(out.npm_imports.is_empty());

        let import = ScriptImport {
            source: "nanoid".into(),
            code: "import { nanoid } from 'nanoid';".into(),
            type_only: false,
            side_effect: false,
        };
        let out = finalize("pages/a.zen", generated("<p>hi</p>", vec![import])).unwrap();
        let plan = out.bundle_plan.unwrap();
        assert_eq!(plan.format, "esm");
        assert_eq!(plan.resolve_roots, vec!["pages".to_string()]);
        assert_eq!(out.npm_imports, vec!["import { nanoid } from 'nanoid';".to_string()]);
    }
}
