//! Expression dependency analysis.
//!
//! Each expression is classified by the data it reads and rewritten so that
//! state and prop names go through their data objects. The generated
//! evaluator declares exactly the data parameters it uses, followed by the
//! loop variables when the expression sits inside a loop.

use serde::{Deserialize, Serialize};

use crate::ir::ExpressionIR;
use crate::jsx_lowerer::lower_jsx;
use crate::renamer::{rewrite_expression, Rewrite};
use crate::scope::{Binding, BindingTable};
use crate::validate::{CompileResult, CompilerError, ErrorKind};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDataDependencies {
    pub uses_state: bool,
    pub uses_props: bool,
    pub uses_loader_data: bool,
    pub uses_stores: bool,
    pub state_properties: Vec<String>,
    pub prop_names: Vec<String>,
    pub loader_properties: Vec<String>,
    pub store_names: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

impl ExpressionDataDependencies {
    /// Data parameters in their fixed order.
    pub fn parameters(&self) -> Vec<&'static str> {
        let mut params = Vec::new();
        if self.uses_state {
            params.push("state");
        }
        if self.uses_props {
            params.push("props");
        }
        if self.uses_loader_data {
            params.push("loaderData");
        }
        if self.uses_stores {
            params.push("stores");
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedExpression {
    pub id: String,
    /// Evaluator body: rewritten references, markup lowered to calls.
    pub code: String,
    pub dependencies: ExpressionDataDependencies,
    pub loop_variables: Vec<String>,
}

impl AnalyzedExpression {
    pub fn evaluator_name(&self) -> String {
        format!("_zen_{}", self.id)
    }

    pub fn parameters(&self) -> Vec<String> {
        let mut params: Vec<String> = self
            .dependencies
            .parameters()
            .into_iter()
            .map(String::from)
            .collect();
        if !self.loop_variables.is_empty() {
            params.push(format!("{{ {} }}", self.loop_variables.join(", ")));
        }
        params
    }

    pub fn to_evaluator(&self) -> String {
        format!(
            "function {}({}) {{ return ({}); }}",
            self.evaluator_name(),
            self.parameters().join(", "),
            self.code
        )
    }
}

pub fn analyze_expression(
    expr: &ExpressionIR,
    table: &BindingTable,
    file_path: &str,
) -> CompileResult<AnalyzedExpression> {
    let loop_context = expr.loop_context.as_ref();
    let mut deps = ExpressionDataDependencies::default();

    let invalid = |e: String| {
        CompilerError::at(
            ErrorKind::InvalidExpression,
            &format!("Invalid expression syntax: {}", e),
            expr.source_file.as_deref().unwrap_or(file_path),
            expr.location,
        )
        .with_context(expr.code.clone())
    };

    let rewritten = rewrite_expression(&expr.code, |reference| {
        let member = reference.member.as_ref().map(|(name, _)| name.as_str());
        match table.classify(&reference.name, loop_context) {
            Binding::StateObject => {
                deps.uses_state = true;
                if let Some(name) = member {
                    push_unique(&mut deps.state_properties, name);
                }
                None
            }
            Binding::PropsObject => {
                deps.uses_props = true;
                if let Some(name) = member {
                    push_unique(&mut deps.prop_names, name);
                }
                None
            }
            Binding::LoaderData => {
                deps.uses_loader_data = true;
                if let Some(name) = member {
                    push_unique(&mut deps.loader_properties, name);
                }
                None
            }
            Binding::Stores => {
                deps.uses_stores = true;
                if let Some(name) = member {
                    push_unique(&mut deps.store_names, name);
                }
                None
            }
            Binding::State => {
                deps.uses_state = true;
                push_unique(&mut deps.state_properties, &reference.name);
                Some(Rewrite::Name(format!("state.{}", reference.name)))
            }
            Binding::Prop => {
                deps.uses_props = true;
                push_unique(&mut deps.prop_names, &reference.name);
                Some(Rewrite::Name(format!("props.{}", reference.name)))
            }
            _ => None,
        }
    })
    .map_err(invalid)?;

    let code = lower_jsx(&rewritten).map_err(invalid)?;

    Ok(AnalyzedExpression {
        id: expr.id.clone(),
        code,
        dependencies: deps,
        loop_variables: loop_context
            .map(|ctx| ctx.variables.clone())
            .unwrap_or_default(),
    })
}

pub fn analyze_expressions(
    expressions: &[ExpressionIR],
    table: &BindingTable,
    file_path: &str,
) -> CompileResult<Vec<AnalyzedExpression>> {
    expressions
        .iter()
        .map(|expr| analyze_expression(expr, table, file_path))
        .collect()
}
