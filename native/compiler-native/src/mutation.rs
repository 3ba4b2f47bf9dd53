//! State mutation legality.
//!
//! Reactive state may only be written inside functions bound as event
//! handlers. Every script block is parsed and each assignment or update
//! whose target resolves to a declared state (not a parameter or local of
//! the same name) is attributed to the top-level function whose statement
//! contains it, or to no function at all.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ir::{ScriptBlock, ZenIR};
use crate::renamer::{script_references, Reference};
use crate::validate::{CompileResult, CompilerError, ErrorKind};
use crate::visitor::{walk_nodes, HandlerCollector};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationLocation {
    /// `None` for a write at the top level of the script.
    pub function_name: Option<String>,
    pub line: u32,
    pub column: u32,
    pub state_name: String,
    /// The offending source line.
    pub code: String,
}

/// State written by `reference`: either the bare name or `state.name`.
fn written_state<'r>(reference: &'r Reference, states: &HashSet<&str>) -> Option<&'r str> {
    if !reference.write {
        return None;
    }
    match &reference.member {
        None if states.contains(reference.name.as_str()) => Some(reference.name.as_str()),
        Some((property, _)) if reference.name == "state" && states.contains(property.as_str()) => {
            Some(property.as_str())
        }
        _ => None,
    }
}

/// Every write to one of `states` inside `block`, in source order.
pub fn find_mutations(
    block: &ScriptBlock,
    states: &HashSet<&str>,
    file: &str,
) -> CompileResult<Vec<MutationLocation>> {
    let references = script_references(block).map_err(|e| {
        CompilerError::at(
            ErrorKind::InvalidScript,
            &format!("Script {} could not be parsed: {}", block.index, e),
            file,
            block.location,
        )
    })?;

    let mut found = Vec::new();
    for reference in &references {
        let state_name = match written_state(reference, states) {
            Some(name) => name,
            None => continue,
        };
        let offset = reference.span.start;
        let location = block.location_of(offset);
        let function_name = block
            .statements
            .iter()
            .find(|s| s.span().contains(offset))
            .and_then(|s| s.function_name())
            .map(String::from);
        found.push(MutationLocation {
            function_name,
            line: location.line,
            column: location.column,
            state_name: state_name.to_string(),
            code: block.line_text(offset),
        });
    }
    Ok(found)
}

/// Rejects the first state write that is not inside an event handler.
pub fn validate_mutations(ir: &ZenIR) -> CompileResult<()> {
    let script = match &ir.script {
        Some(script) if !script.states.is_empty() => script,
        _ => return Ok(()),
    };

    let mut collector = HandlerCollector::default();
    walk_nodes(&mut collector, &ir.template.nodes);
    let handlers: HashSet<&str> = collector.handlers.iter().map(String::as_str).collect();
    let states: HashSet<&str> = script.states.keys().map(String::as_str).collect();

    let mut checked = 0usize;
    for block in &script.blocks {
        let file = block.source_file.as_deref().unwrap_or(&ir.file_path);
        for mutation in find_mutations(block, &states, file)? {
            checked += 1;
            let legal = mutation
                .function_name
                .as_deref()
                .map_or(false, |name| handlers.contains(name));
            if legal {
                continue;
            }

            let whereabouts = match &mutation.function_name {
                Some(name) => format!("in function '{}', which is not an event handler", name),
                None => "at the top level of the script".to_string(),
            };
            return Err(CompilerError::new(
                ErrorKind::IllegalMutation {
                    state_name: mutation.state_name.clone(),
                    function_name: mutation.function_name.clone(),
                    script_index: block.index,
                },
                &format!(
                    "State '{}' is mutated {} (script {}).",
                    mutation.state_name, whereabouts, block.index
                ),
                file,
                mutation.line,
                mutation.column,
            )
            .with_context(mutation.code)
            .with_hint("Move the write into a function bound with on<event>={handler}."));
        }
    }

    tracing::trace!(file = %ir.file_path, mutations = checked, "mutations validated");
    Ok(())
}
