//! Layout scoping rules.
//!
//! Layouts wrap the page body and live at document scope: their state and
//! functions keep their names so page and layout can share bindings. Only
//! the handlers lifted out of the layout's template are renamed, since every
//! file numbers its lifted handlers from zero.

use std::collections::{HashMap, HashSet};

use crate::ir::ScriptIR;

const LIFTED_HANDLER_PREFIX: &str = "__zen_h";

/// Renames for the lifted handlers of the `index`-th layout usage:
/// `__zen_h2` becomes `__zen_layout_0_h2`.
pub fn layout_renames(script: &ScriptIR, index: usize) -> HashMap<String, String> {
    script
        .functions
        .iter()
        .filter(|name| {
            name.strip_prefix(LIFTED_HANDLER_PREFIX)
                .map_or(false, |n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .map(|name| {
            let suffix = &name["__zen_".len()..];
            (name.clone(), format!("__zen_layout_{}_{}", index, suffix))
        })
        .collect()
}

/// Layout states the page already declares. The page's declaration wins
/// and the layout's copy is dropped when the scripts merge.
pub fn shared_states(layout: &ScriptIR, page: Option<&ScriptIR>) -> HashSet<String> {
    match page {
        Some(page) => layout
            .states
            .keys()
            .filter(|name| page.states.contains_key(*name))
            .cloned()
            .collect(),
        None => HashSet::new(),
    }
}
