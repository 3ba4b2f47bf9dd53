//! Component and layout discovery.
//!
//! Recursively scans a directory for `.zen` files and parses each into
//! [`ComponentMetadata`]. Lookup is case-insensitive by file stem. A file that
//! fails to parse is remembered with its error, so using it reports the real
//! problem instead of an unknown component.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use walkdir::WalkDir;

use crate::ir::{SlotNode, ZenIR};
use crate::lexer::{extract_blocks, SourceFile};
use crate::parse::parse_zen_file;
use crate::validate::{CompileResult, CompilerError, ErrorKind};
use crate::visitor::{walk_nodes, TemplateVisitor};

// ═══════════════════════════════════════════════════════════════════════════════
// METADATA TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentMetadata {
    pub name: String,
    pub file_path: String,
    /// Declared props and their default expressions.
    pub props: IndexMap<String, Option<String>>,
    /// Declared states and their initializers.
    pub states: IndexMap<String, String>,
    /// Markup with script and style blocks removed.
    pub html: String,
    pub scripts: Vec<String>,
    pub styles: Vec<String>,
    pub has_slots: bool,
    pub ir: ZenIR,
}

#[derive(Default)]
struct SlotFinder {
    found: bool,
}

impl TemplateVisitor for SlotFinder {
    fn visit_slot(&mut self, _slot: &SlotNode) {
        self.found = true;
    }
}

/// Parses one component or layout from source text.
pub fn parse_component(source: &str, file_path: &str) -> CompileResult<ComponentMetadata> {
    let name = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string())
        .ok_or_else(|| CompilerError::new(ErrorKind::Io, "Invalid component filename.", file_path, 1, 1))?;

    let ir = parse_zen_file(source, file_path)?;
    let file = SourceFile::new(file_path, source);
    let blocks = extract_blocks(&file)?;

    let mut finder = SlotFinder::default();
    walk_nodes(&mut finder, &ir.template.nodes);

    let (props, states) = match &ir.script {
        Some(script) => (
            script
                .props
                .values()
                .map(|p| (p.name.clone(), p.default.clone()))
                .collect(),
            script
                .states
                .values()
                .map(|s| (s.name.clone(), s.value.clone()))
                .collect(),
        ),
        None => (IndexMap::new(), IndexMap::new()),
    };

    Ok(ComponentMetadata {
        name,
        file_path: file_path.to_string(),
        props,
        states,
        html: blocks.markup.trim().to_string(),
        scripts: blocks.scripts.iter().map(|b| b.content.clone()).collect(),
        styles: blocks.styles.iter().map(|b| b.content.trim().to_string()).collect(),
        has_slots: finder.found,
        ir,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Components of one discovery root, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: IndexMap<String, ComponentMetadata>,
    failures: IndexMap<String, CompilerError>,
}

impl ComponentRegistry {
    pub fn insert(&mut self, metadata: ComponentMetadata) {
        let key = metadata.name.to_lowercase();
        if let Some(existing) = self.components.get(&key) {
            tracing::warn!(
                component = %metadata.name,
                kept = %existing.file_path,
                ignored = %metadata.file_path,
                "duplicate component name"
            );
            return;
        }
        self.components.insert(key, metadata);
    }

    fn insert_failure(&mut self, name: &str, error: CompilerError) {
        self.failures.entry(name.to_lowercase()).or_insert(error);
    }

    /// Case-insensitive lookup. A component whose file failed to parse
    /// returns that parse error.
    pub fn lookup(&self, name: &str) -> CompileResult<Option<&ComponentMetadata>> {
        let key = name.to_lowercase();
        if let Some(metadata) = self.components.get(&key) {
            return Ok(Some(metadata));
        }
        match self.failures.get(&key) {
            Some(error) => Err(error.clone()),
            None => Ok(None),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.components.values().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn merge(&mut self, other: &ComponentRegistry) {
        for metadata in other.components.values() {
            self.insert(metadata.clone());
        }
        for (name, error) in &other.failures {
            self.failures.entry(name.clone()).or_insert_with(|| error.clone());
        }
    }
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> CompilerError {
    CompilerError::new(
        ErrorKind::Io,
        &format!("Failed to read {}: {}", path.display(), err),
        &path.to_string_lossy(),
        1,
        1,
    )
}

/// Recursively find all .zen files in a directory, in path order.
pub fn find_zen_files(dir: &Path) -> CompileResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| io_error(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "zen") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Discover all components below `dir`. A missing directory is empty.
pub fn discover_components(dir: &Path) -> CompileResult<ComponentRegistry> {
    let mut registry = ComponentRegistry::default();
    if !dir.exists() {
        return Ok(registry);
    }

    for file_path in find_zen_files(dir)? {
        let source = fs::read_to_string(&file_path).map_err(|e| io_error(&file_path, e))?;
        let path_str = file_path.to_string_lossy().to_string();
        match parse_component(&source, &path_str) {
            Ok(metadata) => registry.insert(metadata),
            Err(error) => {
                tracing::warn!(file = %path_str, code = %error.code, "failed to parse component");
                let name = file_path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                registry.insert_failure(&name, error);
            }
        }
    }

    tracing::debug!(root = %dir.display(), components = registry.len(), "discovered components");
    Ok(registry)
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISCOVERY CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Discovery snapshots per root. Snapshots are immutable and shared; the
/// watch-mode owner invalidates a root when files under it change.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    roots: RwLock<HashMap<PathBuf, Arc<ComponentRegistry>>>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_discover(&self, root: &Path) -> CompileResult<Arc<ComponentRegistry>> {
        if let Ok(roots) = self.roots.read() {
            if let Some(registry) = roots.get(root) {
                return Ok(Arc::clone(registry));
            }
        }
        let registry = Arc::new(discover_components(root)?);
        if let Ok(mut roots) = self.roots.write() {
            roots
                .entry(root.to_path_buf())
                .or_insert_with(|| Arc::clone(&registry));
        }
        Ok(registry)
    }

    pub fn invalidate(&self, root: &Path) {
        if let Ok(mut roots) = self.roots.write() {
            roots.remove(root);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut roots) = self.roots.write() {
            roots.clear();
        }
    }
}
