use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::config::CompileOptions;
use crate::finalize::CompileOutput;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub output: CompileOutput,
}

/// In-memory compile outputs keyed by content hash. Identical input always
/// produces identical output, so a hit can be returned as is.
#[derive(Debug, Default)]
pub struct CompileCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CompileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash over everything that changes the output: source text, file path
    /// and the options fingerprint.
    pub fn compute_hash(source: &str, file_path: &str, options: &CompileOptions) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_path.as_bytes());
        hasher.update([0u8]);
        hasher.update(options.fingerprint().as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, file_path: &str, source: &str, options: &CompileOptions) -> Option<CompileOutput> {
        let hash = Self::compute_hash(source, file_path, options);
        let entries = self.entries.read().ok()?;
        entries
            .get(file_path)
            .filter(|entry| entry.hash == hash)
            .map(|entry| entry.output.clone())
    }

    pub fn set(&self, file_path: &str, source: &str, options: &CompileOptions, output: CompileOutput) {
        let hash = Self::compute_hash(source, file_path, options);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(file_path.to_string(), CacheEntry { hash, output });
        }
    }

    pub fn invalidate(&self, file_path: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(file_path);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(html: &str) -> CompileOutput {
        CompileOutput {
            html: html.to_string(),
            js: String::new(),
            styles: vec![],
            npm_imports: vec![],
            bundle_plan: None,
        }
    }

    #[test]
    fn test_hit_requires_same_source_and_options() {
        let cache = CompileCache::new();
        let options = CompileOptions::default();
        cache.set("a.zen", "<p>1</p>", &options, output("<p>1</p>"));

        assert_eq!(cache.get("a.zen", "<p>1</p>", &options).unwrap().html, "<p>1</p>");
        assert!(cache.get("a.zen", "<p>2</p>", &options).is_none());

        let strict_off = CompileOptions {
            strict_references: false,
            ..CompileOptions::default()
        };
        assert!(cache.get("a.zen", "<p>1</p>", &strict_off).is_none());

        cache.invalidate("a.zen");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = CompileCache::compute_hash("x", "a.zen", &CompileOptions::default());
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
