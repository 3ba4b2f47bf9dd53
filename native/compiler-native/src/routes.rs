//! Route manifest generation.
//!
//! Page files map to route patterns by path: `index` segments vanish,
//! `[id]` is a dynamic segment, `[...rest]` a required catch-all and
//! `[[...rest]]` an optional one. Routes are ordered by score, highest
//! first, and the client router takes the first regex that matches, so the
//! order is part of the matching semantics.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::discovery::find_zen_files;
use crate::validate::{CompileResult, CompilerError, ErrorKind};

const ROOT_SCORE: u32 = 100;
const STATIC_BONUS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SegmentType {
    Static,
    Dynamic,
    CatchAll,
    OptionalCatchAll,
}

impl SegmentType {
    fn weight(self) -> u32 {
        match self {
            SegmentType::Static => 10 + STATIC_BONUS,
            SegmentType::Dynamic => 5,
            SegmentType::CatchAll => 1,
            SegmentType::OptionalCatchAll => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSegment {
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub param_name: Option<String>,
    pub raw: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    pub path: String,
    pub segments: Vec<ParsedSegment>,
    pub param_names: Vec<String>,
    pub score: u32,
    pub file_path: String,
    pub regex: String,
}

/// The shape the client router consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteManifestEntry {
    pub path: String,
    pub regex: String,
    pub param_names: Vec<String>,
    pub score: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'m> {
    pub route: &'m RouteDefinition,
    pub params: IndexMap<String, String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PATTERNS
// ═══════════════════════════════════════════════════════════════════════════════

fn route_segment(name: &str) -> String {
    if let Some(param) = name.strip_prefix("[[...").and_then(|n| n.strip_suffix("]]")) {
        format!("*{}?", param)
    } else if let Some(param) = name.strip_prefix("[...").and_then(|n| n.strip_suffix(']')) {
        format!("*{}", param)
    } else if let Some(param) = name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        format!(":{}", param)
    } else {
        name.to_string()
    }
}

/// `blog/[id].zen` becomes `/blog/:id`; `docs/[[...slug]].zen` becomes
/// `/docs/*slug?`.
pub fn file_path_to_route_path(relative: &str) -> String {
    let normalized = relative.replace('\\', "/");
    let without_ext = normalized.strip_suffix(".zen").unwrap_or(&normalized);
    let segments: Vec<String> = without_ext
        .split('/')
        .filter(|s| !s.is_empty() && *s != "index")
        .map(route_segment)
        .collect();
    format!("/{}", segments.join("/"))
}

pub fn parse_route_segments(path: &str) -> Vec<ParsedSegment> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|raw| {
            let (segment_type, param_name) = if let Some(name) =
                raw.strip_prefix('*').and_then(|r| r.strip_suffix('?'))
            {
                (SegmentType::OptionalCatchAll, Some(name))
            } else if let Some(name) = raw.strip_prefix('*') {
                (SegmentType::CatchAll, Some(name))
            } else if let Some(name) = raw.strip_prefix(':') {
                (SegmentType::Dynamic, Some(name))
            } else {
                (SegmentType::Static, None)
            };
            ParsedSegment {
                segment_type,
                param_name: param_name.map(String::from),
                raw: raw.to_string(),
            }
        })
        .collect()
}

pub fn route_score(segments: &[ParsedSegment]) -> u32 {
    if segments.is_empty() {
        return ROOT_SCORE;
    }
    segments.iter().map(|s| s.segment_type.weight()).sum()
}

/// Anchored pattern with an optional trailing slash. Catch-alls capture the
/// rest of the path greedily.
pub fn route_regex(segments: &[ParsedSegment]) -> String {
    if segments.is_empty() {
        return "^/?$".to_string();
    }
    let mut pattern = String::from("^");
    for segment in segments {
        match segment.segment_type {
            SegmentType::Static => {
                pattern.push('/');
                pattern.push_str(&regex::escape(&segment.raw));
            }
            SegmentType::Dynamic => pattern.push_str("/([^/]+)"),
            SegmentType::CatchAll => pattern.push_str("/(.+)"),
            SegmentType::OptionalCatchAll => pattern.push_str("(?:/(.*))?"),
        }
    }
    pattern.push_str("/?$");
    pattern
}

/// Route for one page, `relative` being its path below the pages directory.
pub fn generate_route_definition(relative: &str, file_path: &str) -> RouteDefinition {
    let path = file_path_to_route_path(relative);
    let segments = parse_route_segments(&path);
    RouteDefinition {
        param_names: segments
            .iter()
            .filter_map(|s| s.param_name.clone())
            .collect(),
        score: route_score(&segments),
        regex: route_regex(&segments),
        path,
        segments,
        file_path: file_path.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANIFEST
// ═══════════════════════════════════════════════════════════════════════════════

/// Sorts by score descending, then path ascending. Two pages claiming the
/// same path keep the first in input order.
pub fn build_manifest(mut routes: Vec<RouteDefinition>) -> Vec<RouteDefinition> {
    let mut seen = std::collections::HashSet::new();
    routes.retain(|route| {
        if seen.insert(route.path.clone()) {
            true
        } else {
            tracing::warn!(path = %route.path, file = %route.file_path, "duplicate route ignored");
            false
        }
    });
    routes.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
    routes
}

/// Scans `pages_dir` for `.zen` pages and returns the ordered manifest.
pub fn generate_route_manifest(pages_dir: &Path) -> CompileResult<Vec<RouteDefinition>> {
    if !pages_dir.is_dir() {
        return Err(CompilerError::new(
            ErrorKind::Io,
            &format!("Pages directory not found: {}", pages_dir.display()),
            &pages_dir.to_string_lossy(),
            1,
            1,
        ));
    }

    let mut routes = Vec::new();
    for file in find_zen_files(pages_dir)? {
        let relative = file
            .strip_prefix(pages_dir)
            .unwrap_or(&file)
            .to_string_lossy()
            .to_string();
        routes.push(generate_route_definition(&relative, &file.to_string_lossy()));
    }
    let manifest = build_manifest(routes);
    tracing::debug!(root = %pages_dir.display(), routes = manifest.len(), "route manifest generated");
    Ok(manifest)
}

pub fn manifest_entries(routes: &[RouteDefinition]) -> Vec<RouteManifestEntry> {
    routes
        .iter()
        .map(|r| RouteManifestEntry {
            path: r.path.clone(),
            regex: r.regex.clone(),
            param_names: r.param_names.clone(),
            score: r.score,
        })
        .collect()
}

/// First route in manifest order whose pattern matches `path`.
pub fn match_route<'m>(manifest: &'m [RouteDefinition], path: &str) -> Option<RouteMatch<'m>> {
    for route in manifest {
        let regex = match Regex::new(&route.regex) {
            Ok(regex) => regex,
            Err(e) => {
                tracing::warn!(path = %route.path, error = %e, "invalid route pattern");
                continue;
            }
        };
        if let Some(captures) = regex.captures(path) {
            let mut params = IndexMap::new();
            for (name, value) in route.param_names.iter().zip(captures.iter().skip(1)) {
                if let Some(value) = value {
                    params.insert(name.clone(), value.as_str().to_string());
                }
            }
            return Some(RouteMatch { route, params });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn manifest(files: &[&str]) -> Vec<RouteDefinition> {
        build_manifest(
            files
                .iter()
                .map(|f| generate_route_definition(f, &format!("pages/{}", f)))
                .collect(),
        )
    }

    #[test]
    fn test_file_paths_to_patterns() {
        assert_eq!(file_path_to_route_path("index.zen"), "/");
        assert_eq!(file_path_to_route_path("blog/index.zen"), "/blog");
        assert_eq!(file_path_to_route_path("blog/[id].zen"), "/blog/:id");
        assert_eq!(file_path_to_route_path("[...slug].zen"), "/*slug");
        assert_eq!(file_path_to_route_path("docs\\[[...path]].zen"), "/docs/*path?");
    }

    #[test]
    fn test_scores() {
        let score = |f: &str| generate_route_definition(f, f).score;
        assert_eq!(score("index.zen"), 100);
        assert_eq!(score("blog/archive.zen"), 24);
        assert_eq!(score("blog/[id].zen"), 17);
        assert_eq!(score("[...catchall].zen"), 1);
        assert_eq!(score("docs/[[...path]].zen"), 12);
        assert!(score("blog/[id].zen") < score("blog/archive.zen"));
        assert!(score("[...catchall].zen") < score("blog/[id].zen"));
    }

    #[test]
    fn test_static_route_wins_over_dynamic() {
        let routes = manifest(&["[...catchall].zen", "blog/[id].zen", "blog/archive.zen", "index.zen"]);
        let paths: Vec<&str> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/blog/archive", "/blog/:id", "/*catchall"]);

        let hit = match_route(&routes, "/blog/archive").unwrap();
        assert_eq!(hit.route.path, "/blog/archive");
        assert!(hit.params.is_empty());

        let hit = match_route(&routes, "/blog/42/").unwrap();
        assert_eq!(hit.route.path, "/blog/:id");
        assert_eq!(hit.params.get("id").map(String::as_str), Some("42"));

        let hit = match_route(&routes, "/a/b/c").unwrap();
        assert_eq!(hit.route.path, "/*catchall");
        assert_eq!(hit.params.get("catchall").map(String::as_str), Some("a/b/c"));
    }

    #[test]
    fn test_optional_catch_all() {
        let routes = manifest(&["docs/[[...path]].zen"]);
        let bare = match_route(&routes, "/docs").unwrap();
        assert!(bare.params.is_empty());
        let deep = match_route(&routes, "/docs/guide/intro").unwrap();
        assert_eq!(deep.params.get("path").map(String::as_str), Some("guide/intro"));
        assert!(match_route(&routes, "/doc").is_none());
    }

    #[test]
    fn test_static_segments_are_escaped() {
        let route = generate_route_definition("v1.2/notes.zen", "v1.2/notes.zen");
        assert_eq!(route.regex, r"^/v1\.2/notes/?$");
        let routes = vec![route];
        assert!(match_route(&routes, "/v1x2/notes").is_none());
    }

    #[test]
    fn test_ties_sort_by_path() {
        let routes = manifest(&["b/[x].zen", "a/[y].zen"]);
        assert_eq!(routes[0].path, "/a/:y");
        assert_eq!(routes[1].path, "/b/:x");
    }

    #[test]
    fn test_manifest_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("blog")).unwrap();
        fs::write(dir.path().join("index.zen"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("blog/[slug].zen"), "<h1>post</h1>").unwrap();
        fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let routes = generate_route_manifest(dir.path()).unwrap();
        let entries = manifest_entries(&routes);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].path, "/");
        assert_eq!(entries[1].param_names, vec!["slug".to_string()]);
        let json = serde_json::to_value(&routes[1].segments[1]).unwrap();
        assert_eq!(json["type"], "dynamic");
    }
}
