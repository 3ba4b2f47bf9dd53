//! Lexical extraction over raw `.zen` source.
//!
//! Pulls `<script>`/`<style>` blocks out of the markup and replaces every
//! top-level `{expression}` with a `__ZENITH_EXPR_n__` placeholder so a
//! generic HTML parser can tokenize what remains. Block contents are blanked
//! in place (newlines kept) so byte offsets in the markup still point at the
//! original source.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::ir::SourceLocation;
use crate::validate::{CompileResult, CompilerError, ErrorKind};

lazy_static! {
    pub static ref PLACEHOLDER_RE: Regex = Regex::new(r"__ZENITH_EXPR_(\d+)__").unwrap();
}

pub fn placeholder(n: usize) -> String {
    format!("__ZENITH_EXPR_{}__", n)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCE POSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        LineIndex { starts }
    }

    pub fn location(&self, text: &str, offset: usize) -> SourceLocation {
        let offset = offset.min(text.len());
        let line = match self.starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let start = self.starts[line];
        let column = text
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        SourceLocation::new(line as u32 + 1, column as u32 + 1)
    }

    pub fn line_text<'a>(&self, text: &'a str, line: u32) -> Option<&'a str> {
        let idx = (line as usize).checked_sub(1)?;
        let start = *self.starts.get(idx)?;
        let end = self
            .starts
            .get(idx + 1)
            .map(|e| e - 1)
            .unwrap_or(text.len());
        text.get(start..end)
    }
}

/// A source file plus its line table, used to turn byte offsets into
/// located diagnostics.
#[derive(Debug, Clone)]
pub struct SourceFile<'a> {
    pub path: &'a str,
    pub text: &'a str,
    lines: LineIndex,
}

impl<'a> SourceFile<'a> {
    pub fn new(path: &'a str, text: &'a str) -> Self {
        SourceFile {
            path,
            text,
            lines: LineIndex::new(text),
        }
    }

    pub fn location(&self, offset: usize) -> SourceLocation {
        self.lines.location(self.text, offset)
    }

    pub fn line_text(&self, line: u32) -> Option<&'a str> {
        self.lines.line_text(self.text, line)
    }

    pub fn error(&self, kind: ErrorKind, message: &str, offset: usize) -> CompilerError {
        let location = self.location(offset);
        let error = CompilerError::at(kind, message, self.path, location);
        match self.line_text(location.line) {
            Some(line) => error.with_context(line.trim_end()),
            None => error,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BALANCED BRACES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Brace,
    Template,
    Interpolation,
}

/// Index just past the closing quote of the string starting at `start`.
fn skip_quoted(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

fn find_bytes(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from >= bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

/// Index of the `}` matching the `{` at `open`.
///
/// Braces inside single/double-quoted strings, template literals (with any
/// depth of nested `${...}`) and comments do not count.
pub fn find_matching_brace(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut stack = vec![Frame::Brace];
    let mut i = open + 1;
    while i < bytes.len() {
        let c = bytes[i];
        if stack.last() == Some(&Frame::Template) {
            match c {
                b'\\' => i += 1,
                b'`' => {
                    stack.pop();
                }
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    stack.push(Frame::Interpolation);
                    i += 1;
                }
                _ => {}
            }
            i += 1;
            continue;
        }
        match c {
            b'\'' | b'"' => {
                i = skip_quoted(bytes, i)?;
                continue;
            }
            b'`' => stack.push(Frame::Template),
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = find_bytes(bytes, i + 2, b"*/")? + 2;
                continue;
            }
            b'{' => stack.push(Frame::Brace),
            b'}' => {
                stack.pop();
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn push_segment(segments: &mut Vec<(usize, usize)>, normalized: usize, original: usize) {
    match segments.last_mut() {
        Some(last) if last.0 == normalized => last.1 = original,
        _ => segments.push((normalized, original)),
    }
}

fn is_comment_only(code: &str) -> bool {
    let t = code.trim();
    t.len() >= 4 && t.starts_with("/*") && t.ends_with("*/") && !t[2..t.len() - 2].contains("*/")
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSION NORMALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExpression {
    pub code: String,
    /// Byte offset of the first character of `code` in the source file.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct NormalizedMarkup {
    pub text: String,
    /// Placeholder token to raw expression, in source order.
    pub expressions: IndexMap<String, RawExpression>,
    segments: Vec<(usize, usize)>,
}

impl NormalizedMarkup {
    /// Maps an offset in the normalized text back to the source file.
    pub fn original_offset(&self, normalized: usize) -> usize {
        let idx = match self.segments.binary_search_by(|(n, _)| n.cmp(&normalized)) {
            Ok(i) => i,
            Err(0) => return normalized,
            Err(i) => i - 1,
        };
        let (n, o) = self.segments[idx];
        o + (normalized - n)
    }
}

/// Replaces each top-level `{...}` in `markup` with a placeholder.
///
/// `markup` must share offsets with `file.text` (see [`extract_blocks`]).
/// HTML comments are copied untouched. `{}` and comment-only expressions are
/// dropped. An unclosed `{` or a stray `}` is a hard error.
pub fn normalize_expressions(markup: &str, file: &SourceFile) -> CompileResult<NormalizedMarkup> {
    let bytes = markup.as_bytes();
    let mut text = String::with_capacity(markup.len());
    let mut expressions = IndexMap::new();
    let mut segments = vec![(0usize, 0usize)];
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            match find_bytes(bytes, i + 4, b"-->") {
                Some(end) => {
                    i = end + 3;
                    continue;
                }
                None => {
                    return Err(file.error(
                        ErrorKind::MalformedMarkup,
                        "Unterminated HTML comment.",
                        i,
                    ))
                }
            }
        }
        match bytes[i] {
            b'{' => {
                let close = find_matching_brace(markup, i).ok_or_else(|| {
                    file.error(
                        ErrorKind::UnbalancedBrace,
                        "Unclosed '{' in template expression.",
                        i,
                    )
                    .with_hint("Every '{' in markup must be closed by a matching '}'.")
                })?;
                text.push_str(&markup[copied..i]);
                let code = &markup[i + 1..close];
                if !code.trim().is_empty() && !is_comment_only(code) {
                    let key = placeholder(expressions.len());
                    push_segment(&mut segments, text.len(), i);
                    text.push_str(&key);
                    expressions.insert(
                        key,
                        RawExpression {
                            code: code.to_string(),
                            offset: i + 1,
                        },
                    );
                }
                push_segment(&mut segments, text.len(), close + 1);
                i = close + 1;
                copied = i;
                continue;
            }
            b'}' => {
                return Err(file
                    .error(
                        ErrorKind::UnbalancedBrace,
                        "Unexpected '}' without a matching '{'.",
                        i,
                    )
                    .with_hint("Use &#125; for a literal closing brace in text."))
            }
            _ => {}
        }
        i += 1;
    }
    text.push_str(&markup[copied..]);

    Ok(NormalizedMarkup {
        text,
        expressions,
        segments,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct RawBlock {
    pub content: String,
    pub attributes: IndexMap<String, String>,
    /// Byte offset of the content in the source file.
    pub offset: usize,
}

#[derive(Debug, Clone)]
pub struct ExtractedBlocks {
    /// Source with extracted blocks blanked out.
    pub markup: String,
    pub scripts: Vec<RawBlock>,
    pub styles: Vec<RawBlock>,
}

/// Index of the `>` ending the tag that starts at `start`, honoring quotes.
pub fn find_tag_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
            }
            b'>' => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

/// Parses `name="value" flag other='x'` into an ordered map.
pub fn parse_tag_attributes(s: &str) -> IndexMap<String, String> {
    let bytes = s.as_bytes();
    let mut attrs = IndexMap::new();
    let mut i = 0;
    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'/') {
            i += 1;
        }
        let start = i;
        while i < bytes.len()
            && !bytes[i].is_ascii_whitespace()
            && !matches!(bytes[i], b'=' | b'>' | b'/')
        {
            i += 1;
        }
        if i == start {
            i += 1;
            continue;
        }
        let name = s[start..i].to_string();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let mut value = String::new();
        if i < bytes.len() && bytes[i] == b'=' {
            i += 1;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < bytes.len() && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                let value_start = i + 1;
                let mut end = value_start;
                while end < bytes.len() && bytes[end] != quote {
                    end += 1;
                }
                value = s[value_start..end.min(bytes.len())].to_string();
                i = end + 1;
            } else {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                value = s[value_start..i].to_string();
            }
        }
        attrs.insert(name, value);
    }
    attrs
}

fn blank_into(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '\n' {
            out.push('\n');
        } else {
            for _ in 0..c.len_utf8() {
                out.push(' ');
            }
        }
    }
}

fn block_tag_at(lower: &[u8], i: usize) -> Option<&'static str> {
    for tag in ["script", "style"] {
        let end = i + 1 + tag.len();
        if lower.len() > end
            && &lower[i + 1..end] == tag.as_bytes()
            && (lower[end].is_ascii_whitespace() || lower[end] == b'>' || lower[end] == b'/')
        {
            return Some(tag);
        }
    }
    None
}

/// Extracts `<script>` and `<style>` blocks. Scripts with a `src` attribute
/// stay in the markup untouched.
pub fn extract_blocks(file: &SourceFile) -> CompileResult<ExtractedBlocks> {
    let text = file.text;
    let bytes = text.as_bytes();
    let lower = text.to_ascii_lowercase();
    let lower_bytes = lower.as_bytes();

    let mut markup = String::with_capacity(text.len());
    let mut scripts = Vec::new();
    let mut styles = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<!--") {
            i = find_bytes(bytes, i + 4, b"-->").map(|e| e + 3).unwrap_or(bytes.len());
            continue;
        }
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        let tag = match block_tag_at(lower_bytes, i) {
            Some(tag) => tag,
            None => {
                i += 1;
                continue;
            }
        };
        let open_end = find_tag_end(bytes, i).ok_or_else(|| {
            file.error(
                ErrorKind::UnterminatedBlock,
                &format!("Unterminated <{}> tag.", tag),
                i,
            )
        })?;
        let attributes = parse_tag_attributes(&text[i + 1 + tag.len()..open_end]);
        let content_start = open_end + 1;
        let close_pat = format!("</{}", tag);
        let close_start = find_bytes(lower_bytes, content_start, close_pat.as_bytes())
            .ok_or_else(|| {
                file.error(
                    ErrorKind::UnterminatedBlock,
                    &format!("Unterminated <{}> block: missing </{}>.", tag, tag),
                    i,
                )
            })?;
        let close_end = find_tag_end(bytes, close_start).ok_or_else(|| {
            file.error(
                ErrorKind::UnterminatedBlock,
                &format!("Unterminated </{}> tag.", tag),
                close_start,
            )
        })?;

        if tag == "script" && attributes.contains_key("src") {
            i = close_end + 1;
            continue;
        }

        let block = RawBlock {
            content: text[content_start..close_start].to_string(),
            attributes,
            offset: content_start,
        };
        if tag == "script" {
            scripts.push(block);
        } else {
            styles.push(block);
        }

        markup.push_str(&text[copied..i]);
        blank_into(&mut markup, &text[i..close_end + 1]);
        i = close_end + 1;
        copied = i;
    }
    markup.push_str(&text[copied..]);

    Ok(ExtractedBlocks {
        markup,
        scripts,
        styles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(src: &str) -> CompileResult<NormalizedMarkup> {
        let file = SourceFile::new("test.zen", src);
        normalize_expressions(src, &file)
    }

    fn codes(src: &str) -> Vec<String> {
        normalize(src)
            .unwrap()
            .expressions
            .values()
            .map(|e| e.code.clone())
            .collect()
    }

    #[test]
    fn test_simple_placeholders() {
        let n = normalize("<p>{a} and {b}</p>").unwrap();
        assert_eq!(n.text, "<p>__ZENITH_EXPR_0__ and __ZENITH_EXPR_1__</p>");
        assert_eq!(codes("<p>{a} and {b}</p>"), vec!["a", "b"]);
    }

    #[test]
    fn test_brace_inside_string_in_object_literal() {
        assert_eq!(
            codes(r#"<p>{() => ({a: "}"}).a}</p>"#),
            vec![r#"() => ({a: "}"}).a"#]
        );
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(
            codes(r#"<p>{'it\'s }' + "say \"}\""}</p>"#),
            vec![r#"'it\'s }' + "say \"}\"""#]
        );
    }

    #[test]
    fn test_nested_template_literal_interpolations() {
        let src = "<p>{`a ${ {x: `}${ {y: 1}.y }`}.x } b`}</p>";
        assert_eq!(codes(src), vec!["`a ${ {x: `}${ {y: 1}.y }`}.x } b`"]);
    }

    #[test]
    fn test_multiline_template_literal() {
        let src = "<div>{`line one }\nline ${two}\n`}</div>";
        assert_eq!(codes(src), vec!["`line one }\nline ${two}\n`"]);
    }

    #[test]
    fn test_apostrophe_in_text_is_not_a_string() {
        assert_eq!(codes("<p>Don't {name}</p>"), vec!["name"]);
    }

    #[test]
    fn test_empty_expression_ignored() {
        let n = normalize("<p>{}{ }{/* note */}x</p>").unwrap();
        assert!(n.expressions.is_empty());
        assert_eq!(n.text, "<p>x</p>");
    }

    #[test]
    fn test_unclosed_brace_is_error() {
        let err = normalize("<p>\n  {count + 1</p>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBrace);
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_stray_closing_brace_is_error() {
        let err = normalize("<p>a } b</p>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBrace);
        assert_eq!(err.column, 6);
    }

    #[test]
    fn test_unterminated_string_inside_expression() {
        let err = normalize("<p>{'abc}</p>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnbalancedBrace);
    }

    #[test]
    fn test_comments_are_skipped() {
        let n = normalize("<!-- {not} } --><p>{yes}</p>").unwrap();
        assert_eq!(n.expressions.len(), 1);
        assert!(n.text.starts_with("<!-- {not} } -->"));
    }

    #[test]
    fn test_original_offset_mapping() {
        let src = "<p>{first}</p><b>x</b>";
        let n = normalize(src).unwrap();
        let norm_b = n.text.find("<b>").unwrap();
        assert_eq!(n.original_offset(norm_b), src.find("<b>").unwrap());
        assert_eq!(n.original_offset(0), 0);
    }

    #[test]
    fn test_extract_blocks_preserves_offsets() {
        let src = "<script>\nstate count = 0\n</script>\n<p>{count}</p>\n<style>p { color: red; }</style>";
        let file = SourceFile::new("test.zen", src);
        let blocks = extract_blocks(&file).unwrap();
        assert_eq!(blocks.markup.len(), src.len());
        assert_eq!(blocks.scripts.len(), 1);
        assert_eq!(blocks.scripts[0].content, "\nstate count = 0\n");
        assert_eq!(blocks.styles[0].content, "p { color: red; }");
        assert_eq!(
            blocks.markup.find("<p>").unwrap(),
            src.find("<p>").unwrap()
        );
        assert!(!blocks.markup.contains("color"));
    }

    #[test]
    fn test_script_attributes_and_src_scripts() {
        let src = r#"<script props="title, count" lang=ts>let a = 1</script><script src="/x.js"></script>"#;
        let file = SourceFile::new("test.zen", src);
        let blocks = extract_blocks(&file).unwrap();
        assert_eq!(blocks.scripts.len(), 1);
        assert_eq!(blocks.scripts[0].attributes["props"], "title, count");
        assert_eq!(blocks.scripts[0].attributes["lang"], "ts");
        assert!(blocks.markup.contains(r#"<script src="/x.js"></script>"#));
    }

    #[test]
    fn test_unterminated_script_block() {
        let src = "<p>hi</p>\n<script>\nstate a = 1\n";
        let file = SourceFile::new("test.zen", src);
        let err = extract_blocks(&file).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedBlock);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_line_index() {
        let text = "ab\ncdé\nf";
        let index = LineIndex::new(text);
        assert_eq!(index.location(text, 0), SourceLocation::new(1, 1));
        assert_eq!(index.location(text, 4), SourceLocation::new(2, 2));
        assert_eq!(index.location(text, text.len() - 1), SourceLocation::new(3, 1));
        assert_eq!(index.line_text(text, 2), Some("cdé"));
    }
}
