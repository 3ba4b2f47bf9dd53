//! Script analyzer for the declarative `<script>` subset.
//!
//! A small JavaScript tokenizer (strings, template literals, regex literals
//! and comments are single tokens, so `state` inside a string never matches)
//! feeds a statement splitter that classifies each top-level statement into a
//! typed [`ScriptStatement`].

use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::ir::{
    ImportDeclaration, LoopContext, PropDeclaration, ScriptBlock, ScriptIR, ScriptStatement,
    SourceLocation, StateDeclarationInfo, TextSpan,
};
use crate::lexer::{find_matching_brace, RawBlock, SourceFile};
use crate::validate::{CompileResult, CompilerError, ErrorKind};

// ═══════════════════════════════════════════════════════════════════════════════
// TOKENIZER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Punct,
    Str,
    Template,
    Regex,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
    pub newline_before: bool,
}

impl<'a> Token<'a> {
    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizeError {
    pub offset: usize,
    pub message: &'static str,
}

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==",
    "!=", "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "**", "<<", ">>",
];

/// Keywords after which a `/` starts a regular expression.
const REGEX_PREFIX_KEYWORDS: &[&str] = &[
    "return", "typeof", "case", "do", "else", "in", "instanceof", "new", "delete", "void",
    "throw", "yield", "await", "of",
];

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$' || !c.is_ascii()
}

fn is_ident_part(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(t) => match t.kind {
            TokenKind::Punct => !matches!(t.text, ")" | "]" | "}"),
            TokenKind::Ident => REGEX_PREFIX_KEYWORDS.contains(&t.text),
            _ => false,
        },
    }
}

fn skip_template(src: &str, start: usize) -> Result<usize, TokenizeError> {
    let bytes = src.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Ok(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                let close = find_matching_brace(src, i + 1).ok_or(TokenizeError {
                    offset: i,
                    message: "Unterminated template literal interpolation.",
                })?;
                i = close + 1;
            }
            _ => i += 1,
        }
    }
    Err(TokenizeError {
        offset: start,
        message: "Unterminated template literal.",
    })
}

fn skip_regex(bytes: &[u8], start: usize) -> Result<usize, TokenizeError> {
    let mut i = start + 1;
    let mut in_class = false;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            b'[' => in_class = true,
            b']' => in_class = false,
            b'/' if !in_class => {
                i += 1;
                while i < bytes.len() && (bytes[i] as char).is_ascii_alphabetic() {
                    i += 1;
                }
                return Ok(i);
            }
            b'\n' => break,
            _ => {}
        }
        i += 1;
    }
    Err(TokenizeError {
        offset: start,
        message: "Unterminated regular expression literal.",
    })
}

pub fn tokenize(src: &str) -> Result<Vec<Token<'_>>, TokenizeError> {
    let bytes = src.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;
    let mut newline_before = false;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'\n' {
            newline_before = true;
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'/') {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == b'/' && bytes.get(i + 1) == Some(&b'*') {
            let body = &src[i + 2..];
            let end = body.find("*/").ok_or(TokenizeError {
                offset: i,
                message: "Unterminated block comment.",
            })?;
            if body[..end].contains('\n') {
                newline_before = true;
            }
            i += 2 + end + 2;
            continue;
        }

        let start = i;
        let kind;
        if c == b'"' || c == b'\'' {
            i += 1;
            loop {
                match bytes.get(i) {
                    Some(b'\\') => i += 2,
                    Some(&q) if q == c => {
                        i += 1;
                        break;
                    }
                    Some(b'\n') | None => {
                        return Err(TokenizeError {
                            offset: start,
                            message: "Unterminated string literal.",
                        })
                    }
                    Some(_) => i += 1,
                }
            }
            kind = TokenKind::Str;
        } else if c == b'`' {
            i = skip_template(src, i)?;
            kind = TokenKind::Template;
        } else if c.is_ascii_digit()
            || (c == b'.' && bytes.get(i + 1).map_or(false, |b| b.is_ascii_digit()))
        {
            i += 1;
            while i < bytes.len() {
                let b = bytes[i];
                if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                    i += 1;
                } else if (b == b'+' || b == b'-') && matches!(bytes[i - 1], b'e' | b'E') {
                    i += 1;
                } else {
                    break;
                }
            }
            kind = TokenKind::Number;
        } else if c == b'/' && regex_allowed(tokens.last()) {
            i = skip_regex(bytes, i)?;
            kind = TokenKind::Regex;
        } else {
            let ch = src[i..].chars().next().unwrap_or(' ');
            if is_ident_start(ch) {
                i += ch.len_utf8();
                while let Some(next) = src[i..].chars().next() {
                    if !is_ident_part(next) {
                        break;
                    }
                    i += next.len_utf8();
                }
                kind = TokenKind::Ident;
            } else {
                let rest = &src[i..];
                let len = PUNCTUATORS
                    .iter()
                    .find(|p| rest.starts_with(*p))
                    .map(|p| p.len())
                    .unwrap_or(ch.len_utf8());
                i += len;
                kind = TokenKind::Punct;
            }
        }

        tokens.push(Token {
            kind,
            text: &src[start..i],
            start,
            end: i,
            newline_before,
        });
        newline_before = false;
    }

    Ok(tokens)
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT SPLITTING
// ═══════════════════════════════════════════════════════════════════════════════

fn depth_delta(token: &Token) -> i32 {
    if token.kind != TokenKind::Punct {
        return 0;
    }
    match token.text {
        "(" | "[" | "{" => 1,
        ")" | "]" | "}" => -1,
        _ => 0,
    }
}

/// Whether `next`, on a new line, continues the statement ending in `last`.
fn continues(last: &Token, next: &Token) -> bool {
    if last.kind == TokenKind::Punct && !matches!(last.text, ")" | "]" | "}" | "++" | "--") {
        return true;
    }
    match next.kind {
        TokenKind::Punct => !matches!(next.text, "(" | "[" | "{" | "++" | "--" | "!" | "~"),
        TokenKind::Ident => matches!(
            next.text,
            "else" | "catch" | "finally" | "instanceof" | "in" | "of"
        ),
        _ => false,
    }
}

fn is_block_declaration(tokens: &[Token]) -> bool {
    match tokens.first() {
        Some(t) if t.is_ident("function") || t.is_ident("class") => true,
        Some(t) if t.is_ident("async") => tokens.get(1).map_or(false, |n| n.is_ident("function")),
        Some(t) if t.is_ident("export") => is_block_declaration(&tokens[1..]),
        _ => false,
    }
}

/// Splits a token stream into top-level statements (token index ranges).
pub fn split_statements(tokens: &[Token]) -> Vec<std::ops::Range<usize>> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut depth = 0i32;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        depth += depth_delta(token);
        if depth < 0 {
            depth = 0;
        }
        let mut end_here = false;
        if depth == 0 {
            if token.is_punct(";") {
                end_here = true;
            } else if token.is_punct("}") && is_block_declaration(&tokens[start..=i]) {
                end_here = !tokens
                    .get(i + 1)
                    .map_or(false, |n| n.is_punct(".") || n.is_punct("("));
            } else if let Some(next) = tokens.get(i + 1) {
                if next.newline_before && !continues(token, next) {
                    end_here = true;
                }
            }
        }
        if end_here {
            ranges.push(start..i + 1);
            start = i + 1;
        }
        i += 1;
    }
    if start < tokens.len() {
        ranges.push(start..tokens.len());
    }
    ranges
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENT CLASSIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

fn statement_span(tokens: &[Token]) -> TextSpan {
    match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => TextSpan::new(first.start, last.end),
        _ => TextSpan::default(),
    }
}

/// Source of the expression between `tokens[from]` and the end of the
/// statement, without a trailing `;`.
fn tail_text(src: &str, tokens: &[Token], from: usize) -> Option<String> {
    let mut end = tokens.len();
    if tokens.last().map_or(false, |t| t.is_punct(";")) {
        end -= 1;
    }
    if from >= end {
        return None;
    }
    Some(src[tokens[from].start..tokens[end - 1].end].trim().to_string())
}

fn unquote(s: &str) -> String {
    if s.len() >= 2 {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn import_locals(tokens: &[Token]) -> Vec<String> {
    let mut locals = Vec::new();
    let mut i = 1;
    if tokens.get(1).map_or(false, |t| t.is_ident("type")) {
        return locals;
    }
    while i < tokens.len() {
        let t = &tokens[i];
        if t.is_ident("from") || t.kind == TokenKind::Str {
            break;
        }
        if t.is_punct("*") {
            if let Some(local) = tokens.get(i + 2) {
                locals.push(local.text.to_string());
            }
            i += 3;
            continue;
        }
        if t.is_punct("{") {
            i += 1;
            while i < tokens.len() && !tokens[i].is_punct("}") {
                let imported = &tokens[i];
                if imported.kind == TokenKind::Ident && !imported.is_ident("type") {
                    if tokens.get(i + 1).map_or(false, |n| n.is_ident("as")) {
                        if let Some(local) = tokens.get(i + 2) {
                            locals.push(local.text.to_string());
                        }
                        i += 3;
                        continue;
                    }
                    locals.push(imported.text.to_string());
                }
                i += 1;
            }
        } else if t.kind == TokenKind::Ident {
            locals.push(t.text.to_string());
        }
        i += 1;
    }
    locals
}

/// Binding names introduced by a destructuring pattern starting at `tokens[0]`.
fn pattern_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0;
    for (i, t) in tokens.iter().enumerate() {
        depth += depth_delta(t);
        if t.kind == TokenKind::Ident {
            let next = tokens.get(i + 1);
            let prev = if i > 0 { tokens.get(i - 1) } else { None };
            let is_key = next.map_or(false, |n| n.is_punct(":"));
            let is_default_value = prev.map_or(false, |p| p.is_punct("="));
            let ends_binding = next.map_or(true, |n| {
                n.is_punct(",") || n.is_punct("}") || n.is_punct("]") || n.is_punct("=")
            });
            if !is_key && !is_default_value && ends_binding {
                names.push(t.text.to_string());
            }
        }
        if depth == 0 && i > 0 {
            break;
        }
    }
    names
}

fn initializer_is_function(tokens: &[Token]) -> bool {
    let eq = match tokens.iter().position(|t| t.is_punct("=")) {
        Some(eq) => eq,
        None => return false,
    };
    let mut i = eq + 1;
    if tokens.get(i).map_or(false, |t| t.is_ident("async")) {
        i += 1;
    }
    match tokens.get(i) {
        Some(t) if t.is_ident("function") => true,
        Some(t) if t.kind == TokenKind::Ident => tokens.get(i + 1).map_or(false, |n| n.is_punct("=>")),
        Some(t) if t.is_punct("(") => {
            let mut depth = 0;
            for (j, t) in tokens.iter().enumerate().skip(i) {
                depth += depth_delta(t);
                if depth == 0 {
                    return tokens.get(j + 1).map_or(false, |n| n.is_punct("=>"));
                }
            }
            false
        }
        _ => false,
    }
}

fn declarator_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0;
    let mut expect_binding = true;
    for (i, t) in tokens.iter().enumerate().skip(1) {
        if expect_binding && depth == 0 {
            if t.kind == TokenKind::Ident {
                names.push(t.text.to_string());
            } else if t.is_punct("{") || t.is_punct("[") {
                names.extend(pattern_names(&tokens[i..]));
            }
            expect_binding = false;
        }
        depth += depth_delta(t);
        if depth == 0 && t.is_punct(",") {
            expect_binding = true;
        }
    }
    names
}

/// Classifies one top-level statement.
pub fn classify_statement(src: &str, tokens: &[Token]) -> ScriptStatement {
    let span = statement_span(tokens);
    let first = match tokens.first() {
        Some(t) => t,
        None => return ScriptStatement::Other { span },
    };
    let second = tokens.get(1);
    let third = tokens.get(2);

    if first.is_ident("export") && tokens.len() > 1 && !tokens[1].is_ident("default") {
        let inner = classify_statement(src, &tokens[1..]);
        return match inner {
            ScriptStatement::Function { name, .. } => ScriptStatement::Function { name, span },
            ScriptStatement::Variable {
                names, function, ..
            } => ScriptStatement::Variable {
                names,
                function,
                span,
            },
            _ => ScriptStatement::Other { span },
        };
    }

    let declares = |keyword: &str| {
        first.is_ident(keyword)
            && second.map_or(false, |t| t.kind == TokenKind::Ident)
            && third.map_or(true, |t| t.is_punct("=") || t.is_punct(";"))
    };

    if declares("state") {
        let name = tokens[1];
        let value = if third.map_or(false, |t| t.is_punct("=")) {
            tail_text(src, tokens, 3)
        } else {
            None
        };
        return ScriptStatement::State {
            name: name.text.to_string(),
            value: value.unwrap_or_else(|| "undefined".to_string()),
            head: TextSpan::new(first.start, name.end),
            span,
        };
    }

    if declares("prop") {
        let default = if third.map_or(false, |t| t.is_punct("=")) {
            tail_text(src, tokens, 3)
        } else {
            None
        };
        return ScriptStatement::Prop {
            name: tokens[1].text.to_string(),
            default,
            span,
        };
    }

    if first.is_ident("import") && !second.map_or(false, |t| t.is_punct("(") || t.is_punct(".")) {
        let source = tokens
            .iter()
            .rev()
            .find(|t| t.kind == TokenKind::Str)
            .map(|t| unquote(t.text))
            .unwrap_or_default();
        return ScriptStatement::Import {
            source,
            locals: import_locals(tokens),
            span,
        };
    }

    let mut fn_index = 0;
    if first.is_ident("async") {
        fn_index = 1;
    }
    if tokens.get(fn_index).map_or(false, |t| t.is_ident("function")) {
        let mut name_index = fn_index + 1;
        if tokens.get(name_index).map_or(false, |t| t.is_punct("*")) {
            name_index += 1;
        }
        if let Some(name) = tokens.get(name_index).filter(|t| t.kind == TokenKind::Ident) {
            return ScriptStatement::Function {
                name: name.text.to_string(),
                span,
            };
        }
    }

    if first.is_ident("let") || first.is_ident("const") || first.is_ident("var") {
        return ScriptStatement::Variable {
            names: declarator_names(tokens),
            function: initializer_is_function(tokens),
            span,
        };
    }

    if first.is_ident("class") {
        if let Some(name) = second.filter(|t| t.kind == TokenKind::Ident) {
            return ScriptStatement::Variable {
                names: vec![name.text.to_string()],
                function: false,
                span,
            };
        }
    }

    ScriptStatement::Other { span }
}

/// Tokenizes and classifies every top-level statement of `src`.
pub fn parse_statements(src: &str) -> Result<Vec<ScriptStatement>, TokenizeError> {
    let tokens = tokenize(src)?;
    Ok(split_statements(&tokens)
        .into_iter()
        .map(|range| classify_statement(src, &tokens[range]))
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK ANALYSIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Replaces the `state`/`prop` keywords with equal-length `let` so a standard
/// JavaScript parser accepts the block. Offsets are unchanged.
pub fn blank_declaration_keywords(block: &ScriptBlock) -> String {
    let mut out = block.raw.clone();
    for statement in &block.statements {
        match statement {
            ScriptStatement::State { head, .. } => {
                out.replace_range(head.start..head.start + 5, "let  ");
            }
            ScriptStatement::Prop { span, .. } => {
                out.replace_range(span.start..span.start + 4, "let ");
            }
            _ => {}
        }
    }
    out
}

fn check_block_syntax(block: &ScriptBlock, file: &str) -> CompileResult<()> {
    let parsable = blank_declaration_keywords(block);
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_module(true)
        .with_typescript(true)
        .with_jsx(true);
    let ret = Parser::new(&allocator, &parsable, source_type).parse();
    if let Some(error) = ret.errors.first() {
        return Err(CompilerError::at(
            ErrorKind::InvalidScript,
            &format!("Invalid script syntax: {:?}", error),
            file,
            block.location,
        ));
    }
    Ok(())
}

pub fn build_block(
    index: usize,
    raw: &str,
    attributes: IndexMap<String, String>,
    location: SourceLocation,
    file: &str,
) -> CompileResult<ScriptBlock> {
    let statements = parse_statements(raw).map_err(|e| {
        let at = location.advance(&raw[..e.offset.min(raw.len())]);
        CompilerError::at(ErrorKind::InvalidScript, e.message, file, at)
    })?;
    let block = ScriptBlock {
        index,
        raw: raw.to_string(),
        attributes,
        location,
        synthetic: false,
        source_file: None,
        statements,
    };
    check_block_syntax(&block, file)?;
    Ok(block)
}

/// Merges one block's declarations into `script`. A state name declared a
/// second time, in this block or an earlier one, is rejected.
pub fn merge_block(script: &mut ScriptIR, block: ScriptBlock, file: &str) -> CompileResult<()> {
    for statement in &block.statements {
        match statement {
            ScriptStatement::State {
                name, value, head, ..
            } => {
                let at = block.location_of(head.start);
                if let Some(first) = script.states.get(name) {
                    let first_loc = SourceLocation::new(first.line, first.column);
                    return Err(CompilerError::at(
                        ErrorKind::StateRedeclaration {
                            name: name.clone(),
                            first: first_loc,
                            second: at,
                        },
                        &format!(
                            "State '{}' is already declared at {}:{} (script {}).",
                            name, first_loc.line, first_loc.column, first.script_index
                        ),
                        file,
                        at,
                    )
                    .with_context(block.line_text(head.start))
                    .with_hint("Declare each state once and assign it inside an event handler."));
                }
                script.states.insert(
                    name.clone(),
                    StateDeclarationInfo {
                        name: name.clone(),
                        value: value.clone(),
                        script_index: block.index,
                        line: at.line,
                        column: at.column,
                    },
                );
            }
            ScriptStatement::Prop {
                name,
                default,
                span,
            } => {
                let at = block.location_of(span.start);
                script.props.entry(name.clone()).or_insert(PropDeclaration {
                    name: name.clone(),
                    default: default.clone(),
                    script_index: block.index,
                    line: at.line,
                    column: at.column,
                });
            }
            ScriptStatement::Import {
                source,
                locals,
                span,
            } => script.imports.push(ImportDeclaration {
                source: source.clone(),
                code: block.raw[span.start..span.end].trim().to_string(),
                locals: locals.clone(),
                script_index: block.index,
            }),
            ScriptStatement::Function { name, .. } => {
                if !script.functions.contains(name) {
                    script.functions.push(name.clone());
                }
            }
            ScriptStatement::Variable { names, .. } => {
                for name in names {
                    if !script.variables.contains(name) {
                        script.variables.push(name.clone());
                    }
                }
            }
            ScriptStatement::Other { .. } => {}
        }
    }

    if let Some(list) = block.attributes.get("props") {
        for name in list.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            script
                .props
                .entry(name.to_string())
                .or_insert(PropDeclaration {
                    name: name.to_string(),
                    default: None,
                    script_index: block.index,
                    line: block.location.line,
                    column: block.location.column,
                });
        }
    }

    script.blocks.push(block);
    Ok(())
}

/// Builds the merged script IR for all `<script>` blocks of one file.
pub fn analyze_scripts(blocks: &[RawBlock], file: &SourceFile) -> CompileResult<Option<ScriptIR>> {
    if blocks.is_empty() {
        return Ok(None);
    }
    let mut script = ScriptIR::default();
    for (index, raw) in blocks.iter().enumerate() {
        let block = build_block(
            index,
            &raw.content,
            raw.attributes.clone(),
            file.location(raw.offset),
            file.path,
        )?;
        merge_block(&mut script, block, file.path)?;
    }
    tracing::trace!(
        file = file.path,
        states = script.states.len(),
        props = script.props.len(),
        "analyzed script blocks"
    );
    Ok(Some(script))
}

// ═══════════════════════════════════════════════════════════════════════════════
// HANDLER LIFTING
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_wrapping_parens(code: &str) -> &str {
    let mut code = code.trim();
    while code.starts_with('(') && code.ends_with(')') {
        let inner = &code[1..code.len() - 1];
        let mut depth = 0i32;
        let balanced = inner.chars().all(|c| {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
            depth >= 0
        });
        if !balanced || depth != 0 {
            break;
        }
        code = inner.trim();
    }
    code
}

struct HandlerParts {
    is_async: bool,
    params: String,
    body: String,
}

fn split_params_body(code: &str) -> Option<HandlerParts> {
    let tokens = tokenize(code).ok()?;
    let mut depth = 0;
    let is_async = tokens.first().map_or(false, |t| t.is_ident("async"));
    let i = usize::from(is_async);
    let parts = |params: String, body: String| HandlerParts {
        is_async,
        params,
        body,
    };
    if tokens.get(i).map_or(false, |t| t.is_ident("function")) {
        let open = tokens.iter().position(|t| t.is_punct("("))?;
        let mut close = open;
        for (j, t) in tokens.iter().enumerate().skip(open) {
            depth += depth_delta(t);
            if depth == 0 {
                close = j;
                break;
            }
        }
        let params = code[tokens[open].end..tokens[close].start].trim().to_string();
        let brace = tokens.get(close + 1).filter(|t| t.is_punct("{"))?;
        let end = find_matching_brace(code, brace.start)?;
        return Some(parts(params, code[brace.start + 1..end].trim().to_string()));
    }
    for (j, t) in tokens.iter().enumerate() {
        depth += depth_delta(t);
        if depth == 0 && t.is_punct("=>") {
            let head = code[tokens[i].start..t.start].trim();
            let params = head
                .strip_prefix('(')
                .and_then(|h| h.strip_suffix(')'))
                .unwrap_or(head)
                .trim()
                .to_string();
            let body_start = tokens.get(j + 1)?;
            let body = code[body_start.start..].trim();
            if body_start.is_punct("{") {
                if let Some(end) = find_matching_brace(code, body_start.start) {
                    if code[end + 1..].trim().is_empty() {
                        return Some(parts(
                            params,
                            code[body_start.start + 1..end].trim().to_string(),
                        ));
                    }
                }
            }
            return Some(parts(params, format!("{};", body)));
        }
    }
    None
}

/// Source of a named function equivalent to an inline handler expression.
///
/// Arrow and function expressions keep their parameters; any other
/// expression becomes the body of a function taking `event`. Handlers inside
/// a loop take the loop variables as a destructured last parameter. An
/// `async` handler stays async.
pub fn lift_handler(name: &str, code: &str, loop_context: Option<&LoopContext>) -> String {
    let code = strip_wrapping_parens(code);
    let HandlerParts {
        is_async,
        mut params,
        body,
    } = split_params_body(code).unwrap_or_else(|| HandlerParts {
        is_async: false,
        params: String::new(),
        body: format!("{};", code.trim_end_matches(';')),
    });
    if let Some(ctx) = loop_context.filter(|c| !c.variables.is_empty()) {
        if params.is_empty() {
            params = "event".to_string();
        }
        params = format!("{}, {{ {} }}", params, ctx.variables.join(", "));
    } else if params.is_empty() {
        params = "event".to_string();
    }
    let keyword = if is_async { "async function" } else { "function" };
    format!("{} {}({}) {{ {} }}", keyword, name, params, body)
}

/// Appends a lifted handler to the script IR as a synthetic block.
pub fn push_synthetic_handler(
    script: &mut ScriptIR,
    source: String,
    location: SourceLocation,
    file: &str,
) -> CompileResult<()> {
    let index = script.blocks.len();
    let mut block = build_block(index, &source, IndexMap::new(), location, file)?;
    block.synthetic = true;
    merge_block(script, block, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| (t.kind, t.text.to_string()))
            .collect()
    }

    fn statements(src: &str) -> Vec<ScriptStatement> {
        parse_statements(src).unwrap()
    }

    #[test]
    fn test_tokenizer_strings_and_regex() {
        let toks = kinds(r#"const s = "state x = 1"; const r = /a\/b/g; x = a / b"#);
        assert!(toks.contains(&(TokenKind::Str, r#""state x = 1""#.to_string())));
        assert!(toks.contains(&(TokenKind::Regex, r"/a\/b/g".to_string())));
        assert_eq!(
            toks.iter().filter(|(k, _)| *k == TokenKind::Regex).count(),
            1
        );
    }

    #[test]
    fn test_tokenizer_longest_punctuator() {
        let toks = kinds("a ??= b >>>= c?.d");
        let puncts: Vec<&str> = toks
            .iter()
            .filter(|(k, _)| *k == TokenKind::Punct)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(puncts, vec!["??=", ">>>=", "?."]);
    }

    #[test]
    fn test_tokenizer_template_with_nested_braces() {
        let toks = kinds("let t = `a ${ {b: '}'}.b } c`; next");
        assert!(toks
            .iter()
            .any(|(k, t)| *k == TokenKind::Template && t.ends_with("c`")));
        assert_eq!(toks.last().unwrap().1, "next");
    }

    #[test]
    fn test_unterminated_string_reported() {
        let err = tokenize("let a = 'oops\nlet b = 1").unwrap_err();
        assert_eq!(err.offset, 8);
    }

    #[test]
    fn test_state_and_prop_statements() {
        let stmts = statements("state count = 0\nprop title = \"Hi\"\nprop flag;\nstate items = [1,\n 2]");
        assert_eq!(stmts.len(), 4);
        match &stmts[0] {
            ScriptStatement::State { name, value, head, .. } => {
                assert_eq!(name, "count");
                assert_eq!(value, "0");
                assert_eq!(*head, TextSpan::new(0, 11));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(&stmts[1], ScriptStatement::Prop { name, default: Some(d), .. } if name == "title" && d == "\"Hi\""));
        assert!(matches!(&stmts[2], ScriptStatement::Prop { name, default: None, .. } if name == "flag"));
        assert!(matches!(&stmts[3], ScriptStatement::State { value, .. } if value == "[1,\n 2]"));
    }

    #[test]
    fn test_state_in_string_or_member_is_not_a_declaration() {
        let stmts = statements("const label = \"state x = 1\"\nstate.count = 4\nlet state2 = 1");
        assert!(stmts
            .iter()
            .all(|s| !matches!(s, ScriptStatement::State { .. })));
    }

    #[test]
    fn test_functions_and_variables() {
        let src = "function increment() {\n  count++\n}\nconst reset = () => { count = 0 }\nconst { a, b: c, ...rest } = obj\nasync function load() {}\nexport const double = (x) => x * 2";
        let stmts = statements(src);
        assert_eq!(stmts.len(), 5);
        assert_eq!(stmts[0].function_name(), Some("increment"));
        assert_eq!(stmts[1].function_name(), Some("reset"));
        assert!(matches!(&stmts[2], ScriptStatement::Variable { names, function: false, .. } if names == &vec!["a".to_string(), "c".to_string(), "rest".to_string()]));
        assert_eq!(stmts[3].function_name(), Some("load"));
        assert_eq!(stmts[4].function_name(), Some("double"));
    }

    #[test]
    fn test_imports() {
        let stmts = statements("import Card from './Card.zen'\nimport { format, parse as p } from 'date-fns';\nimport * as utils from \"./utils\"");
        let locals: Vec<Vec<String>> = stmts
            .iter()
            .map(|s| match s {
                ScriptStatement::Import { locals, .. } => locals.clone(),
                _ => vec![],
            })
            .collect();
        assert_eq!(locals[0], vec!["Card"]);
        assert_eq!(locals[1], vec!["format", "p"]);
        assert_eq!(locals[2], vec!["utils"]);
        assert!(matches!(&stmts[1], ScriptStatement::Import { source, .. } if source == "date-fns"));
    }

    #[test]
    fn test_if_else_stays_one_statement() {
        let stmts = statements("if (a) {\n  b()\n}\nelse {\n  c()\n}\nlet d = 1");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_redeclaration_across_blocks() {
        let src = "<script>\nstate count = 0\n</script>\n<p>x</p>\n<script>\n  state count = 1\n</script>";
        let file = SourceFile::new("page.zen", src);
        let blocks = crate::lexer::extract_blocks(&file).unwrap();
        let err = analyze_scripts(&blocks.scripts, &file).unwrap_err();
        match err.kind {
            ErrorKind::StateRedeclaration { name, first, second } => {
                assert_eq!(name, "count");
                assert_eq!(first, SourceLocation::new(2, 1));
                assert_eq!(second, SourceLocation::new(6, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redeclaration_in_one_block() {
        let src = "<script>state a = 1\nstate a = 2</script>";
        let file = SourceFile::new("page.zen", src);
        let blocks = crate::lexer::extract_blocks(&file).unwrap();
        let err = analyze_scripts(&blocks.scripts, &file).unwrap_err();
        assert_eq!(err.code, crate::validate::ERR_STATE_REDECLARATION);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_merged_declarations_and_attribute_props() {
        let src = "<script props=\"title, size\">\nstate a = 1\nfunction inc() { a++ }\n</script><script>state b = 2\nprop size = 3</script>";
        let file = SourceFile::new("c.zen", src);
        let blocks = crate::lexer::extract_blocks(&file).unwrap();
        let script = analyze_scripts(&blocks.scripts, &file).unwrap().unwrap();
        assert_eq!(script.states.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(script.props.keys().collect::<Vec<_>>(), vec!["title", "size"]);
        assert_eq!(script.functions, vec!["inc"]);
        assert_eq!(script.states["b"].script_index, 1);
    }

    #[test]
    fn test_invalid_script_rejected() {
        let src = "<script>state a = = 1</script>";
        let file = SourceFile::new("c.zen", src);
        let blocks = crate::lexer::extract_blocks(&file).unwrap();
        let err = analyze_scripts(&blocks.scripts, &file).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidScript);
    }

    #[test]
    fn test_blank_keywords_preserves_length() {
        let block = build_block(
            0,
            "state count = 0\nprop title",
            IndexMap::new(),
            SourceLocation::default(),
            "c.zen",
        )
        .unwrap();
        let blanked = blank_declaration_keywords(&block);
        assert_eq!(blanked, "let   count = 0\nlet  title");
        assert_eq!(blanked.len(), block.raw.len());
    }

    #[test]
    fn test_lift_handler_forms() {
        assert_eq!(
            lift_handler("__zen_h0", "() => count++", None),
            "function __zen_h0(event) { count++; }"
        );
        assert_eq!(
            lift_handler("__zen_h1", "(e) => { save(e); done() }", None),
            "function __zen_h1(e) { save(e); done() }"
        );
        assert_eq!(
            lift_handler("__zen_h2", "async function (e) { await go(e) }", None),
            "async function __zen_h2(e) { await go(e) }"
        );
        assert_eq!(
            lift_handler("__zen_h5", "async (e) => { await go(e) }", None),
            "async function __zen_h5(e) { await go(e) }"
        );
        assert_eq!(
            lift_handler("__zen_h6", "async () => load()", None),
            "async function __zen_h6(event) { load(); }"
        );
        assert_eq!(
            lift_handler("__zen_h3", "alert('hi')", None),
            "function __zen_h3(event) { alert('hi'); }"
        );
        let ctx = LoopContext::new(vec!["item".into(), "i".into()], None);
        assert_eq!(
            lift_handler("__zen_h4", "() => remove(item.id)", Some(&ctx)),
            "function __zen_h4(event, { item, i }) { remove(item.id); }"
        );
    }
}
