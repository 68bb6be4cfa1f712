//! Theme variable extraction from stylesheets.
//!
//! A rule contributes variables only when its selector list contains
//! `:root` together with at least one `[data-theme="<id>"]` selector. Every
//! custom property (`--*`) it declares is recorded under each matched id.
//! Later declarations overwrite earlier ones, as in the cascade.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

/// Variables per theme identifier.
pub type ThemeVariables = BTreeMap<String, BTreeMap<String, String>>;

const ROOT_SELECTOR: &str = ":root";

static THEME_SELECTOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\[\s*data-theme\s*=\s*(?:"([^"]+)"|'([^']+)'|([A-Za-z0-9_-]+))\s*\]$"#)
        .expect("theme selector pattern is valid")
});

/// A top-level style rule: selector prelude and declaration block.
#[derive(Debug, PartialEq)]
struct StyleRule<'a> {
    prelude: &'a str,
    body: &'a str,
}

/// Extract `[data-theme]` scoped custom properties from a stylesheet.
pub fn extract_theme_variables(css: &str) -> ThemeVariables {
    let css = strip_comments(css);
    let mut themes = ThemeVariables::new();

    for rule in parse_rules(&css) {
        let selectors: Vec<&str> = rule.prelude.split(',').map(str::trim).collect();
        if !selectors.contains(&ROOT_SELECTOR) {
            continue;
        }

        let ids: Vec<&str> = selectors.iter().filter_map(|s| theme_id(s)).collect();
        if ids.is_empty() {
            continue;
        }

        for (name, value) in declarations(rule.body) {
            if !name.starts_with("--") {
                continue;
            }
            for id in &ids {
                themes
                    .entry((*id).to_string())
                    .or_default()
                    .insert(name.to_string(), value.clone());
            }
        }
    }

    themes
}

fn theme_id(selector: &str) -> Option<&str> {
    let caps = THEME_SELECTOR.captures(selector)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

// ─── Stylesheet scanning ────────────────────────────────────────────

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut chars = css.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                quote = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Index just past the block that opens at `open` (which must be `{`), or
/// `None` when the block is never closed.
fn block_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    None
}

/// Index of the first `{` or `;` outside strings and brackets, from `start`.
fn next_delimiter(bytes: &[u8], start: usize) -> Option<(usize, u8)> {
    let mut i = start;
    let mut quote: Option<u8> = None;
    let mut nesting = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => nesting += 1,
                b')' | b']' => nesting = nesting.saturating_sub(1),
                b'{' | b';' if nesting == 0 => return Some((i, b)),
                _ => {}
            }
        }
        i += 1;
    }

    None
}

/// Split a stylesheet into its top-level style rules. At-rules and their
/// blocks are skipped, so rules nested in `@media` never qualify.
fn parse_rules(css: &str) -> Vec<StyleRule<'_>> {
    let bytes = css.as_bytes();
    let mut rules = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && (bytes[i].is_ascii_whitespace() || bytes[i] == b'}') {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let Some((at, delim)) = next_delimiter(bytes, i) else {
            break;
        };

        if delim == b';' {
            // Statement at-rule such as `@import`, or a stray declaration.
            i = at + 1;
            continue;
        }

        let (end, body_end) = match block_end(bytes, at) {
            Some(end) => (end, end - 1),
            None => (bytes.len(), bytes.len()),
        };
        let prelude = css[i..at].trim();
        if !prelude.starts_with('@') {
            rules.push(StyleRule {
                prelude,
                body: &css[at + 1..body_end],
            });
        }
        i = end;
    }

    rules
}

/// Declarations of a rule body in document order. Nested blocks are skipped.
fn declarations(body: &str) -> Vec<(&str, String)> {
    let bytes = body.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let (end, next) = match next_delimiter(bytes, i) {
            Some((at, b';')) => (at, at + 1),
            Some((at, _)) => {
                // Nested rule: drop it together with whatever preceded it.
                i = block_end(bytes, at).unwrap_or(bytes.len());
                continue;
            }
            None => (bytes.len(), bytes.len()),
        };

        if let Some((name, value)) = body[i..end].split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                out.push((name, clean_value(value)));
            }
        }
        i = next;
    }

    out
}

fn clean_value(raw: &str) -> String {
    let value = raw.trim();
    let lower = value.to_ascii_lowercase();
    match lower.rfind("!important") {
        Some(pos) if lower[pos..].trim() == "!important" => value[..pos].trim_end().to_string(),
        _ => value.to_string(),
    }
}
