//! Statement scanner for markup content.
//!
//! One case-insensitive pattern matches every statement of interest. The named group that
//! matched tells which sub-parser applies; groups are tried in [`PARSERS`] order.

use crate::error::Result;
use crate::nut::NutType;
use regex::Regex;
use std::ops::Range;

const SKIP_MARKER: &str = "data-wuic-skip";

const PATTERN: &str = concat!(
    r"(?is)",
    r"(?P<script><script[^>]*?/>|<script[^>]*>.*?</script>)",
    r"|(?P<link><link[^>]*>(?:\s*</link>)?)",
    r"|(?P<style><style[^>]*>.*?</style>)",
    r"|(?P<comment><!--.*?-->)",
    r"|(?P<img><img[^>]*>)",
);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Script,
    Link,
    Style,
    Comment,
    Image,
}

/// Sub-parsers by precedence: the first group present in a match wins.
const PARSERS: [(&str, StatementKind); 5] = [
    ("script", StatementKind::Script),
    ("link", StatementKind::Link),
    ("style", StatementKind::Style),
    ("comment", StatementKind::Comment),
    ("img", StatementKind::Image),
];

/// What a statement points to once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Relative path to an external resource, as written.
    Path(String),
    /// Content embedded in the statement itself.
    Inline { content: String, nut_type: NutType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub range: Range<usize>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn text<'a>(&self, markup: &'a str) -> &'a str {
        &markup[self.range.clone()]
    }

    /// Resource referenced by the statement, or `None` when it must be left alone
    /// (comments, skip marker, absolute URLs, unsupported types).
    pub fn target(&self, markup: &str) -> Option<Target> {
        let text = self.text(markup);
        if has_attribute(text, SKIP_MARKER) {
            return None;
        }
        match self.kind {
            StatementKind::Comment => None,
            StatementKind::Script => match attribute(text, "src") {
                Some(value) => local_path(value, |t| t == NutType::Javascript),
                None => inline(text, NutType::Javascript),
            },
            StatementKind::Link => {
                attribute(text, "href").and_then(|v| local_path(v, |t| t == NutType::Css))
            }
            StatementKind::Style => inline(text, NutType::Css),
            StatementKind::Image => attribute(text, "src").and_then(|v| local_path(v, NutType::is_image)),
        }
    }
}

pub struct MarkupParser {
    pattern: Regex,
}

impl MarkupParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(PATTERN)?,
        })
    }

    /// Statements in document order, grouped. Two consecutive matches belong to the same
    /// group unless non-whitespace text sits between them.
    pub fn scan(&self, markup: &str) -> Vec<Vec<Statement>> {
        let mut groups = Vec::new();
        let mut current: Vec<Statement> = Vec::new();
        let mut previous_end: Option<usize> = None;

        for caps in self.pattern.captures_iter(markup) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.as_str().trim().is_empty() {
                continue;
            }
            if let Some(end) = previous_end {
                if !markup[end..whole.start()].trim().is_empty() && !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
            }
            if let Some((_, kind)) = PARSERS.iter().find(|(name, _)| caps.name(name).is_some()) {
                current.push(Statement {
                    range: whole.range(),
                    kind: *kind,
                });
            }
            previous_end = Some(whole.end());
        }

        if !current.is_empty() {
            groups.push(current);
        }
        groups
    }
}

/// Opening tag of a statement, without its closing `>`.
fn opening_tag(statement: &str) -> &str {
    statement.find('>').map_or(statement, |i| &statement[..i])
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Byte offsets right after each occurrence of attribute `name` in `tag`, case-insensitive.
fn attribute_ends(tag: &str, name: &str) -> std::vec::IntoIter<usize> {
    let lower = tag.to_ascii_lowercase();
    let name = name.to_ascii_lowercase();
    let mut found = Vec::new();
    let mut from = 0;
    while let Some(i) = lower[from..].find(&name) {
        let start = from + i;
        let end = start + name.len();
        from = end;
        let before = lower[..start].chars().next_back();
        let after = lower[end..].chars().next();
        if before.is_some_and(char::is_whitespace) && !after.is_some_and(is_name_char) {
            found.push(end);
        }
    }
    found.into_iter()
}

fn has_attribute(statement: &str, name: &str) -> bool {
    attribute_ends(opening_tag(statement), name).next().is_some()
}

/// Value of attribute `name` in the opening tag, quoted or not.
fn attribute<'a>(statement: &'a str, name: &str) -> Option<&'a str> {
    let tag = opening_tag(statement);
    attribute_ends(tag, name).find_map(|end| {
        let rest = tag[end..].trim_start().strip_prefix('=')?.trim_start();
        let first = rest.chars().next()?;
        if first == '"' || first == '\'' {
            let close = rest[1..].find(first)?;
            return Some(&rest[1..=close]);
        }
        let stop = rest.find(char::is_whitespace).unwrap_or(rest.len());
        Some(rest[..stop].trim_end_matches('/'))
    })
}

fn local_path(value: &str, accepts: impl Fn(NutType) -> bool) -> Option<Target> {
    if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("//") {
        return None;
    }
    let value = value.split(['?', '#']).next().unwrap_or_default();
    if value.is_empty() {
        return None;
    }
    NutType::from_path(value)
        .filter(|t| accepts(*t))
        .map(|_| Target::Path(value.to_string()))
}

fn inline(statement: &str, nut_type: NutType) -> Option<Target> {
    let start = statement.find('>')? + 1;
    let end = statement[start..].rfind('<').map(|i| start + i)?;
    let content = &statement[start..end];
    if content.trim().is_empty() {
        return None;
    }
    Some(Target::Inline {
        content: content.to_string(),
        nut_type,
    })
}
