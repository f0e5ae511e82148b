//! Small helpers for picking values out of HTML fragments without a DOM.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TAG_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*<\s*[A-Za-z][^\s/>]*").unwrap());
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([^\s=<>/"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&nbsp;", " "),
];

/// Decodes `&amp; &lt; &gt; &quot; &#39; &nbsp;`. Anything else is left as written.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = ENTITIES.iter().find(|(entity, _)| tail.starts_with(*entity));
        match decoded {
            Some((entity, text)) => {
                out.push_str(text);
                rest = &tail[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn strip_tags(s: &str) -> String {
    TAG_RE.replace_all(s, " ").into_owned()
}

pub fn collapse_ws(s: &str) -> String {
    WS_RE.replace_all(s, " ").trim().to_string()
}

/// Inner markup to display text: tags removed, whitespace collapsed, entities decoded.
pub fn to_text(s: &str) -> String {
    collapse_ws(&decode_entities(&collapse_ws(&strip_tags(s))))
}

/// Attributes of a single start tag as `(name, value)` pairs; bare attributes have no value.
pub fn attributes(tag: &str) -> impl Iterator<Item = (&str, Option<&str>)> {
    let rest = TAG_NAME_RE.find(tag).map_or(tag, |m| &tag[m.end()..]);
    ATTR_RE.captures_iter(rest).filter_map(|caps| {
        let name = caps.get(1)?.as_str();
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str());
        Some((name, value))
    })
}

/// Value of attribute `name` inside a single start tag, matched case-insensitively.
/// Accepts double, single or unquoted values. Returns `None` when absent.
pub fn attr_value(tag: &str, name: &str) -> Option<String> {
    attributes(tag)
        .find(|(attr, _)| attr.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.unwrap_or_default().to_string())
}

/// True when the start tag carries a bare or valued attribute `name`.
pub fn has_attr(tag: &str, name: &str) -> bool {
    attributes(tag).any(|(attr, _)| attr.eq_ignore_ascii_case(name))
}
