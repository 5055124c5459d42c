//! Mustache-style path templating.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

/// Renders a template against a JSON context.
pub trait Templater: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> String;
}

/// `{{name}}` is HTML-escaped, `{{{name}}}` and `{{& name}}` are inserted raw.
/// Dotted names walk nested objects. Missing names render as nothing.
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\{\{\{\s*(?<raw>[^{}\s]+)\s*\}\}\}",
        r"|\{\{\s*(?<amp>&)?\s*(?<name>[^{}\s&][^{}\s]*)\s*\}\}",
    ))
    .expect("a valid regex")
});

/// Entity produced for `/` by HTML escaping.
pub const ESCAPED_SLASH: &str = "&#x2F;";

#[derive(Debug, Default, Clone, Copy)]
pub struct MustacheTemplater;

impl Templater for MustacheTemplater {
    fn render(&self, template: &str, context: &Value) -> String {
        TAG.replace_all(template, |caps: &Captures| {
            if let Some(raw) = caps.name("raw") {
                return lookup(context, raw.as_str()).map(stringify).unwrap_or_default();
            }
            let Some(name) = caps.name("name") else {
                return String::new();
            };
            let name = name.as_str();
            // sections, partials and comments are not supported in paths
            if name.starts_with(['#', '^', '/', '!', '>', '=']) {
                return String::new();
            }
            let value = lookup(context, name).map(stringify).unwrap_or_default();
            if caps.name("amp").is_some() {
                value
            } else {
                escape_html(&value)
            }
        })
        .into_owned()
    }
}

fn lookup<'a>(context: &'a Value, name: &str) -> Option<&'a Value> {
    if name == "." {
        return Some(context);
    }
    name.split('.')
        .try_fold(context, |current, segment| current.get(segment))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '/' => out.push_str(ESCAPED_SLASH),
            '`' => out.push_str("&#x60;"),
            '=' => out.push_str("&#x3D;"),
            _ => out.push(ch),
        }
    }
    out
}
