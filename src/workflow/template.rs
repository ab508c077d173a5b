//! Placeholder substitution for workflow strings
//!
//! Replaces `{{ name }}` markers with parameter values. Unknown names stay
//! verbatim and inserted values are never scanned again, so a value that
//! itself contains `{{ ... }}` is emitted as-is.

use serde_yaml::Value;

use crate::workflow::types::Params;

/// Substitute `{{ name }}` placeholders in `text` with values from `params`
pub fn substitute(text: &str, params: &Params) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        result.push_str(&rest[..start]);
        let candidate = &rest[start..];

        match parse_placeholder(candidate) {
            Some((name, len)) => {
                match params.get(name) {
                    Some(value) => result.push_str(&value_to_string(value)),
                    None => result.push_str(&candidate[..len]),
                }
                rest = &candidate[len..];
            }
            None => {
                // Not a placeholder here; a later brace may still open one
                result.push('{');
                rest = &candidate[1..];
            }
        }
    }

    result.push_str(rest);
    result
}

/// Names of all well-formed placeholders in `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("{{") {
        let candidate = &rest[start..];
        match parse_placeholder(candidate) {
            Some((name, len)) => {
                names.push(name);
                rest = &candidate[len..];
            }
            None => rest = &candidate[1..],
        }
    }

    names
}

/// Match `{{ <word> }}` at the start of `s`, returning the word and the
/// length of the whole marker
fn parse_placeholder(s: &str) -> Option<(&str, usize)> {
    let inner = s.strip_prefix("{{")?;
    let trimmed = inner.trim_start();

    let name_len = trimmed
        .find(|c: char| !is_word_char(c))
        .unwrap_or(trimmed.len());
    if name_len == 0 {
        return None;
    }
    let name = &trimmed[..name_len];

    let after_name = trimmed[name_len..].trim_start();
    if !after_name.starts_with("}}") {
        return None;
    }
    let end = s.len() - after_name.len() + 2;

    Some((name, end))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// String form of a parameter value as inserted into templates
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(_) | Value::Mapping(_) => serde_json::to_string(value)
            .or_else(|_| serde_yaml::to_string(value).map(|s| s.trim_end().to_string()))
            .unwrap_or_default(),
        Value::Tagged(tagged) => value_to_string(&tagged.value),
    }
}
