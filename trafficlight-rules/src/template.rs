use serde_json::{Map, Value};
use trafficlight_protocol::request::RequestContext;

use crate::error::TemplateError;

/// Every mask key must start with this character.
pub const MASK_SIGIL: char = '$';
/// Output-level placeholder resolving to `{url, method, path, query}`.
pub const REQUEST_PLACEHOLDER: &str = "$request";
/// Placeholder for the request header object inside also-action props.
pub const HEADERS_PLACEHOLDER: &str = "$headers";

/// Returns a copy of `value` where every string equal to `placeholder` is
/// replaced by `replacement`. Map keys are never touched.
pub fn substitute(value: &Value, placeholder: &str, replacement: &Value) -> Value {
    match value {
        Value::String(text) if text == placeholder => replacement.clone(),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute(item, placeholder, replacement))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), substitute(item, placeholder, replacement)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

/// Ordered placeholder table. Entries are applied in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mask {
    entries: Vec<(String, Value)>,
}

impl Mask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Applies every mask entry to `target`.
///
/// All keys are checked for the sigil first; nothing is substituted when one
/// is malformed.
pub fn mask_object(target: &Value, mask: &Mask) -> Result<Value, TemplateError> {
    if let Some((key, _)) = mask.iter().find(|(key, _)| !key.starts_with(MASK_SIGIL)) {
        return Err(TemplateError::InvalidMaskKey(key.to_string()));
    }

    Ok(mask
        .iter()
        .fold(target.clone(), |acc, (key, value)| substitute(&acc, key, value)))
}

/// `$get.*`, `$body.*` and `$req.*` entries derived from the request.
pub fn standard_mask(ctx: &RequestContext) -> Mask {
    let mut mask = Mask::new();

    for (key, value) in &ctx.query {
        mask.insert(format!("$get.{}", camel_case(key)), Value::String(value.clone()));
    }
    if let Value::Object(body) = &ctx.body {
        for (key, value) in body {
            mask.insert(format!("$body.{}", camel_case(key)), value.clone());
        }
    }
    for (attribute, value) in ctx.attributes() {
        mask.insert(format!("$req.{attribute}"), value);
    }

    mask
}

/// Mask used for also-action props: the standard entries plus `$headers`.
pub fn action_mask(ctx: &RequestContext) -> Mask {
    standard_mask(ctx).with(HEADERS_PLACEHOLDER, ctx.headers_value())
}

/// Resolves `$request` inside a raw output value.
pub fn render_raw(raw: &Value, ctx: &RequestContext) -> Value {
    substitute(raw, REQUEST_PLACEHOLDER, &ctx.summary())
}

/// Converts an identifier to camelCase (`user_id` => `userId`, `X-Token` => `xToken`).
pub fn camel_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (index, word) in split_words(input).iter().enumerate() {
        let lower = word.to_lowercase();
        if index == 0 {
            out.push_str(&lower);
            continue;
        }
        let mut chars = lower.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (index, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let next_is_lower = chars
                .get(index + 1)
                .map(|next| next.is_lowercase())
                .unwrap_or(false);
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_numeric() != c.is_numeric())
                || (prev.is_uppercase() && c.is_uppercase() && next_is_lower);
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}
