//! URL escaping, query strings and content negotiation helpers.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Everything except the RFC 3986 unreserved set gets escaped.
const ESCAPE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

const JSON_MIME: &str = "application/json";

/// Percent-encode a path segment or query component.
pub fn escape(value: &str) -> String {
    utf8_percent_encode(value, ESCAPE_SET).to_string()
}

/// True for `application/json` and structured-syntax `+json` types, ignoring
/// parameters such as `charset`.
pub fn is_json_mime(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence == JSON_MIME || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// Pick the `Accept` header value for a list of producible types.
///
/// The first JSON-like entry wins. Without one, every entry is offered,
/// comma-joined in caller order. An empty list yields no header.
pub fn select_header_accept<S: AsRef<str>>(accepts: &[S]) -> Option<String> {
    if accepts.is_empty() {
        return None;
    }
    let lowered: Vec<String> = accepts.iter().map(|a| a.as_ref().trim().to_ascii_lowercase()).collect();
    if let Some(json) = lowered.iter().find(|a| is_json_mime(a)) {
        return Some(json.clone());
    }
    Some(lowered.join(", "))
}

/// Pick the `Content-Type` header value for a list of consumable types.
///
/// Defaults to `application/json`; otherwise the first JSON-like entry, or the
/// first entry.
pub fn select_header_content_type<S: AsRef<str>>(content_types: &[S]) -> String {
    let lowered: Vec<String> = content_types
        .iter()
        .map(|c| c.as_ref().trim().to_ascii_lowercase())
        .collect();
    if let Some(json) = lowered.iter().find(|c| is_json_mime(c)) {
        return json.clone();
    }
    lowered.into_iter().next().unwrap_or_else(|| JSON_MIME.to_string())
}

/// How a multi-valued query parameter is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollectionFormat {
    #[default]
    Csv,
    Ssv,
    Tsv,
    Pipes,
    /// Repeat the key once per value.
    Multi,
}

impl CollectionFormat {
    fn separator(&self) -> &'static str {
        match self {
            CollectionFormat::Csv => ",",
            CollectionFormat::Ssv => " ",
            CollectionFormat::Tsv => "\t",
            CollectionFormat::Pipes => "|",
            CollectionFormat::Multi => "",
        }
    }
}

/// A query parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Collection {
        values: Vec<String>,
        format: CollectionFormat,
    },
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Single(value)
    }
}

/// Serialize query parameters in insertion order, escaping keys and values.
/// Returns an empty string when there is nothing to encode.
pub fn build_query_string(params: &[(String, QueryValue)]) -> String {
    let mut pairs: Vec<String> = Vec::new();
    for (key, value) in params {
        let key = escape(key);
        match value {
            QueryValue::Single(v) => pairs.push(format!("{key}={}", escape(v))),
            QueryValue::Collection {
                values,
                format: CollectionFormat::Multi,
            } => {
                pairs.extend(values.iter().map(|v| format!("{key}={}", escape(v))));
            }
            QueryValue::Collection { values, format } => {
                pairs.push(format!("{key}={}", escape(&values.join(format.separator()))));
            }
        }
    }
    pairs.join("&")
}

/// Replace `{name}` placeholders in a path template with escaped values.
pub fn substitute_path(template: &str, params: &[(String, String)]) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{name}}}"), &escape(value))
    })
}

/// `application/x-www-form-urlencoded` body.
pub(crate) fn encode_form(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", escape(k), escape(v)))
        .collect::<Vec<_>>()
        .join("&")
}
