//! Renderers for flat key/value payloads.
//!
//! A payload implements [`Writable`] once and can then be rendered as URI
//! query parameters, as a URI fragment or as a JSON object.

use serde_json::{Map, Value};
use std::fmt::Debug;
use url::Url;
use url::form_urlencoded;

/// Receiver of `(key, value)` pairs pushed by a [`Writable`].
pub trait ParamSink {
    fn set_str(&mut self, key: &str, value: &str);
    fn set_int(&mut self, key: &str, value: i64);
}

/// A payload that knows how to write itself as flat parameters.
pub trait Writable: Debug + Send + Sync {
    fn write_to(&self, writer: &mut dyn ParamSink);
}

/// A [`ParamSink`] that produces a finished value.
pub trait ParamWriter: ParamSink + Sized {
    type Output;

    fn build(self) -> Self::Output;

    fn build_with(mut self, content: &dyn Writable) -> Self::Output {
        content.write_to(&mut self);
        self.build()
    }
}

/// Writes parameters into the query of a base URI, replacing any existing
/// parameter with the same name.
#[derive(Debug)]
pub struct UriQueryWriter {
    base: Url,
    params: Vec<(String, String)>,
}

impl UriQueryWriter {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            params: Vec::new(),
        }
    }
}

impl ParamSink for UriQueryWriter {
    fn set_str(&mut self, key: &str, value: &str) {
        self.params.retain(|(existing, _)| existing != key);
        self.params.push((key.to_string(), value.to_string()));
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.set_str(key, &value.to_string());
    }
}

impl ParamWriter for UriQueryWriter {
    type Output = Url;

    fn build(self) -> Url {
        let mut url = self.base;
        let kept: Vec<(String, String)> = url
            .query_pairs()
            .into_owned()
            .filter(|(key, _)| !self.params.iter().any(|(set, _)| set == key))
            .collect();

        if kept.is_empty() && self.params.is_empty() {
            url.set_query(None);
            return url;
        }

        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .extend_pairs(self.params);
        url
    }
}

/// Writes parameters as a form-encoded, `&`-joined URI fragment.
#[derive(Debug)]
pub struct UriFragmentWriter {
    base: Url,
    params: Vec<(String, String)>,
}

impl UriFragmentWriter {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            params: Vec::new(),
        }
    }
}

impl ParamSink for UriFragmentWriter {
    fn set_str(&mut self, key: &str, value: &str) {
        self.params.push((key.to_string(), value.to_string()));
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.set_str(key, &value.to_string());
    }
}

impl ParamWriter for UriFragmentWriter {
    type Output = Url;

    fn build(self) -> Url {
        let mut url = self.base;
        if self.params.is_empty() {
            url.set_fragment(None);
            return url;
        }

        let fragment = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.params)
            .finish();
        url.set_fragment(Some(&fragment));
        url
    }
}

/// Writes parameters as members of a flat JSON object.
#[derive(Debug, Default)]
pub struct JsonWriter {
    root: Map<String, Value>,
}

impl JsonWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParamSink for JsonWriter {
    fn set_str(&mut self, key: &str, value: &str) {
        self.root
            .insert(key.to_string(), Value::String(value.to_string()));
    }

    fn set_int(&mut self, key: &str, value: i64) {
        self.root.insert(key.to_string(), Value::from(value));
    }
}

impl ParamWriter for JsonWriter {
    type Output = Map<String, Value>;

    fn build(self) -> Map<String, Value> {
        self.root
    }
}

/// Wraps a payload so that `state` is written ahead of it when present.
#[derive(Debug)]
pub struct WithState<W> {
    state: Option<String>,
    inner: W,
}

impl<W: Writable> WithState<W> {
    pub fn new(state: Option<String>, inner: W) -> Self {
        Self { state, inner }
    }
}

impl<W: Writable> Writable for WithState<W> {
    fn write_to(&self, writer: &mut dyn ParamSink) {
        if let Some(state) = &self.state {
            writer.set_str("state", state);
        }
        self.inner.write_to(writer);
    }
}

/// Where redirect parameters are placed on the redirect URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectEncoding {
    Query,
    Fragment,
}

impl RedirectEncoding {
    /// Render `content` onto `base` using this encoding.
    pub fn render(&self, base: Url, content: &dyn Writable) -> Url {
        match self {
            Self::Query => UriQueryWriter::new(base).build_with(content),
            Self::Fragment => UriFragmentWriter::new(base).build_with(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Sample;

    impl Writable for Sample {
        fn write_to(&self, writer: &mut dyn ParamSink) {
            writer.set_str("code", "a b&c");
            writer.set_int("expires_in", 60);
        }
    }

    fn base() -> Url {
        Url::parse("https://example.com/cb?keep=1&code=old").unwrap()
    }

    #[test]
    fn test_query_writer_replaces_existing_params() {
        let url = UriQueryWriter::new(base()).build_with(&Sample);
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(
            pairs,
            vec![
                ("keep".to_string(), "1".to_string()),
                ("code".to_string(), "a b&c".to_string()),
                ("expires_in".to_string(), "60".to_string()),
            ]
        );
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_fragment_writer_appends_encoded_fragment() {
        let url = UriFragmentWriter::new(base()).build_with(&Sample);

        assert_eq!(url.query(), Some("keep=1&code=old"));
        assert_eq!(url.fragment(), Some("code=a+b%26c&expires_in=60"));
    }

    #[test]
    fn test_json_writer_keeps_integer_types() {
        let json = JsonWriter::new().build_with(&Sample);

        assert_eq!(json.get("code"), Some(&Value::from("a b&c")));
        assert_eq!(json.get("expires_in"), Some(&Value::from(60)));
    }

    #[test]
    fn test_with_state_only_writes_present_state() {
        let with = JsonWriter::new().build_with(&WithState::new(Some("xyz".into()), Sample));
        let without = JsonWriter::new().build_with(&WithState::new(None, Sample));

        assert_eq!(with.get("state"), Some(&Value::from("xyz")));
        assert!(!without.contains_key("state"));
    }
}
