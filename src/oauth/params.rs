//! Multi-valued request parameter lookup.

use std::collections::HashMap;

use super::types::OAuthFailure;

/// Source of request parameters, keyed by name with every value kept.
///
/// The protocol layer does not care whether values came from a query string
/// or a form body.
pub trait ParamReader: Send + Sync {
    /// All values supplied for `param`, in order.
    fn get_all(&self, param: &str) -> &[String];

    /// Read a parameter that may appear at most once.
    fn maybe_singleton(&self, param: &str) -> Result<Option<&str>, OAuthFailure> {
        match self.get_all(param) {
            [] => Ok(None),
            [value] => Ok(Some(value.as_str())),
            _ => Err(OAuthFailure::invalid_request(format!(
                "duplicate param '{param}'"
            ))),
        }
    }

    /// Read a parameter that must appear exactly once.
    fn singleton(&self, param: &str) -> Result<&str, OAuthFailure> {
        self.maybe_singleton(param)?.ok_or_else(|| {
            OAuthFailure::invalid_request(format!("missing param '{param}'"))
        })
    }
}

/// Parameters decoded from `application/x-www-form-urlencoded` input.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, Vec<String>>,
}

impl Params {
    /// Decode a raw query string or form body, keeping duplicate keys.
    pub fn parse(input: &[u8]) -> Self {
        Self::from_pairs(url::form_urlencoded::parse(input).into_owned())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            values.entry(key.into()).or_default().push(value.into());
        }
        Self { values }
    }
}

impl ParamReader for Params {
    fn get_all(&self, param: &str) -> &[String] {
        self.values.get(param).map(Vec::as_slice).unwrap_or(&[])
    }
}
