//! Opt-in deviations from the OAuth 2.1 baseline.
//!
//! The set of extensions is closed. Each kind may be registered at most once,
//! and registering it twice is a configuration error rather than a silent
//! override.

use std::{mem, str::FromStr};

use crate::errors::ExtensionError;

/// A single policy toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Permit `response_type=token`, optionally requiring a `nonce`
    AllowImplicit { require_nonce: bool },
    /// Do not require PKCE for the authorization code flow
    DontRequirePkce,
    /// Accept `code_challenge_method=plain`
    AllowPlainCodeChallengeMethod,
}

impl Extension {
    /// Stable name of this extension's kind, used in logs and metadata.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllowImplicit { .. } => "allow_implicit",
            Self::DontRequirePkce => "dont_require_pkce",
            Self::AllowPlainCodeChallengeMethod => "allow_plain_code_challenge_method",
        }
    }

    fn same_kind(&self, other: &Extension) -> bool {
        mem::discriminant(self) == mem::discriminant(other)
    }
}

impl FromStr for Extension {
    type Err = ExtensionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "allow_implicit" => Ok(Self::AllowImplicit {
                require_nonce: false,
            }),
            "allow_implicit_require_nonce" => Ok(Self::AllowImplicit {
                require_nonce: true,
            }),
            "dont_require_pkce" => Ok(Self::DontRequirePkce),
            "allow_plain_code_challenge_method" => Ok(Self::AllowPlainCodeChallengeMethod),
            other => Err(ExtensionError::Unknown(other.to_string())),
        }
    }
}

/// The registered extensions for a parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    registered: Vec<Extension>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list, rejecting duplicate kinds.
    pub fn from_list(extensions: impl IntoIterator<Item = Extension>) -> Result<Self, ExtensionError> {
        let mut registry = Self::new();
        for extension in extensions {
            registry.add(extension)?;
        }
        Ok(registry)
    }

    /// Register one extension.
    pub fn add(&mut self, extension: Extension) -> Result<(), ExtensionError> {
        if self.registered.iter().any(|e| e.same_kind(&extension)) {
            return Err(ExtensionError::Duplicate(extension.name()));
        }
        self.registered.push(extension);
        Ok(())
    }

    /// Builder form of [`Extensions::add`].
    pub fn with(mut self, extension: Extension) -> Result<Self, ExtensionError> {
        self.add(extension)?;
        Ok(self)
    }

    /// Returns `Some(require_nonce)` when the implicit flow is enabled.
    pub fn implicit(&self) -> Option<bool> {
        self.registered.iter().find_map(|e| match e {
            Extension::AllowImplicit { require_nonce } => Some(*require_nonce),
            _ => None,
        })
    }

    pub fn pkce_optional(&self) -> bool {
        self.registered.contains(&Extension::DontRequirePkce)
    }

    pub fn plain_challenge_allowed(&self) -> bool {
        self.registered
            .contains(&Extension::AllowPlainCodeChallengeMethod)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.registered.iter()
    }
}

impl FromStr for Extensions {
    type Err = ExtensionError;

    /// Parse a comma separated list of extension names.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Extension::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_list(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_strict() {
        let extensions = Extensions::new();
        assert_eq!(extensions.implicit(), None);
        assert!(!extensions.pkce_optional());
        assert!(!extensions.plain_challenge_allowed());
    }

    #[test]
    fn test_duplicate_kind_rejected_even_with_different_data() {
        let result = Extensions::new()
            .with(Extension::AllowImplicit {
                require_nonce: false,
            })
            .and_then(|e| {
                e.with(Extension::AllowImplicit {
                    require_nonce: true,
                })
            });

        assert_eq!(result, Err(ExtensionError::Duplicate("allow_implicit")));
    }

    #[test]
    fn test_lookup_by_kind() {
        let extensions = Extensions::from_list([
            Extension::AllowImplicit {
                require_nonce: true,
            },
            Extension::AllowPlainCodeChallengeMethod,
        ])
        .unwrap();

        assert_eq!(extensions.implicit(), Some(true));
        assert!(extensions.plain_challenge_allowed());
        assert!(!extensions.pkce_optional());
    }

    #[test]
    fn test_parse_from_config_string() {
        let extensions: Extensions = "allow_implicit_require_nonce, dont_require_pkce"
            .parse()
            .unwrap();
        assert_eq!(extensions.implicit(), Some(true));
        assert!(extensions.pkce_optional());

        let empty: Extensions = "".parse().unwrap();
        assert_eq!(empty, Extensions::new());
    }

    #[test]
    fn test_parse_rejects_unknown_and_duplicate_names() {
        assert_eq!(
            "allow_everything".parse::<Extensions>(),
            Err(ExtensionError::Unknown("allow_everything".to_string()))
        );
        assert_eq!(
            "allow_implicit,allow_implicit_require_nonce".parse::<Extensions>(),
            Err(ExtensionError::Duplicate("allow_implicit"))
        );
    }
}
