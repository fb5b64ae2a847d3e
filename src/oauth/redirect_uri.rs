//! Redirect URI resolution and validation.

use std::net::{Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use super::types::OAuthFailure;

/// Loopback hosts are matched strictly by name or address.
pub fn is_loopback_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(address)) => address == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(address)) => address == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

/// Compare two redirect URIs.
///
/// URIs must be identical, except that two loopback URIs may differ in host
/// spelling and port.
pub fn uris_match(a: &Url, b: &Url) -> bool {
    if a == b {
        return true;
    }

    if !is_loopback_host(a) || !is_loopback_host(b) {
        return false;
    }

    let mut rewritten = a.clone();
    let Some(host) = b.host_str() else {
        return false;
    };
    if rewritten.set_host(Some(host)).is_err() || rewritten.set_port(b.port()).is_err() {
        return false;
    }
    rewritten == *b
}

/// Resolve the redirect URI for an authorization request and check that it
/// is safe to redirect to.
///
/// Returns the URI along with whether it was supplied explicitly.
pub fn resolve_redirect_uri(
    requested: Option<&str>,
    registered: &[Url],
) -> Result<(Url, bool), OAuthFailure> {
    let (resolved, provided) = match requested {
        None => match registered {
            [only] => (only.clone(), false),
            _ => {
                return Err(OAuthFailure::invalid_request(
                    "missing redirect URI and no default registered",
                ));
            }
        },
        Some(raw) => {
            let parsed = match Url::parse(raw) {
                Ok(parsed) => parsed,
                Err(url::ParseError::RelativeUrlWithoutBase) => {
                    return Err(OAuthFailure::invalid_request("redirect URI is not absolute"));
                }
                Err(_) => {
                    return Err(OAuthFailure::invalid_request("malformed redirect URI"));
                }
            };
            if !registered.iter().any(|r| uris_match(r, &parsed)) {
                return Err(OAuthFailure::invalid_request("redirect URI not registered"));
            }
            (parsed, true)
        }
    };

    validate_redirect_uri(&resolved)?;
    Ok((resolved, provided))
}

/// Check the structural safety requirements of a redirect URI.
///
/// A parsed [`Url`] is always absolute; relative input is rejected while
/// parsing.
pub fn validate_redirect_uri(uri: &Url) -> Result<(), OAuthFailure> {
    if uri.host().is_none() {
        return Err(OAuthFailure::invalid_request("redirect URI is missing host"));
    }
    if uri.scheme() != "https" && !is_loopback_host(uri) {
        return Err(OAuthFailure::invalid_request("redirect URI is not https"));
    }
    if uri.fragment().is_some() {
        return Err(OAuthFailure::invalid_request("redirect URI has a fragment"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_loopback_hosts() {
        assert!(is_loopback_host(&url("http://localhost/cb")));
        assert!(is_loopback_host(&url("http://LOCALHOST:8080/cb")));
        assert!(is_loopback_host(&url("http://127.0.0.1:1234/cb")));
        assert!(is_loopback_host(&url("http://[::1]:1234/cb")));
        assert!(!is_loopback_host(&url("http://127.0.0.2/cb")));
        assert!(!is_loopback_host(&url("https://example.com/cb")));
    }

    #[test]
    fn test_loopback_port_insensitive_and_symmetric() {
        let pairs = [
            ("https://localhost:8080", "https://localhost:9090", true),
            ("https://hoek.io:8080", "https://hoek.io:9090", false),
            ("http://127.0.0.1:1/cb", "http://localhost:2/cb", true),
            ("http://localhost:1/cb", "http://localhost:1/other", false),
            ("http://localhost/cb", "https://localhost/cb", false),
        ];

        for (a, b, expected) in pairs {
            let (a, b) = (url(a), url(b));
            assert_eq!(uris_match(&a, &b), expected, "{a} vs {b}");
            assert_eq!(uris_match(&b, &a), expected, "{b} vs {a}");
        }
    }

    #[test]
    fn test_default_requires_single_registration() {
        let one = vec![url("https://example.com/cb")];
        let (resolved, provided) = resolve_redirect_uri(None, &one).unwrap();
        assert_eq!(resolved, one[0]);
        assert!(!provided);

        let two = vec![url("https://example.com/a"), url("https://example.com/b")];
        for registered in [vec![], two] {
            let failure = resolve_redirect_uri(None, &registered).unwrap_err();
            assert_eq!(
                failure.message,
                "missing redirect URI and no default registered"
            );
        }
    }

    #[test]
    fn test_explicit_uri_must_be_registered() {
        let registered = vec![url("https://example.com/cb"), url("http://localhost:3000/cb")];

        let (resolved, provided) =
            resolve_redirect_uri(Some("http://localhost:4000/cb"), &registered).unwrap();
        assert_eq!(resolved.as_str(), "http://localhost:4000/cb");
        assert!(provided);

        let failure = resolve_redirect_uri(Some("https://evil.com/cb"), &registered).unwrap_err();
        assert_eq!(failure.message, "redirect URI not registered");

        let failure = resolve_redirect_uri(Some("/cb"), &registered).unwrap_err();
        assert_eq!(failure.message, "redirect URI is not absolute");

        let failure = resolve_redirect_uri(Some("https://[bad"), &registered).unwrap_err();
        assert_eq!(failure.message, "malformed redirect URI");
    }

    #[test]
    fn test_validation_rules() {
        assert_eq!(
            validate_redirect_uri(&url("http://example.com/cb"))
                .unwrap_err()
                .message,
            "redirect URI is not https"
        );
        assert!(validate_redirect_uri(&url("http://127.0.0.1:8080/cb")).is_ok());
        assert_eq!(
            validate_redirect_uri(&url("https://example.com/cb#frag"))
                .unwrap_err()
                .message,
            "redirect URI has a fragment"
        );
        assert_eq!(
            validate_redirect_uri(&url("urn:example:cb")).unwrap_err().message,
            "redirect URI is missing host"
        );
        assert_eq!(
            validate_redirect_uri(&url("file:///tmp/cb")).unwrap_err().message,
            "redirect URI is missing host"
        );
    }
}
