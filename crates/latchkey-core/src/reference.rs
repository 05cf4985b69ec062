//! Secret reference parsing.
//!
//! A secret reference is a configuration string of the form
//! `scheme://identifier[?key=value[&key=value]*]`:
//!
//! - `env://DB_PASSWORD` - environment variable
//! - `kv://db-password?version=3` - vault secret, optionally pinned to a version
//! - `enc://aes256/<cipher>?iv=<iv>` - AES-256 encrypted literal
//!
//! Anything that does not parse as an absolute URI is a literal value, not an
//! error. Callers decide what a literal means.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::error::Error;

/// A parsed secret reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    original: String,
    scheme: String,
    identifier: String,
    segments: Vec<String>,
    parameters: BTreeMap<String, String>,
}

impl SecretReference {
    /// Parse a raw configuration value.
    ///
    /// Returns `None` when the value is blank, has no `://`, or is not a
    /// well-formed absolute URI.
    pub fn try_parse(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() || !raw.contains("://") {
            return None;
        }

        let url = Url::parse(raw).ok()?;

        // Userinfo and port stay in the identifier
        let mut authority = String::new();
        if !url.username().is_empty() || url.password().is_some() {
            authority.push_str(url.username());
            if let Some(password) = url.password() {
                authority.push(':');
                authority.push_str(password);
            }
            authority.push('@');
        }
        authority.push_str(url.host_str().unwrap_or(""));
        if let Some(port) = url.port() {
            authority.push(':');
            authority.push_str(&port.to_string());
        }

        // Decode per segment so an encoded '/' never becomes a separator
        let segments: Vec<String> = std::iter::once(authority.as_str())
            .chain(url.path().split('/'))
            .filter(|segment| !segment.is_empty())
            .map(decode)
            .collect();
        let identifier = segments.join("/");

        let parameters = url.query().map(parse_query).unwrap_or_default();

        Some(Self {
            original: raw.to_string(),
            scheme: url.scheme().to_ascii_lowercase(),
            identifier,
            segments,
            parameters,
        })
    }

    /// Whether a raw value looks like a reference at all.
    pub fn is_reference(raw: &str) -> bool {
        Self::try_parse(raw).is_some()
    }

    /// The exact input string.
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The lowercase scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Authority and path joined by `/`, percent-decoded.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// The `/`-separated parts of the identifier, each decoded on its own.
    pub fn segments(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }

    /// All query parameters, keyed by lowercase name.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Look up a query parameter, ignoring key case.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

fn parse_query(query: &str) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();
    for pair in query.split('&') {
        // Pairs without '=' carry no value and are dropped
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        parameters.insert(decode(key).to_ascii_lowercase(), decode(value));
    }
    parameters
}

impl fmt::Display for SecretReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for SecretReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_parse(s).ok_or_else(|| {
            let scheme = s.split_once("://").map(|(scheme, _)| scheme).unwrap_or("");
            Error::invalid_reference(scheme, "value is not a scheme://identifier reference")
        })
    }
}

impl<'de> Deserialize<'de> for SecretReference {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SecretReference::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_env_reference() {
        let reference = SecretReference::try_parse("env://DB_PASSWORD").unwrap();
        assert_eq!(reference.scheme(), "env");
        assert_eq!(reference.identifier(), "DB_PASSWORD");
        assert!(reference.parameters().is_empty());
    }

    #[test]
    fn test_parse_vault_reference_with_version() {
        let reference = SecretReference::try_parse("kv://db-password?version=3").unwrap();
        assert_eq!(reference.scheme(), "kv");
        assert_eq!(reference.identifier(), "db-password");
        assert_eq!(reference.parameter("version"), Some("3"));
    }

    #[test]
    fn test_parse_encrypted_reference() {
        let reference =
            SecretReference::try_parse("enc://aes256/QmFzZTY0Q2lwaGVy?iv=QmFzZTY0SVY=").unwrap();
        assert_eq!(reference.scheme(), "enc");
        assert_eq!(reference.identifier(), "aes256/QmFzZTY0Q2lwaGVy");
        assert_eq!(reference.segments(), vec!["aes256", "QmFzZTY0Q2lwaGVy"]);
        assert_eq!(reference.parameter("iv"), Some("QmFzZTY0SVY="));
    }

    #[test]
    fn test_scheme_is_lowercased() {
        let reference = SecretReference::try_parse("ENV://Token").unwrap();
        assert_eq!(reference.scheme(), "env");
        assert_eq!(reference.original(), "ENV://Token");
    }

    #[test]
    fn test_pure_path_identifier() {
        let reference = SecretReference::try_parse("env:///nested/name/").unwrap();
        assert_eq!(reference.identifier(), "nested/name");
    }

    #[test]
    fn test_port_and_userinfo_are_kept() {
        let reference = SecretReference::try_parse("kv://name:8080").unwrap();
        assert_eq!(reference.identifier(), "name:8080");

        let reference = SecretReference::try_parse("env://user@HOST").unwrap();
        assert_eq!(reference.identifier(), "user@HOST");

        let reference = SecretReference::try_parse("kv://user:pw@name:8443/path").unwrap();
        assert_eq!(reference.identifier(), "user:pw@name:8443/path");
        assert_eq!(reference.segments(), vec!["user:pw@name:8443", "path"]);
    }

    #[test]
    fn test_encoded_slash_stays_inside_segment() {
        let reference = SecretReference::try_parse("enc://aes256/abc%2Fdef").unwrap();
        assert_eq!(reference.segments(), vec!["aes256", "abc/def"]);
        assert_eq!(reference.identifier(), "aes256/abc/def");
    }

    #[test]
    fn test_query_parameters_are_decoded_and_case_insensitive() {
        let reference =
            SecretReference::try_parse("kv://name?Vault=https%3A%2F%2Fother.vault&flag&iv=a+b")
                .unwrap();
        assert_eq!(reference.parameter("vault"), Some("https://other.vault"));
        assert_eq!(reference.parameter("VAULT"), Some("https://other.vault"));
        // '+' is not a space in reference queries
        assert_eq!(reference.parameter("iv"), Some("a+b"));
        // Entries without '=' are dropped
        assert_eq!(reference.parameter("flag"), None);
    }

    #[test]
    fn test_value_split_on_first_equals() {
        let reference = SecretReference::try_parse("enc://aes256/abc?iv=AAAA==").unwrap();
        assert_eq!(reference.parameter("iv"), Some("AAAA=="));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let reference = SecretReference::try_parse("kv://name?version=1&VERSION=2").unwrap();
        assert_eq!(reference.parameter("version"), Some("2"));
    }

    #[test]
    fn test_literals_are_not_references() {
        assert!(SecretReference::try_parse("").is_none());
        assert!(SecretReference::try_parse("   ").is_none());
        assert!(SecretReference::try_parse("hunter2").is_none());
        assert!(SecretReference::try_parse("env:DB_PASSWORD").is_none());
        assert!(SecretReference::try_parse("://missing-scheme").is_none());
        assert!(SecretReference::try_parse("1bad://scheme").is_none());
        assert!(SecretReference::try_parse("Server=db;Password=a://b").is_none());
    }

    #[test]
    fn test_from_str_rejects_literal() {
        let result: Result<SecretReference, _> = "plain-value".parse();
        assert!(matches!(result, Err(Error::InvalidReference { .. })));
    }

    #[test]
    fn test_deserialize_reference() {
        let reference: SecretReference = serde_json::from_str("\"env://API_KEY\"").unwrap();
        assert_eq!(reference.identifier(), "API_KEY");

        let result: Result<SecretReference, _> = serde_json::from_str("\"literal\"");
        assert!(result.is_err());
    }
}
