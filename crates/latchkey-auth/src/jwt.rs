//! Local issuance of signed JWTs.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use ring::rand::SystemRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

use crate::keys::SigningKey;

/// Shortest token lifetime in minutes.
pub const MIN_LIFETIME_MINUTES: i64 = 5;
/// Longest token lifetime in minutes.
pub const MAX_LIFETIME_MINUTES: i64 = 240;
/// Lifetime used when none is configured.
pub const DEFAULT_LIFETIME_MINUTES: i64 = 60;
/// Backdating applied to `nbf` for clock skew.
pub const NOT_BEFORE_SKEW_SECS: i64 = 60;

const RESERVED_CLAIMS: &[&str] = &[
    "iat", "nbf", "exp", "iss", "aud", "sub", "name", "role", "azp",
];

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No private key supplied")]
    MissingKey,
    #[error("Unsupported signing algorithm '{0}', expected RS256 or ES256")]
    UnsupportedAlgorithm(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Signing failed: {0}")]
    Signing(String),
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Signing algorithms supported for local tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JwtAlgorithm {
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "ES256")]
    Es256,
}

impl JwtAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Es256 => "ES256",
        }
    }
}

impl fmt::Display for JwtAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JwtAlgorithm {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RS256" => Ok(Self::Rs256),
            "ES256" => Ok(Self::Es256),
            _ => Err(TokenError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// Inputs for a locally signed token.
#[derive(Clone, Serialize, Deserialize)]
pub struct LocalJwtOptions {
    pub algorithm: JwtAlgorithm,
    /// PEM private key. Escaped `\n` sequences are accepted.
    pub private_key: String,
    #[serde(default)]
    pub key_id: Option<String>,
    #[serde(default)]
    pub issuer: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    /// Emitted as the `azp` claim.
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_lifetime")]
    pub lifetime_minutes: i64,
    #[serde(default)]
    pub extra_claims: BTreeMap<String, Value>,
}

fn default_lifetime() -> i64 {
    DEFAULT_LIFETIME_MINUTES
}

impl fmt::Debug for LocalJwtOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalJwtOptions")
            .field("algorithm", &self.algorithm)
            .field("private_key", &"<redacted>")
            .field("key_id", &self.key_id)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("subject", &self.subject)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("client_id", &self.client_id)
            .field("lifetime_minutes", &self.lifetime_minutes)
            .field("extra_claims", &self.extra_claims.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LocalJwtOptions {
    pub fn new(algorithm: JwtAlgorithm, private_key: impl Into<String>) -> Self {
        Self {
            algorithm,
            private_key: private_key.into(),
            key_id: None,
            issuer: String::new(),
            audience: String::new(),
            subject: String::new(),
            name: String::new(),
            role: None,
            client_id: None,
            lifetime_minutes: DEFAULT_LIFETIME_MINUTES,
            extra_claims: BTreeMap::new(),
        }
    }

    pub fn key_id(mut self, kid: impl Into<String>) -> Self {
        self.key_id = Some(kid.into());
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn lifetime_minutes(mut self, minutes: i64) -> Self {
        self.lifetime_minutes = minutes;
        self
    }

    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra_claims.insert(name.into(), value.into());
        self
    }

    /// Lifetime after clamping to the supported range.
    pub fn effective_lifetime(&self) -> Duration {
        Duration::minutes(
            self.lifetime_minutes
                .clamp(MIN_LIFETIME_MINUTES, MAX_LIFETIME_MINUTES),
        )
    }
}

#[derive(Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

#[derive(Serialize)]
struct Claims<'a> {
    iat: i64,
    nbf: i64,
    exp: i64,
    iss: &'a str,
    aud: &'a str,
    sub: &'a str,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    azp: Option<&'a str>,
    #[serde(flatten)]
    extra: BTreeMap<&'a str, &'a Value>,
}

/// Create a signed compact token issued now.
pub fn create_token(options: &LocalJwtOptions) -> Result<String, TokenError> {
    create_token_at(options, Utc::now())
}

/// Create a signed compact token with `iat` set to `issued_at`.
pub fn create_token_at(
    options: &LocalJwtOptions,
    issued_at: DateTime<Utc>,
) -> Result<String, TokenError> {
    if options.private_key.trim().is_empty() {
        return Err(TokenError::MissingKey);
    }

    let rng = SystemRandom::new();
    let key = SigningKey::from_pem(options.algorithm, &options.private_key, &rng)?;

    let header = Header {
        alg: options.algorithm.as_str(),
        typ: "JWT",
        kid: options.key_id.as_deref(),
    };

    let iat = issued_at.timestamp();
    let claims = Claims {
        iat,
        nbf: iat - NOT_BEFORE_SKEW_SECS,
        exp: (issued_at + options.effective_lifetime()).timestamp(),
        iss: &options.issuer,
        aud: &options.audience,
        sub: &options.subject,
        name: &options.name,
        role: options.role.as_deref(),
        azp: options.client_id.as_deref(),
        extra: extra_claims(&options.extra_claims),
    };

    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let signature = key.sign(signing_input.as_bytes(), &rng)?;

    debug!(
        alg = %options.algorithm,
        kid = options.key_id.as_deref().unwrap_or("-"),
        sub = %options.subject,
        exp = claims.exp,
        "Issued local token"
    );

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

fn extra_claims(claims: &BTreeMap<String, Value>) -> BTreeMap<&str, &Value> {
    claims
        .iter()
        .filter(|(name, _)| {
            let reserved = RESERVED_CLAIMS.contains(&name.as_str());
            if reserved {
                warn!(claim = %name, "Ignoring extra claim that collides with a reserved claim");
            }
            !reserved
        })
        .map(|(name, value)| (name.as_str(), value))
        .collect()
}
