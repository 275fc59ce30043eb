//! Relying party configuration

use std::convert::TryFrom;

use aliri::{
    jwa,
    jwt::{Issuer, IssuerRef, OneOrMany},
    Jwk,
};
use aliri_braid::braid;
use serde::{Deserialize, Serialize};

use crate::{discovery::ProviderMetadata, error, keys::KeySource};

const OPENID_SCOPE: &str = "openid";

/// The client identifier issued to the relying party
///
/// ID tokens must name this value in their `aud` claim.
#[braid(serde, ref_doc = "A borrowed reference to a [`ClientId`]")]
pub struct ClientId;

/// A nonce sent with an authentication request
#[braid(serde, ref_doc = "A borrowed reference to a [`Nonce`]")]
pub struct Nonce;

/// An OAuth2 scope token
///
/// A scope token must be composed of printable ASCII characters excluding
/// ` ` (space), `"` (double quote), and `\` (backslash).
#[braid(serde, validator, ref_doc = "A borrowed reference to a [`Scope`]")]
pub struct Scope;

impl aliri_braid::Validator for Scope {
    type Error = error::InvalidScope;

    /// Validates that the scope token is valid
    ///
    /// A valid scope token is non-empty and composed of printable ASCII
    /// characters except ` `, `"`, and `\`.
    fn validate(s: &str) -> Result<(), Self::Error> {
        if s.is_empty() {
            Err(error::InvalidScope::EmptyString)
        } else if let Some((position, &value)) = s
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, &b)| b <= 0x20 || b == 0x22 || b == 0x5C || 0x7F <= b)
        {
            Err(error::InvalidScope::InvalidByte { position, value })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ScopesDto {
    String(String),
    Array(Vec<Scope>),
}

impl ScopesDto {
    fn into_scopes(self) -> Result<Vec<Scope>, error::InvalidScope> {
        match self {
            Self::String(s) => s
                .split_whitespace()
                .map(|s| Scope::new(s.to_owned()))
                .collect(),
            Self::Array(arr) => Ok(arr),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ProviderConfigDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<ClientId>,
    #[serde(default, alias = "issuer", skip_serializing_if = "Option::is_none")]
    id_token_issuer: Option<Issuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signing_algorithm: Option<jwa::Algorithm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    public_keys: Option<OneOrMany<KeySource>>,
    #[serde(default)]
    nbf_tolerance_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scopes: Option<ScopesDto>,
}

impl TryFrom<ProviderConfigDto> for ProviderConfig {
    type Error = error::InvalidConfiguration;

    fn try_from(dto: ProviderConfigDto) -> Result<Self, Self::Error> {
        use error::InvalidConfiguration::MissingOption;

        let public_keys = match dto.public_keys {
            Some(OneOrMany::One(key)) => vec![key],
            Some(OneOrMany::Many(keys)) => keys,
            None => Vec::new(),
        };

        let scopes = match dto.scopes {
            Some(scopes) => scopes.into_scopes()?,
            None => Vec::new(),
        };

        let config = Self {
            client_id: dto.client_id.ok_or(MissingOption("client_id"))?,
            id_token_issuer: dto.id_token_issuer.ok_or(MissingOption("id_token_issuer"))?,
            signing_algorithm: dto
                .signing_algorithm
                .ok_or(MissingOption("signing_algorithm"))?,
            public_keys,
            nbf_tolerance_secs: dto.nbf_tolerance_secs,
            scopes,
        };

        config.validate()?;
        Ok(config)
    }
}

impl From<ProviderConfig> for ProviderConfigDto {
    fn from(config: ProviderConfig) -> Self {
        let public_keys = if config.public_keys.len() == 1 {
            config.public_keys.into_iter().next().map(OneOrMany::One)
        } else {
            Some(OneOrMany::Many(config.public_keys))
        };

        let scopes = if config.scopes.is_empty() {
            None
        } else {
            Some(ScopesDto::Array(config.scopes))
        };

        Self {
            client_id: Some(config.client_id),
            id_token_issuer: Some(config.id_token_issuer),
            signing_algorithm: Some(config.signing_algorithm),
            public_keys,
            nbf_tolerance_secs: config.nbf_tolerance_secs,
            scopes,
        }
    }
}

/// Configuration of the relying party towards a single OpenID provider
///
/// The configuration can be built up in code or deserialized:
///
/// ```
/// use aliri_oidc::ProviderConfig;
///
/// let config: ProviderConfig = serde_json::from_str(r#"{
///     "client_id": "s6BhdRkqt3",
///     "id_token_issuer": "https://server.example.com",
///     "signing_algorithm": "RS256",
///     "public_keys": "file:///etc/oidc/provider.json",
///     "scopes": "email profile"
/// }"#).unwrap();
///
/// assert_eq!(config.scope_parameter(), "email profile openid");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ProviderConfigDto", into = "ProviderConfigDto")]
pub struct ProviderConfig {
    client_id: ClientId,
    id_token_issuer: Issuer,
    signing_algorithm: jwa::Algorithm,
    public_keys: Vec<KeySource>,
    nbf_tolerance_secs: u64,
    scopes: Vec<Scope>,
}

impl ProviderConfig {
    /// Constructs a configuration without any keys or scopes
    #[must_use]
    pub fn new(
        client_id: ClientId,
        id_token_issuer: Issuer,
        signing_algorithm: jwa::Algorithm,
    ) -> Self {
        Self {
            client_id,
            id_token_issuer,
            signing_algorithm,
            public_keys: Vec::new(),
            nbf_tolerance_secs: 0,
            scopes: Vec::new(),
        }
    }

    /// Adds a source of key material
    #[must_use]
    pub fn with_public_key(mut self, key: KeySource) -> Self {
        self.public_keys.push(key);
        self
    }

    /// Adds several sources of key material
    #[must_use]
    pub fn with_public_keys<I>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = KeySource>,
    {
        self.public_keys.extend(keys);
        self
    }

    /// Sets the leeway, in seconds, granted to the `nbf` claim
    #[must_use]
    pub fn with_nbf_tolerance_secs(mut self, tolerance: u64) -> Self {
        self.nbf_tolerance_secs = tolerance;
        self
    }

    /// Adds a scope to request
    #[must_use]
    pub fn with_scope(mut self, scope: Scope) -> Self {
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }

    /// The client identifier
    pub fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }

    /// The issuer ID tokens must name
    pub fn id_token_issuer(&self) -> &IssuerRef {
        &self.id_token_issuer
    }

    /// The algorithm ID tokens must be signed with
    #[must_use]
    pub fn signing_algorithm(&self) -> jwa::Algorithm {
        self.signing_algorithm
    }

    /// The configured sources of key material
    pub fn public_keys(&self) -> &[KeySource] {
        &self.public_keys
    }

    /// The leeway, in seconds, granted to the `nbf` claim
    #[must_use]
    pub fn nbf_tolerance_secs(&self) -> u64 {
        self.nbf_tolerance_secs
    }

    /// The scopes explicitly configured
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    /// The scopes to request, always including `openid`
    #[must_use]
    pub fn requested_scopes(&self) -> Vec<&ScopeRef> {
        let mut scopes: Vec<&ScopeRef> = self.scopes.iter().map(|s| &**s).collect();
        if !scopes.iter().any(|s| s.as_str() == OPENID_SCOPE) {
            scopes.push(ScopeRef::from_static(OPENID_SCOPE));
        }
        scopes
    }

    /// The requested scopes as a single space separated parameter
    #[must_use]
    pub fn scope_parameter(&self) -> String {
        self.requested_scopes()
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Checks that every required option is present
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing option.
    pub fn validate(&self) -> Result<(), error::InvalidConfiguration> {
        if self.public_keys.is_empty() {
            return Err(error::InvalidConfiguration::MissingOption("public_keys"));
        }

        Ok(())
    }

    /// Reads every configured key source
    ///
    /// Keys are returned in the order their sources were configured.
    ///
    /// # Errors
    ///
    /// Returns an error if no key source is configured, a key file cannot
    /// be read, any key material is unusable with the signing algorithm, or
    /// the sources hold no keys at all.
    pub fn load_keys(&self) -> Result<Vec<Jwk>, error::InvalidConfiguration> {
        self.validate()?;

        let mut keys = Vec::with_capacity(self.public_keys.len());
        for source in &self.public_keys {
            keys.extend(source.load(self.signing_algorithm)?);
        }

        if keys.is_empty() {
            return Err(error::InvalidConfiguration::NoKeys);
        }

        Ok(keys)
    }

    /// Adopts the issuer and signing algorithm published by the provider
    ///
    /// The configured algorithm is kept if the provider advertises it.
    /// Otherwise the first advertised algorithm supported by this build is
    /// used instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support a requested scope
    /// or advertises no usable signing algorithm.
    pub fn apply_discovery(
        &mut self,
        metadata: &ProviderMetadata,
    ) -> Result<(), error::InvalidConfiguration> {
        metadata.check_scopes(self.requested_scopes())?;

        if !metadata.id_token_signing_alg_values_supported().is_empty()
            && !metadata.supports_signing_algorithm(self.signing_algorithm)
        {
            self.signing_algorithm = metadata
                .preferred_signing_algorithm()
                .ok_or(error::InvalidDiscovery::NoSupportedAlgorithm)?;
        }

        self.id_token_issuer = metadata.issuer().to_owned();

        tracing::info!(
            issuer = %self.id_token_issuer,
            alg = %self.signing_algorithm,
            "applied provider discovery metadata"
        );

        Ok(())
    }
}

#[cfg(all(test, feature = "hmac"))]
mod tests {
    use color_eyre::Result;

    use super::*;
    use crate::test;

    fn config() -> ProviderConfig {
        ProviderConfig::new(
            ClientId::from_static(test::CLIENT_ID),
            Issuer::from_static(test::ISSUER),
            jwa::Algorithm::HS256,
        )
    }

    #[test]
    fn openid_is_always_requested() {
        let config = config();
        assert_eq!(config.scope_parameter(), "openid");

        let config = config
            .with_scope(Scope::from_static("email"))
            .with_scope(Scope::from_static("profile"))
            .with_scope(Scope::from_static("email"));
        assert_eq!(config.scope_parameter(), "email profile openid");

        let config = config.with_scope(Scope::from_static("openid"));
        assert_eq!(config.scope_parameter(), "email profile openid");
    }

    #[test]
    fn scope_tokens_are_validated() {
        assert!(Scope::new("profile".to_owned()).is_ok());
        assert_eq!(
            Scope::new(String::new()).unwrap_err(),
            error::InvalidScope::EmptyString
        );
        assert_eq!(
            Scope::new("a b".to_owned()).unwrap_err(),
            error::InvalidScope::InvalidByte {
                position: 1,
                value: b' '
            }
        );
        assert!(Scope::new("say\"what".to_owned()).is_err());
    }

    #[test]
    fn deserializes_with_defaults() -> Result<()> {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "client_id": test::CLIENT_ID,
            "issuer": test::ISSUER,
            "signing_algorithm": "HS256",
            "public_keys": "inline secret",
        }))?;

        assert_eq!(config.client_id().as_str(), test::CLIENT_ID);
        assert_eq!(config.id_token_issuer().as_str(), test::ISSUER);
        assert_eq!(config.signing_algorithm(), jwa::Algorithm::HS256);
        assert_eq!(
            config.public_keys(),
            &[KeySource::Inline("inline secret".to_owned())]
        );
        assert_eq!(config.nbf_tolerance_secs(), 0);
        assert!(config.scopes().is_empty());

        Ok(())
    }

    #[test]
    fn deserializes_lists_of_keys_and_scopes() -> Result<()> {
        let config: ProviderConfig = serde_json::from_value(serde_json::json!({
            "client_id": test::CLIENT_ID,
            "id_token_issuer": test::ISSUER,
            "signing_algorithm": "RS256",
            "public_keys": ["file:///keys/a.pem", "file:///keys/b.pem"],
            "nbf_tolerance_secs": 30,
            "scopes": ["email", "profile"],
        }))?;

        assert_eq!(config.public_keys().len(), 2);
        assert_eq!(config.nbf_tolerance_secs(), 30);
        assert_eq!(config.scope_parameter(), "email profile openid");

        Ok(())
    }

    #[test]
    fn missing_options_are_named() {
        let missing = |value: serde_json::Value| {
            serde_json::from_value::<ProviderConfig>(value)
                .unwrap_err()
                .to_string()
        };

        assert!(missing(serde_json::json!({
            "id_token_issuer": test::ISSUER,
            "signing_algorithm": "HS256",
            "public_keys": "secret",
        }))
        .contains("required option not passed: client_id"));

        assert!(missing(serde_json::json!({
            "client_id": test::CLIENT_ID,
            "id_token_issuer": test::ISSUER,
            "signing_algorithm": "HS256",
        }))
        .contains("required option not passed: public_keys"));

        assert!(missing(serde_json::json!({
            "client_id": test::CLIENT_ID,
            "signing_algorithm": "HS256",
            "public_keys": [],
        }))
        .contains("required option not passed: id_token_issuer"));
    }

    #[test]
    fn loading_without_keys_fails() {
        let err = config().load_keys().unwrap_err();
        assert!(matches!(
            err,
            error::InvalidConfiguration::MissingOption("public_keys")
        ));
    }

    #[test]
    fn round_trips_through_json() -> Result<()> {
        let config = config()
            .with_public_key(KeySource::parse("file:///keys/provider.json"))
            .with_nbf_tolerance_secs(5)
            .with_scope(Scope::from_static("email"));

        let json = serde_json::to_value(&config)?;
        assert_eq!(json["public_keys"], "file:///keys/provider.json");

        let back: ProviderConfig = serde_json::from_value(json)?;
        assert_eq!(back, config);

        Ok(())
    }

    #[test]
    fn loads_keys_in_order() -> Result<()> {
        let secret = std::str::from_utf8(test::hmac::SECRET)?;
        let config = config()
            .with_public_keys(vec![
                KeySource::parse(test::hmac::JWK),
                KeySource::parse(secret),
            ]);

        let keys = config.load_keys()?;
        assert_eq!(keys.len(), 2);

        Ok(())
    }

    #[test]
    fn jwks_file_keys_are_loaded() -> Result<()> {
        let path = std::env::temp_dir().join(format!(
            "aliri_oidc-config-jwks-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, format!(r#"{{ "keys": [ {} ] }}"#, test::hmac::JWK))?;

        let config = config().with_public_key(KeySource::parse(&format!(
            "file://{}",
            path.display()
        )));
        let keys = config.load_keys();
        std::fs::remove_file(&path)?;

        assert_eq!(keys?.len(), 1);

        Ok(())
    }

    #[test]
    fn key_sources_without_keys_are_rejected() {
        let config = config().with_public_key(KeySource::parse(r#"{ "keys": [] }"#));

        let err = config.load_keys().unwrap_err();
        assert!(matches!(err, error::InvalidConfiguration::NoKeys));
        assert_eq!(
            err.to_string(),
            "no public keys found in the configured key material"
        );
    }

    mod discovery {
        use super::*;

        fn metadata(extra: serde_json::Value) -> ProviderMetadata {
            let mut doc = serde_json::json!({
                "issuer": "https://accounts.example.com",
                "authorization_endpoint": "https://accounts.example.com/authorize",
                "token_endpoint": "https://accounts.example.com/token",
                "jwks_uri": "https://accounts.example.com/jwks",
            });
            if let (Some(doc), serde_json::Value::Object(extra)) = (doc.as_object_mut(), extra) {
                doc.extend(extra);
            }

            ProviderMetadata::from_json(&doc.to_string()).expect("valid metadata")
        }

        #[test]
        fn adopts_the_published_issuer() -> Result<()> {
            let mut config = config();
            config.apply_discovery(&metadata(serde_json::json!({})))?;

            assert_eq!(
                config.id_token_issuer().as_str(),
                "https://accounts.example.com"
            );
            assert_eq!(config.signing_algorithm(), jwa::Algorithm::HS256);

            Ok(())
        }

        #[test]
        fn keeps_an_advertised_algorithm() -> Result<()> {
            let mut config = config();
            config.apply_discovery(&metadata(serde_json::json!({
                "id_token_signing_alg_values_supported": ["RS256", "HS256"],
            })))?;

            assert_eq!(config.signing_algorithm(), jwa::Algorithm::HS256);

            Ok(())
        }

        #[test]
        fn adopts_the_first_supported_algorithm() -> Result<()> {
            let mut config = config();
            config.apply_discovery(&metadata(serde_json::json!({
                "id_token_signing_alg_values_supported": ["none", "HS512"],
            })))?;

            assert_eq!(config.signing_algorithm(), jwa::Algorithm::HS512);

            Ok(())
        }

        #[test]
        fn rejects_unsupported_scopes() {
            let mut config = config()
                .with_scope(Scope::from_static("supported"))
                .with_scope(Scope::from_static("unsupported"));

            let err = config
                .apply_discovery(&metadata(serde_json::json!({
                    "scopes_supported": ["openid", "supported"],
                })))
                .unwrap_err();

            assert_eq!(
                err.to_string(),
                "Scope unsupported is not supported by the provider"
            );
            assert_eq!(config.id_token_issuer().as_str(), test::ISSUER);
        }
    }
}
