//! Key material for ID token signature verification
//!
//! Key material is given either inline or as a `file://` reference to be
//! read from disk. The contents are interpreted by their shape:
//!
//! * a JSON object with a `keys` member is a JWKS, and contributes every
//!   key it holds,
//! * any other JSON object is a single JWK,
//! * a PEM block is an RSA public key (requires the `pem` feature),
//! * anything else is the shared secret of an HMAC signing algorithm.

use std::{convert::TryFrom, fmt, path::PathBuf, str::FromStr};

use aliri::{jwa, jws, Jwk, Jwks};
use serde::{Deserialize, Serialize};

use crate::error;

const FILE_SCHEME: &str = "file://";

/// Where key material comes from
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeySource {
    /// Key material to be read from a file
    File(PathBuf),

    /// Key material given directly
    Inline(String),
}

impl KeySource {
    /// Interprets a string as a `file://` reference or inline key material
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::from(value.to_owned())
    }

    /// Reads the key material
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read.
    pub fn read(&self) -> Result<String, error::InvalidConfiguration> {
        match self {
            Self::File(path) => std::fs::read_to_string(path).map_err(|source| {
                error::InvalidConfiguration::UnreadableKey {
                    path: path.clone(),
                    source,
                }
            }),
            Self::Inline(material) => Ok(material.clone()),
        }
    }

    /// Reads the key material and turns it into keys for the given algorithm
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced file cannot be read or if the
    /// material is not usable with the algorithm.
    pub fn load(&self, alg: jwa::Algorithm) -> Result<Vec<Jwk>, error::InvalidConfiguration> {
        let material = self.read()?;
        let keys = parse_key_material(&material, alg)?;

        if let Self::File(path) = self {
            tracing::debug!(path = %path.display(), keys = keys.len(), "loaded key material from file");
        }

        Ok(keys)
    }
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Inline(_) => f.write_str("Inline(***KEY MATERIAL***)"),
        }
    }
}

impl FromStr for KeySource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for KeySource {
    fn from(value: String) -> Self {
        match value.strip_prefix(FILE_SCHEME) {
            Some(path) => Self::File(PathBuf::from(path)),
            None => Self::Inline(value),
        }
    }
}

impl From<KeySource> for String {
    fn from(source: KeySource) -> Self {
        match source {
            KeySource::File(path) => format!("{}{}", FILE_SCHEME, path.display()),
            KeySource::Inline(material) => material,
        }
    }
}

/// Turns key material into keys for the given algorithm
///
/// # Errors
///
/// Returns an error if JSON key material is not a valid JWK or JWKS, if
/// PEM key material is not a valid RSA public key or PEM support is not
/// enabled, or if plain material is given for an algorithm that is not
/// HMAC based.
pub fn parse_key_material(material: &str, alg: jwa::Algorithm) -> Result<Vec<Jwk>, error::KeyRejected> {
    let trimmed = material.trim_start();

    if trimmed.starts_with('{') {
        // Key parameters borrow from their input, so deserialize from the text itself.
        let shape: serde_json::Value =
            serde_json::from_str(trimmed).map_err(error::key_rejected)?;

        if shape.get("keys").is_some() {
            let jwks: Jwks = serde_json::from_str(trimmed).map_err(error::key_rejected)?;
            Ok(jwks.keys().to_vec())
        } else {
            let jwk: Jwk = serde_json::from_str(trimmed).map_err(error::key_rejected)?;
            Ok(vec![jwk])
        }
    } else if trimmed.starts_with("-----BEGIN") {
        pem_public_key(trimmed, alg).map(|jwk| vec![jwk])
    } else if is_hmac(alg) {
        hmac_secret(material, alg).map(|jwk| vec![jwk])
    } else {
        Err(error::key_rejected(
            "plain key material can only be used with HMAC algorithms",
        ))
    }
}

fn is_hmac(alg: jwa::Algorithm) -> bool {
    match jws::Algorithm::try_from(alg) {
        #[cfg(feature = "hmac")]
        Ok(jws::Algorithm::Hmac(_)) => true,
        _ => false,
    }
}

#[cfg(feature = "hmac")]
fn hmac_secret(secret: &str, alg: jwa::Algorithm) -> Result<Jwk, error::KeyRejected> {
    use aliri_base64::Base64Url;

    if secret.is_empty() {
        return Err(error::key_rejected("HMAC secret must not be empty"));
    }

    let key = jwa::Hmac::new(Base64Url::from_raw(secret.as_bytes()));
    Ok(Jwk::from(key).with_algorithm(alg))
}

#[cfg(not(feature = "hmac"))]
fn hmac_secret(_secret: &str, _alg: jwa::Algorithm) -> Result<Jwk, error::KeyRejected> {
    Err(error::key_rejected("HMAC support is not enabled"))
}

#[cfg(all(feature = "rsa", feature = "pem"))]
fn pem_public_key(pem: &str, alg: jwa::Algorithm) -> Result<Jwk, error::KeyRejected> {
    let key = jwa::Rsa::public_key_from_pem(pem).map_err(error::key_rejected)?;
    Ok(Jwk::from(key).with_algorithm(alg))
}

#[cfg(not(all(feature = "rsa", feature = "pem")))]
fn pem_public_key(_pem: &str, _alg: jwa::Algorithm) -> Result<Jwk, error::KeyRejected> {
    Err(error::key_rejected("PEM key material requires the `pem` feature"))
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    #[test]
    fn file_references_are_recognized() {
        assert_eq!(
            KeySource::parse("file:///etc/oidc/key.pem"),
            KeySource::File(PathBuf::from("/etc/oidc/key.pem"))
        );
        assert_eq!(
            KeySource::parse("secret"),
            KeySource::Inline("secret".to_owned())
        );
        assert_eq!(
            String::from(KeySource::parse("file://key.json")),
            "file://key.json"
        );
    }

    #[test]
    fn inline_material_is_not_revealed() {
        let source = KeySource::parse("super secret");
        assert_eq!(format!("{:?}", source), "Inline(***KEY MATERIAL***)");
    }

    #[test]
    fn missing_files_are_reported() {
        let source = KeySource::parse("file:///definitely/not/a/real/key.pem");

        let err = source.read().unwrap_err();
        assert!(matches!(
            err,
            error::InvalidConfiguration::UnreadableKey { .. }
        ));
    }

    #[test]
    #[cfg(feature = "rsa")]
    fn plain_material_needs_an_hmac_algorithm() {
        let err = parse_key_material("secret", jwa::Algorithm::RS256).unwrap_err();
        assert!(err.to_string().contains("key rejected"));
    }

    #[test]
    #[cfg(all(feature = "rsa", not(feature = "pem")))]
    fn pem_material_needs_the_pem_feature() {
        let pem = "-----BEGIN PUBLIC KEY-----\nMIIB\n-----END PUBLIC KEY-----\n";
        assert!(parse_key_material(pem, jwa::Algorithm::RS256).is_err());
    }

    #[cfg(feature = "hmac")]
    mod hmac {
        use aliri::jws::Verifier;

        use super::*;
        use crate::{test::hmac, IdentityToken};

        fn verifies(keys: &[Jwk]) -> Result<bool> {
            let token = IdentityToken::parse(hmac::token())?;
            Ok(keys.iter().any(|k| {
                k.verify(token.alg(), token.signing_input(), token.signature().as_slice())
                    .is_ok()
            }))
        }

        #[test]
        fn plain_material_is_an_hmac_secret() -> Result<()> {
            let secret = std::str::from_utf8(hmac::SECRET)?;
            let keys = parse_key_material(secret, jwa::Algorithm::HS256)?;

            assert_eq!(keys.len(), 1);
            assert!(verifies(&keys)?);

            Ok(())
        }

        #[test]
        fn empty_secrets_are_rejected() {
            assert!(parse_key_material("", jwa::Algorithm::HS256).is_err());
        }

        #[test]
        fn json_material_is_a_jwk() -> Result<()> {
            let keys = parse_key_material(hmac::JWK, jwa::Algorithm::HS256)?;

            assert_eq!(keys.len(), 1);
            assert!(verifies(&keys)?);

            Ok(())
        }

        #[test]
        fn json_material_with_keys_is_a_jwks() -> Result<()> {
            let jwks = format!(r#"{{ "keys": [ {} ] }}"#, hmac::JWK);
            let keys = parse_key_material(&jwks, jwa::Algorithm::HS256)?;

            assert_eq!(keys.len(), 1);
            assert!(verifies(&keys)?);

            Ok(())
        }

        #[test]
        fn jwks_keys_load_in_order() -> Result<()> {
            let other = Jwk::from(jwa::Hmac::new(aliri_base64::Base64Url::from_raw(
                hmac::OTHER_SECRET.to_vec(),
            )));
            let jwks = format!(
                r#"{{ "keys": [ {}, {} ] }}"#,
                serde_json::to_string(&other)?,
                hmac::JWK
            );

            let keys = parse_key_material(&jwks, jwa::Algorithm::HS256)?;

            assert_eq!(keys.len(), 2);
            assert!(!verifies(&keys[..1])?);
            assert!(verifies(&keys[1..])?);

            Ok(())
        }

        #[test]
        fn empty_jwks_yields_no_keys() -> Result<()> {
            let keys = parse_key_material(r#"{ "keys": [] }"#, jwa::Algorithm::HS256)?;
            assert!(keys.is_empty());

            Ok(())
        }

        #[test]
        fn malformed_json_is_rejected() {
            assert!(parse_key_material("{ not json", jwa::Algorithm::HS256).is_err());
        }

        #[test]
        fn file_material_is_read_from_disk() -> Result<()> {
            let path = std::env::temp_dir().join(format!(
                "aliri_oidc-keys-test-{}.json",
                std::process::id()
            ));
            std::fs::write(&path, hmac::JWK)?;

            let source = KeySource::parse(&format!("file://{}", path.display()));
            let keys = source.load(jwa::Algorithm::HS256);
            std::fs::remove_file(&path)?;

            assert!(verifies(&keys?)?);

            Ok(())
        }
    }
}
