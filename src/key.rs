//! Client-held P-256 signing key (the unit of possession).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
    EncodingKey,
    jwk::{
        AlgorithmParameters, CommonParameters, EllipticCurve, EllipticCurveKeyParameters,
        EllipticCurveKeyType, Jwk,
    },
};
use p256::{
    SecretKey,
    elliptic_curve::sec1::ToEncodedPoint,
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
};
use sha2::{Digest, Sha256};

use crate::error::DpopError;

// A random 32-byte string is out of the P-256 scalar range with probability
// ~2^-32; a handful of draws is plenty.
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// Ephemeral ES256 key pair.
///
/// The private scalar only lives inside the jsonwebtoken `EncodingKey`; nothing
/// on this type hands it back out.
#[derive(Clone)]
pub struct DpopKey {
    encoding_key: EncodingKey,
    jwk: Jwk,
    thumbprint: String,
}

impl std::fmt::Debug for DpopKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("DpopKey")
            .field("jkt", &self.thumbprint)
            .finish()
    }
}

impl DpopKey {
    /// Generate a fresh key from OS entropy.
    pub fn generate() -> Result<Self, DpopError> {
        let mut bytes = [0u8; 32];
        for _ in 0..MAX_KEYGEN_ATTEMPTS {
            getrandom::fill(&mut bytes).map_err(|e| DpopError::Entropy(e.to_string()))?;
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                bytes.fill(0);
                return Self::from_secret(&secret);
            }
        }
        Err(DpopError::Entropy(
            "could not draw a valid P-256 scalar".to_string(),
        ))
    }

    /// Load a P-256 private key from PKCS#8 PEM.
    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, DpopError> {
        let secret =
            SecretKey::from_pkcs8_pem(pem).map_err(|e| DpopError::InvalidKey(e.to_string()))?;
        Self::from_secret(&secret)
    }

    fn from_secret(secret: &SecretKey) -> Result<Self, DpopError> {
        let point = secret.public_key().to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)),
            _ => {
                return Err(DpopError::InvalidKey(
                    "public point has no affine coordinates".to_string(),
                ));
            }
        };

        // jsonwebtoken wants PKCS#8 DER for EC keys.
        let der = secret
            .to_pkcs8_der()
            .map_err(|e| DpopError::InvalidKey(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_der(der.as_bytes());

        let thumbprint = ec_thumbprint(&x, &y);
        let jwk = Jwk {
            common: CommonParameters::default(),
            algorithm: AlgorithmParameters::EllipticCurve(EllipticCurveKeyParameters {
                key_type: EllipticCurveKeyType::EC,
                curve: EllipticCurve::P256,
                x,
                y,
            }),
        };

        Ok(Self {
            encoding_key,
            jwk,
            thumbprint,
        })
    }

    /// Public half as a JWK, embedded in every proof header.
    pub fn public_record(&self) -> &Jwk {
        &self.jwk
    }

    /// RFC 7638 thumbprint of the public key (`jkt`).
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }
}

/// RFC 7638 thumbprint for an EC P-256 JWK; `None` for any other key type.
pub fn jwk_thumbprint(jwk: &Jwk) -> Option<String> {
    match &jwk.algorithm {
        AlgorithmParameters::EllipticCurve(params) if params.curve == EllipticCurve::P256 => {
            Some(ec_thumbprint(&params.x, &params.y))
        }
        _ => None,
    }
}

fn ec_thumbprint(x: &str, y: &str) -> String {
    // Canonical JSON: required members only, lexicographic order, no whitespace.
    let canonical = format!(
        "{{\"crv\":\"P-256\",\"kty\":\"EC\",\"x\":\"{}\",\"y\":\"{}\"}}",
        x, y
    );
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_record_is_a_bare_p256_jwk() {
        let key = DpopKey::generate().expect("keygen");
        let value = serde_json::to_value(key.public_record()).expect("serialize");

        assert_eq!(value["kty"], "EC");
        assert_eq!(value["crv"], "P-256");
        assert!(value.get("d").is_none());
        // 32-byte coordinates -> 43 base64url chars
        assert_eq!(value["x"].as_str().map(str::len), Some(43));
        assert_eq!(value["y"].as_str().map(str::len), Some(43));
    }

    #[test]
    fn thumbprint_matches_recomputation_from_jwk() {
        let key = DpopKey::generate().expect("keygen");
        assert_eq!(
            jwk_thumbprint(key.public_record()).as_deref(),
            Some(key.thumbprint())
        );
    }

    #[test]
    fn every_generate_yields_a_distinct_key() {
        let a = DpopKey::generate().expect("keygen");
        let b = DpopKey::generate().expect("keygen");
        assert_ne!(a.thumbprint(), b.thumbprint());
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = DpopKey::generate().expect("keygen");
        let printed = format!("{:?}", key);
        assert!(printed.contains(key.thumbprint()));
        assert!(!printed.contains("encoding_key"));
    }

    #[test]
    fn rejects_garbage_pem() {
        assert!(matches!(
            DpopKey::from_pkcs8_pem("not a pem"),
            Err(DpopError::InvalidKey(_))
        ));
    }
}
