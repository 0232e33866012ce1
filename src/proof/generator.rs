use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use tracing::debug;

use crate::error::DpopError;
use crate::key::DpopKey;
use crate::proof::codec::{Proof, ProofClaims, compute_ath, normalize_htu, sign_claims};

// Entropy behind each jti.
const JTI_BYTES: usize = 16;

/// Build and sign a proof for one outbound request.
///
/// - `method`: HTTP verb, bound verbatim as `htm`
/// - `url`: absolute request URL; query and fragment are dropped for `htu`
/// - `access_token`: token sent alongside; its SHA-256 hex becomes `ath`
///
/// Every call draws a new `jti` and stamps `iat` with the current time.
pub fn create_proof(
    method: &str,
    url: &str,
    access_token: &str,
    key: &DpopKey,
) -> Result<Proof, DpopError> {
    if method.is_empty() {
        return Err(DpopError::InvalidInput("method must not be empty"));
    }
    if access_token.is_empty() {
        return Err(DpopError::InvalidInput("access token must not be empty"));
    }
    let htu = htu_from_url(url)?;

    let claims = ProofClaims {
        jti: new_jti()?,
        htm: method.to_string(),
        htu,
        iat: chrono::Utc::now().timestamp(),
        ath: compute_ath(access_token),
    };

    let proof = sign_claims(key, &claims)?;
    debug!(jti = %claims.jti, htm = %claims.htm, htu = %claims.htu, "created DPoP proof");
    Ok(proof)
}

fn htu_from_url(raw: &str) -> Result<String, DpopError> {
    let url =
        url::Url::parse(raw).map_err(|_| DpopError::InvalidInput("url must be absolute"))?;
    if !url.has_host() {
        return Err(DpopError::InvalidInput("url must have a host"));
    }
    // Bound as written; the verifier compares strings, not parsed URLs.
    Ok(normalize_htu(raw).to_string())
}

fn new_jti() -> Result<String, DpopError> {
    let mut bytes = [0u8; JTI_BYTES];
    getrandom::fill(&mut bytes).map_err(|e| DpopError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims_of(proof: &Proof) -> serde_json::Value {
        let payload = proof.as_str().split('.').nth(1).expect("claims segment");
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).expect("b64")).expect("json")
    }

    #[test]
    fn binds_method_url_and_token() {
        let key = DpopKey::generate().expect("keygen");
        let proof = create_proof(
            "POST",
            "https://api.example.com/items?page=2#top",
            "tok-123",
            &key,
        )
        .expect("proof");
        let claims = claims_of(&proof);

        assert_eq!(claims["htm"], "POST");
        assert_eq!(claims["htu"], "https://api.example.com/items");
        assert_eq!(claims["ath"], compute_ath("tok-123"));
        assert!((chrono::Utc::now().timestamp() - claims["iat"].as_i64().expect("iat")).abs() <= 2);
    }

    #[test]
    fn htu_keeps_the_url_as_written() {
        let key = DpopKey::generate().expect("keygen");
        let proof = create_proof("GET", "https://API.example.com:443/x?y=1", "t", &key)
            .expect("proof");
        assert_eq!(claims_of(&proof)["htu"], "https://API.example.com:443/x");

        let bare = create_proof("GET", "https://api.example.com", "t", &key).expect("proof");
        assert_eq!(claims_of(&bare)["htu"], "https://api.example.com");
    }

    #[test]
    fn jti_is_fresh_and_url_safe() {
        let key = DpopKey::generate().expect("keygen");
        let a = create_proof("GET", "https://api/x", "t", &key).expect("proof");
        let b = create_proof("GET", "https://api/x", "t", &key).expect("proof");

        assert_ne!(a.jti(), b.jti());
        // 16 bytes -> 22 base64url chars
        assert_eq!(a.jti().len(), 22);
        assert!(
            a.jti()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        let key = DpopKey::generate().expect("keygen");
        assert!(matches!(
            create_proof("", "https://api/x", "t", &key),
            Err(DpopError::InvalidInput(_))
        ));
        assert!(matches!(
            create_proof("GET", "/relative", "t", &key),
            Err(DpopError::InvalidInput(_))
        ));
        assert!(matches!(
            create_proof("GET", "https://api/x", "", &key),
            Err(DpopError::InvalidInput(_))
        ));
    }
}
