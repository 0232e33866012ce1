use dpop_bind::ProofVerifier;

use crate::services::auth::access_jwt::AccessTokenVerifier;

/// Everything the access middleware needs to authenticate a request:
/// the access-token verifier, the DPoP proof verifier and the public origin
/// used to rebuild the expected `htu`.
#[derive(Clone, Debug)]
pub struct AuthService {
    access: AccessTokenVerifier,
    dpop: ProofVerifier,
    public_base_url: Option<String>,
}

impl AuthService {
    pub fn new(
        access: AccessTokenVerifier,
        dpop: ProofVerifier,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            access,
            dpop,
            public_base_url,
        }
    }

    pub fn access(&self) -> &AccessTokenVerifier {
        &self.access
    }

    pub fn dpop(&self) -> &ProofVerifier {
        &self.dpop
    }

    pub fn public_base_url(&self) -> Option<&str> {
        self.public_base_url.as_deref()
    }
}
