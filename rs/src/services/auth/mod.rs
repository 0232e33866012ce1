pub mod access_jwt;
pub mod factory;
pub mod service;

pub use access_jwt::AccessTokenVerifier;
pub use factory::build_auth_service;
pub use service::AuthService;
