/*!
 * Authentication context extractor
 *
 * Responsibility:
 * - Hand the authenticated request context (AuthCtx) to handlers
 * - axum plumbing lives in core; the types live in types
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::{AuthCtx, VerifyTimings};
