/*
 * Responsibility
 * - Middleware that authenticates requests (DPoP-bound access tokens)
 */
pub mod access;
