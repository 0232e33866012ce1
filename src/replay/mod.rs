/*
 * Responsibility
 * - `jti` replay protection behind one trait (`ReplayStore`)
 *   - memory: single process, lock-guarded map with lazy + background expiry
 *   - valkey: shared across instances (SET NX EX)
 */
mod memory;
mod store;
mod valkey;

pub use memory::MemoryReplayCache;
pub use store::{ReplayError, ReplayStore};
pub use valkey::ValkeyReplayStore;
