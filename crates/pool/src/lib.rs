//! Resource pool: the arena that owns every renderer object.
//!
//! Objects are created into a pool and addressed by a generation-checked
//! key. The pool owns the object exclusively until `destroy` is called with
//! that key.
//!
//! # Invariants
//! - A key returned by `create` resolves to its object until `destroy`.
//! - A destroyed key never resolves again, even after its slot is reused.
//! - `destroy` with an unknown or stale key is a no-op.
//! - Iteration follows insertion order until a destroy; destroy compacts
//!   by swap-remove, so order is not preserved across destroys.
//! - Single-threaded. No locking.

mod pool;

pub use pool::Pool;
pub use slotmap::{Key, KeyData, new_key_type};

pub fn crate_info() -> &'static str {
    "swarm-pool v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("pool"));
    }
}
