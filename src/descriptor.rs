//! The `Lock` descriptor returned to a successful caller, and the token
//! generator used to mint it.

use rand::RngCore;
use uuid::Uuid;

/// The triple returned on a successful acquisition.
///
/// Immutable once constructed: `resource` and `value` identify the held
/// key, `validity` is an upper bound, in milliseconds, on how long from the
/// moment of return the holder may safely assume exclusivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockDescriptor {
    resource: String,
    value: String,
    validity: i64,
}

impl LockDescriptor {
    pub(crate) fn new(resource: String, value: String, validity: i64) -> Self {
        LockDescriptor {
            resource,
            value,
            validity,
        }
    }

    /// The name of the locked resource.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The random token proving ownership of the lock.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Upper bound, in milliseconds, on remaining exclusivity as of the
    /// moment this descriptor was returned.
    pub fn validity(&self) -> i64 {
        self.validity
    }
}

/// Mint a fresh, cryptographically random lock token.
///
/// A v4 UUID carries 122 bits of entropy, comfortably satisfying the
/// "no two distinct acquisitions share a token" invariant.
pub fn generate_token() -> String {
    Uuid::new_v4().to_string()
}

/// Draw a uniform random delay in `[0, bound)` milliseconds. Returns 0 when
/// `bound` is 0 so callers needn't special-case a disabled jitter.
pub(crate) fn uniform_jitter_ms(bound: u64) -> u64 {
    if bound == 0 {
        return 0;
    }
    rand::thread_rng().next_u64() % bound
}
