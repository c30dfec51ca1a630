//! Acquisition options for `Coordinator::lock`.
//!
//! The original Redlock clients accept a loosely typed option bag, including
//! a couple of deprecated aliases left over from earlier releases. Here that
//! bag becomes a plain struct with the canonical fields enumerated up front;
//! the deprecated aliases are builder methods that fold into the canonical
//! field and emit a one-time warning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Once;

use crate::descriptor::LockDescriptor;

static SUPPRESS_DEPRECATION_WARNINGS: AtomicBool = AtomicBool::new(false);
static DEPRECATION_WARNED: Once = Once::new();

/// Silence the one-time deprecation warning emitted by
/// [`LockOptions::extend_only_if_life`] / [`LockOptions::extend_life`].
///
/// Intended for test suites that exercise the deprecated aliases on purpose
/// and don't want the warning poisoning their output.
pub fn suppress_deprecation_warnings(suppress: bool) {
    SUPPRESS_DEPRECATION_WARNINGS.store(suppress, Ordering::Relaxed);
}

fn warn_deprecated_once() {
    if SUPPRESS_DEPRECATION_WARNINGS.load(Ordering::Relaxed) {
        return;
    }
    DEPRECATION_WARNED.call_once(|| {
        tracing::warn!(
            "extend_only_if_life/extend_life are deprecated aliases of extend_only_if_locked"
        );
    });
}

/// Options recognized by [`crate::Coordinator::lock`].
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    /// Reuse the token from an existing descriptor instead of minting a
    /// fresh one. Forces the attempt loop to a single try (no retries).
    pub extend: Option<LockDescriptor>,
    /// When extending, forbid creating a fresh key if the lock has already
    /// lapsed everywhere. Ignored for a fresh (non-extend) acquisition.
    pub extend_only_if_locked: bool,
}

impl LockOptions {
    /// Start a fresh (non-extend) acquisition with default options.
    pub fn new() -> Self {
        LockOptions::default()
    }

    /// Extend the given lock, reusing its token.
    pub fn extend(mut self, descriptor: LockDescriptor) -> Self {
        self.extend = Some(descriptor);
        self
    }

    /// See [`LockOptions::extend_only_if_locked`] field docs.
    pub fn extend_only_if_locked(mut self, value: bool) -> Self {
        self.extend_only_if_locked = value;
        self
    }

    /// Deprecated alias of [`Self::extend_only_if_locked`].
    #[deprecated(note = "use extend_only_if_locked instead")]
    pub fn extend_only_if_life(self, value: bool) -> Self {
        warn_deprecated_once();
        self.extend_only_if_locked(value)
    }

    /// Deprecated alias of [`Self::extend_only_if_locked`].
    #[deprecated(note = "use extend_only_if_locked instead")]
    pub fn extend_life(self, value: bool) -> Self {
        warn_deprecated_once();
        self.extend_only_if_locked(value)
    }

    pub(crate) fn allow_new_flag(&self) -> &'static str {
        if self.extend.is_some() && self.extend_only_if_locked {
            "no"
        } else {
            "yes"
        }
    }
}
