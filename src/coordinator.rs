//! This mod specifies and implements the Quorum Coordinator, the
//! Distributed Lock Manager object, together with the scoped and
//! strict-scoped acquisition forms.

use std::thread::sleep;
use std::time::Duration;

use crate::config::{drift, CoordinatorConfig};
use crate::descriptor::{generate_token, uniform_jitter_ms, LockDescriptor};
use crate::error::{RedlockError, RedlockResult};
use crate::instance::Instance;
use crate::options::LockOptions;

/// The quorum threshold and the set of Instance Adapters it is computed
/// over, plus retry policy, drift constant, and monotonic time source.
pub struct Coordinator {
    instances: Vec<Instance>,
    quorum: usize,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Build a coordinator over the given Instance Adapters with default
    /// retry policy. Rejects an empty instance list: with zero adapters,
    /// `quorum = 1` is unsatisfiable and would silently fail every
    /// acquisition forever.
    pub fn new(instances: Vec<Instance>) -> RedlockResult<Coordinator> {
        Coordinator::with_config(instances, CoordinatorConfig::default())
    }

    /// Build a coordinator with an explicit [`CoordinatorConfig`].
    pub fn with_config(
        instances: Vec<Instance>,
        config: CoordinatorConfig,
    ) -> RedlockResult<Coordinator> {
        if instances.is_empty() {
            return Err(RedlockError::NotEnoughInstances);
        }
        let quorum = instances.len() / 2 + 1;
        tracing::info!(
            instance_count = instances.len(),
            quorum,
            "quorum coordinator constructed"
        );
        Ok(Coordinator {
            instances,
            quorum,
            config,
        })
    }

    /// Acquire (or extend) a lock on `resource` for `ttl`.
    pub fn lock(
        &self,
        resource: &str,
        ttl: Duration,
        options: LockOptions,
    ) -> RedlockResult<LockDescriptor> {
        let ttl_ms = ttl.as_millis() as i64;
        let token = match &options.extend {
            Some(descriptor) => descriptor.value().to_string(),
            None => generate_token(),
        };
        let allow_new = options.allow_new_flag();
        let tries = if options.extend.is_some() {
            1
        } else {
            self.config.retry_count + 1
        };

        for attempt in 0..tries {
            if attempt > 0 {
                let delay_ms =
                    self.config.retry_delay.resolve(attempt) + uniform_jitter_ms(self.config.retry_jitter_ms);
                sleep(Duration::from_millis(delay_ms));
            }

            if let Some(descriptor) = self.attempt_once(resource, &token, ttl_ms, allow_new) {
                return Ok(descriptor);
            }
        }

        Err(RedlockError::CannotObtainLock(resource.to_string()))
    }

    fn attempt_once(
        &self,
        resource: &str,
        token: &str,
        ttl_ms: i64,
        allow_new: &str,
    ) -> Option<LockDescriptor> {
        let t0 = (self.config.time_source)();
        let granted = self
            .instances
            .iter()
            .filter(|instance| instance.try_acquire(resource, token, ttl_ms, allow_new))
            .count();
        let t1 = (self.config.time_source)();
        let elapsed = t1 - t0;
        let validity = ttl_ms - elapsed - drift(ttl_ms);

        if granted >= self.quorum && validity >= 0 {
            tracing::debug!(resource, granted, validity, "quorum acquired");
            Some(LockDescriptor::new(resource.to_string(), token.to_string(), validity))
        } else {
            tracing::debug!(resource, granted, validity, "quorum not reached, releasing");
            self.release_everywhere(resource, token);
            None
        }
    }

    /// Extend the given lock by `ttl`, reusing its token.
    pub fn extend(
        &self,
        descriptor: &LockDescriptor,
        ttl: Duration,
        extend_only_if_locked: bool,
    ) -> RedlockResult<LockDescriptor> {
        self.lock(
            descriptor.resource(),
            ttl,
            LockOptions::new()
                .extend(descriptor.clone())
                .extend_only_if_locked(extend_only_if_locked),
        )
    }

    /// Unconditional, best-effort release fan-out across every adapter.
    pub fn unlock(&self, descriptor: &LockDescriptor) {
        self.release_everywhere(descriptor.resource(), descriptor.value());
    }

    fn release_everywhere(&self, resource: &str, token: &str) {
        for instance in &self.instances {
            instance.release(resource, token);
        }
    }

    /// The authoritative remaining TTL for `descriptor`, or `None` if the
    /// authoritative holder across a quorum of servers is not this token.
    pub fn remaining_ttl_for_lock(&self, descriptor: &LockDescriptor) -> Option<i64> {
        let (value, ttl) = self.introspect(descriptor.resource())?;
        if value == descriptor.value() {
            Some(ttl)
        } else {
            None
        }
    }

    /// The authoritative remaining TTL for whichever token a quorum of
    /// servers agree holds `resource`.
    pub fn remaining_ttl_for_resource(&self, resource: &str) -> Option<i64> {
        self.introspect(resource).map(|(_, ttl)| ttl)
    }

    fn introspect(&self, resource: &str) -> Option<(String, i64)> {
        let t0 = (self.config.time_source)();
        let readings: Vec<(String, i64)> = self
            .instances
            .iter()
            .filter_map(|instance| instance.read_ttl(resource))
            .collect();
        let t1 = (self.config.time_source)();
        let elapsed = t1 - t0;

        let (value, pttls) = group_by_max_value(readings)?;
        if pttls.len() < self.quorum {
            return None;
        }
        let m = kth_largest_floor(&pttls, self.quorum)?;
        Some((value, m - elapsed - drift(m)))
    }

    /// True iff some token is authoritatively held on `resource` with a
    /// strictly positive remaining TTL.
    pub fn locked_q(&self, resource: &str) -> bool {
        matches!(self.remaining_ttl_for_resource(resource), Some(ttl) if ttl > 0)
    }

    /// True iff `descriptor`'s token is still authoritatively held with a
    /// strictly positive remaining TTL.
    pub fn valid_q(&self, descriptor: &LockDescriptor) -> bool {
        matches!(self.remaining_ttl_for_lock(descriptor), Some(ttl) if ttl > 0)
    }

    /// Scoped acquisition: on success, `f` is called with `Ok(&descriptor)`
    /// and the lock is released (via an RAII guard) on every exit path,
    /// including an unwinding panic inside `f`. On failure, `f` is called
    /// with the error and no release is attempted. Returns whether the
    /// acquisition itself succeeded.
    pub fn locked<F>(&self, resource: &str, ttl: Duration, options: LockOptions, f: F) -> bool
    where
        F: FnOnce(Result<&LockDescriptor, &RedlockError>),
    {
        match self.lock(resource, ttl, options) {
            Ok(descriptor) => {
                let _guard = LockGuard {
                    coordinator: self,
                    descriptor: descriptor.clone(),
                };
                f(Ok(&descriptor));
                true
            }
            Err(err) => {
                f(Err(&err));
                false
            }
        }
    }

    /// Strict scoped acquisition: propagates `f`'s return value on success,
    /// or [`RedlockError::LockUnavailable`] on failure to acquire. The lock
    /// is released on every exit path, including an unwinding panic inside
    /// `f`.
    pub fn locked_or_fail<F, R>(
        &self,
        resource: &str,
        ttl: Duration,
        options: LockOptions,
        f: F,
    ) -> RedlockResult<R>
    where
        F: FnOnce() -> R,
    {
        let descriptor = self
            .lock(resource, ttl, options)
            .map_err(|_| RedlockError::LockUnavailable(resource.to_string()))?;
        let _guard = LockGuard {
            coordinator: self,
            descriptor: descriptor.clone(),
        };
        Ok(f())
    }
}

/// RAII guard releasing its lock on drop, used by both scoped forms so that
/// an unwinding panic inside the caller's critical section still triggers
/// the compensating release fan-out.
struct LockGuard<'a> {
    coordinator: &'a Coordinator,
    descriptor: LockDescriptor,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.unlock(&self.descriptor);
    }
}

/// Group `(value, pttl)` pairs by value, keeping only the group of maximum
/// cardinality (ties broken arbitrarily — correctness does not depend on
/// which of an equal-size tie wins). Returns the authoritative value and its
/// TTL list.
fn group_by_max_value(readings: Vec<(String, i64)>) -> Option<(String, Vec<i64>)> {
    use std::collections::HashMap;

    let mut groups: HashMap<String, Vec<i64>> = HashMap::new();
    for (value, pttl) in readings {
        groups.entry(value).or_default().push(pttl);
    }
    groups
        .into_iter()
        .max_by_key(|(_, pttls)| pttls.len())
}

/// The `(n - quorum + 1)`-th order statistic of `values`: the largest `m`
/// such that at least `quorum` entries are `>= m`. Pure and independent of
/// any I/O, so it is exercised directly by unit tests.
fn kth_largest_floor(values: &[i64], quorum: usize) -> Option<i64> {
    if values.len() < quorum || quorum == 0 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    sorted.get(sorted.len() - quorum).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kth_largest_floor_picks_the_quorum_th_order_statistic() {
        // 5 values, quorum 3: sorted [10, 20, 30, 40, 50], the 3 largest are
        // {30, 40, 50}; the smallest of those is 30.
        assert_eq!(kth_largest_floor(&[50, 10, 40, 20, 30], 3), Some(30));
    }

    #[test]
    fn kth_largest_floor_returns_none_below_quorum() {
        assert_eq!(kth_largest_floor(&[10, 20], 3), None);
    }

    #[test]
    fn kth_largest_floor_quorum_one_is_the_max() {
        assert_eq!(kth_largest_floor(&[5, 9, 1], 1), Some(9));
    }

    #[test]
    fn group_by_max_value_picks_the_largest_group() {
        let readings = vec![
            ("a".to_string(), 100),
            ("b".to_string(), 50),
            ("a".to_string(), 90),
            ("a".to_string(), 80),
        ];
        let (value, mut pttls) = group_by_max_value(readings).unwrap();
        pttls.sort_unstable();
        assert_eq!(value, "a");
        assert_eq!(pttls, vec![80, 90, 100]);
    }

    #[test]
    fn group_by_max_value_empty_is_none() {
        assert!(group_by_max_value(Vec::new()).is_none());
    }
}
