//! The three scripted primitives an Instance Adapter uploads once per
//! backing server, plus the digest cache used to invoke them by SHA.

/// `EVALSHA <lock_sha> 1 <resource> <token> <ttl_ms> <allow_new>`.
///
/// Sets the resource key to the token with a millisecond expiry iff either
/// the key is absent and new acquisitions are permitted (`allow_new ==
/// "yes"`), or the key already holds this exact token (the extend case).
pub const LOCK_SCRIPT: &str = r#"
if (redis.call("exists", KEYS[1]) == 0 and ARGV[3] == "yes")
   or redis.call("get", KEYS[1]) == ARGV[1]
then
  return redis.call("set", KEYS[1], ARGV[1], "PX", ARGV[2])
else
  return false
end
"#;

/// `EVALSHA <unlock_sha> 1 <resource> <token>`.
///
/// Deletes the key only if it still holds this token; a late unlock from an
/// already-expired holder must not disturb a new owner.
pub const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
  return redis.call("del", KEYS[1])
else
  return 0
end
"#;

/// `EVALSHA <pttl_sha> 1 <resource>`.
///
/// Reads the value and remaining TTL atomically so they cannot drift
/// between separate round trips.
pub const PTTL_SCRIPT: &str = r#"
return {redis.call("get", KEYS[1]), redis.call("pttl", KEYS[1])}
"#;

/// The three script digests recorded after `SCRIPT LOAD`, cached for the
/// lifetime of an `Instance`. Reload under `NOSCRIPT` is idempotent: every
/// writer uploads and stores the same three values, so a race between
/// concurrent reloaders is harmless.
#[derive(Debug, Clone)]
pub(crate) struct ScriptShas {
    pub lock: String,
    pub unlock: String,
    pub pttl: String,
}
