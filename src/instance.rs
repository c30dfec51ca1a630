//! The Instance Adapter: wraps one backing Redis server, uploads the three
//! scripted primitives once, and exposes atomic `try_acquire`/`release`/
//! `read_ttl` with transparent `NOSCRIPT` recovery.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use redis::{Client, Connection, ErrorKind, IntoConnectionInfo, RedisResult, Value};

use crate::error::{RedlockError, RedlockResult};
use crate::script::{ScriptShas, LOCK_SCRIPT, PTTL_SCRIPT, UNLOCK_SCRIPT};

/// A caller-supplied connection pool exposing scoped checkout.
///
/// Anything satisfying this trait can back an `Instance`: the adapter never
/// assumes more than "give me a connection, and let it go when I'm done
/// with it".
pub trait ConnectionPool: Send + Sync {
    fn checkout(&self) -> RedisResult<Connection>;
}

enum ConnectionSource {
    /// A fresh connection per operation, reconnecting on every call.
    Client { client: Client, timeout: Duration },
    /// A single bare connection wrapped as a trivial pool of one.
    Bare(Mutex<Connection>),
    /// A caller-supplied pool-like object.
    Pool(Arc<dyn ConnectionPool>),
}

/// A checked-out connection, released automatically on drop regardless of
/// how the caller's operation exits.
pub(crate) enum ConnectionGuard<'a> {
    Owned(Connection),
    Guarded(std::sync::MutexGuard<'a, Connection>),
}

impl Deref for ConnectionGuard<'_> {
    type Target = Connection;
    fn deref(&self) -> &Connection {
        match self {
            ConnectionGuard::Owned(c) => c,
            ConnectionGuard::Guarded(c) => c,
        }
    }
}

impl DerefMut for ConnectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        match self {
            ConnectionGuard::Owned(c) => c,
            ConnectionGuard::Guarded(c) => c,
        }
    }
}

/// Wraps one backing Redis server.
///
/// Script digests are loaded best-effort at construction time and lazily
/// (re)loaded on first use otherwise, so a quorum coordinator can be built
/// even while some backing servers are temporarily unreachable — those
/// adapters simply contribute non-grants until the server comes back.
pub struct Instance {
    source: ConnectionSource,
    shas: Mutex<Option<ScriptShas>>,
}

impl Instance {
    /// Connect to a single Redis server by URL, with the given per-operation
    /// network timeout.
    pub fn connect<T: IntoConnectionInfo>(url: T, timeout: Duration) -> RedlockResult<Instance> {
        let client = Client::open(url)?;
        let instance = Instance {
            source: ConnectionSource::Client { client, timeout },
            shas: Mutex::new(None),
        };
        instance.try_preload_scripts();
        Ok(instance)
    }

    /// Wrap an already-open bare connection. Every operation serializes
    /// through a mutex acting as a trivial pool of one.
    pub fn from_connection(conn: Connection) -> RedlockResult<Instance> {
        let instance = Instance {
            source: ConnectionSource::Bare(Mutex::new(conn)),
            shas: Mutex::new(None),
        };
        instance.try_preload_scripts();
        Ok(instance)
    }

    /// Back this adapter with a caller-supplied connection pool.
    pub fn from_pool(pool: Arc<dyn ConnectionPool>) -> RedlockResult<Instance> {
        let instance = Instance {
            source: ConnectionSource::Pool(pool),
            shas: Mutex::new(None),
        };
        instance.try_preload_scripts();
        Ok(instance)
    }

    /// Best-effort script upload at construction time. A failure here (the
    /// server being unreachable) is not fatal: the same upload is retried
    /// lazily on first real use.
    fn try_preload_scripts(&self) {
        if let Err(err) = self.ensure_scripts_loaded() {
            tracing::debug!(error = %err, "initial script upload failed, will retry lazily");
        }
    }

    fn checkout(&self) -> RedlockResult<ConnectionGuard<'_>> {
        match &self.source {
            ConnectionSource::Client { client, timeout } => {
                Ok(ConnectionGuard::Owned(client.get_connection_with_timeout(*timeout)?))
            }
            ConnectionSource::Bare(mutex) => Ok(ConnectionGuard::Guarded(mutex.lock().unwrap())),
            ConnectionSource::Pool(pool) => Ok(ConnectionGuard::Owned(pool.checkout()?)),
        }
    }

    /// Return the cached script digests, loading them now if this is the
    /// first successful contact with the server.
    fn ensure_scripts_loaded(&self) -> RedlockResult<ScriptShas> {
        if let Some(shas) = self.shas.lock().unwrap().clone() {
            return Ok(shas);
        }
        self.reload_scripts()
    }

    fn reload_scripts(&self) -> RedlockResult<ScriptShas> {
        let mut conn = self.checkout()?;
        let shas = load_scripts(&mut conn)?;
        *self.shas.lock().unwrap() = Some(shas.clone());
        Ok(shas)
    }

    /// `EVALSHA` with one-shot `NOSCRIPT` recovery: reload all three scripts
    /// and retry exactly once before propagating.
    fn evalsha_with_recovery(
        &self,
        sha_of: impl Fn(&ScriptShas) -> String,
        keys: &[&str],
        args: &[String],
    ) -> RedlockResult<Value> {
        let shas = self.ensure_scripts_loaded()?;
        let mut conn = self.checkout()?;
        match run_evalsha(&mut conn, &sha_of(&shas), keys, args) {
            Ok(value) => Ok(value),
            Err(err) if err.kind() == ErrorKind::NoScriptError => {
                drop(conn);
                tracing::debug!("NOSCRIPT on instance, reloading scripts");
                let shas = self.reload_scripts()?;
                let mut conn = self.checkout()?;
                run_evalsha(&mut conn, &sha_of(&shas), keys, args).map_err(RedlockError::from)
            }
            Err(err) => Err(RedlockError::from(err)),
        }
    }

    /// Attempt to acquire (or extend) the lock on `resource` for `ttl_ms`.
    /// `allow_new` is `"yes"` for a fresh acquisition, `"no"` for a
    /// conditional extend. Any network/connection failure is treated as a
    /// non-grant, never propagated.
    pub fn try_acquire(&self, resource: &str, token: &str, ttl_ms: i64, allow_new: &str) -> bool {
        let args = vec![token.to_string(), ttl_ms.to_string(), allow_new.to_string()];
        match self.evalsha_with_recovery(|s| s.lock.clone(), &[resource], &args) {
            Ok(value) => is_truthy(&value),
            Err(err) => {
                tracing::debug!(error = %err, resource, "try_acquire failed, counting as non-grant");
                false
            }
        }
    }

    /// Best-effort release: errors are swallowed, there is nothing useful a
    /// caller could do with them on this path.
    pub fn release(&self, resource: &str, token: &str) {
        let args = vec![token.to_string()];
        if let Err(err) = self.evalsha_with_recovery(|s| s.unlock.clone(), &[resource], &args) {
            tracing::debug!(error = %err, resource, "release failed, ignoring (best effort)");
        }
    }

    /// Read the `(value, pttl_ms)` pair for `resource`, atomically. Returns
    /// `None` if the key is absent or the server is unreachable.
    pub fn read_ttl(&self, resource: &str) -> Option<(String, i64)> {
        match self.evalsha_with_recovery(|s| s.pttl.clone(), &[resource], &[]) {
            Ok(Value::Array(items)) if items.len() == 2 => {
                let value = match &items[0] {
                    Value::BulkString(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                    _ => None,
                }?;
                let pttl = match &items[1] {
                    Value::Int(n) => *n,
                    _ => return None,
                };
                Some((value, pttl))
            }
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(error = %err, resource, "read_ttl failed, dropping response");
                None
            }
        }
    }
}

fn load_scripts(conn: &mut Connection) -> RedlockResult<ScriptShas> {
    let lock: String = redis::cmd("SCRIPT").arg("LOAD").arg(LOCK_SCRIPT).query(conn)?;
    let unlock: String = redis::cmd("SCRIPT").arg("LOAD").arg(UNLOCK_SCRIPT).query(conn)?;
    let pttl: String = redis::cmd("SCRIPT").arg("LOAD").arg(PTTL_SCRIPT).query(conn)?;
    Ok(ScriptShas { lock, unlock, pttl })
}

fn run_evalsha(
    conn: &mut Connection,
    sha: &str,
    keys: &[&str],
    args: &[String],
) -> RedisResult<Value> {
    let mut cmd = redis::cmd("EVALSHA");
    cmd.arg(sha).arg(keys.len());
    for key in keys {
        cmd.arg(*key);
    }
    for arg in args {
        cmd.arg(arg);
    }
    cmd.query(conn)
}

/// Lua's `false`/`nil` both encode as a RESP nil reply; everything else
/// (including the `SET` command's `OK` status reply) is truthy.
fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_classifies_nil_as_falsy() {
        assert!(!is_truthy(&Value::Nil));
    }

    #[test]
    fn truthy_classifies_set_ok_reply_as_truthy() {
        assert!(is_truthy(&Value::Okay));
    }
}
