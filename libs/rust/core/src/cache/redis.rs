//! Backend speaking to the external Redis cache service.
//!
//! One lazily (re)established connection guarded by a mutex. Any command error drops
//! the connection so the next call reconnects; the cache layer's circuit breaker keeps
//! an outage from turning into a connect attempt per request.

use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

use super::{CacheBackend, CacheError};
use crate::config::CacheSettings;

pub struct RedisBackend {
    client: redis::Client,
    conn: Mutex<Option<redis::Connection>>,
    connect_timeout: Duration,
    io_timeout: Duration,
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self { CacheError::Unavailable(e.to_string()) }
}

impl RedisBackend {
    /// Validates the URL only; no connection is made until the first command.
    pub fn new(settings: &CacheSettings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.url().as_str())?;
        Ok(Self { client, conn: Mutex::new(None), connect_timeout: settings.connect_timeout(), io_timeout: settings.io_timeout() })
    }

    fn connect(&self) -> Result<redis::Connection, CacheError> {
        let conn = self.client.get_connection_with_timeout(self.connect_timeout)?;
        conn.set_read_timeout(Some(self.io_timeout))?;
        conn.set_write_timeout(Some(self.io_timeout))?;
        debug!("redis connection established");
        Ok(conn)
    }

    fn with_conn<T>(&self, cmd: &redis::Cmd) -> Result<T, CacheError>
    where
        T: redis::FromRedisValue,
    {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(CacheError::Unavailable("no connection".into()));
        };
        match cmd.query::<T>(conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                *guard = None;
                Err(e.into())
            }
        }
    }
}

impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str { "redis" }

    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_conn(redis::cmd("GET").arg(key))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let secs = ttl.as_secs().max(1);
        self.with_conn(redis::cmd("SET").arg(key).arg(value).arg("EX").arg(secs))
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.with_conn::<i64>(redis::cmd("DEL").arg(key)).map(|_| ())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.with_conn(&redis::cmd("FLUSHDB"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_server_is_an_unavailable_error() {
        let settings = CacheSettings { host: "127.0.0.1".into(), port: 1, connect_timeout_ms: 50, ..Default::default() };
        let backend = RedisBackend::new(&settings).unwrap();
        assert!(matches!(backend.get("k"), Err(CacheError::Unavailable(_))));
        assert!(matches!(backend.set("k", "v", Duration::from_secs(1)), Err(CacheError::Unavailable(_))));
    }
}
