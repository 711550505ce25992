//! Redis cache for the default (unfiltered) product listing.
//!
//! The cache is an optimisation only: every failure is logged and the caller
//! falls back to the database.
//!
//! Listings are stored under a key that embeds a generation number, and
//! invalidation bumps the generation. A reader that loaded the catalog
//! before an invalidation stores its listing under the old generation, where
//! no later lookup finds it.

use r2d2_redis::{r2d2, redis, RedisConnectionManager};
use thiserror::Error;

pub type RedisPool = r2d2::Pool<RedisConnectionManager>;

pub const CATALOG_KEY: &str = "thinkpad_store:catalog:products";
pub const GENERATION_KEY: &str = "thinkpad_store:catalog:generation";

/// Key of the listing cached for `generation`.
pub fn listing_key(generation: u64) -> String {
    format!("{}:{}", CATALOG_KEY, generation)
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

#[derive(Clone)]
pub struct CatalogCache {
    pool: Option<RedisPool>,
    ttl_secs: usize,
}

impl CatalogCache {
    pub fn disabled() -> Self {
        CatalogCache {
            pool: None,
            ttl_secs: 0,
        }
    }

    pub fn connect(redis_url: &str, ttl_secs: usize) -> Result<Self, CacheError> {
        let manager = RedisConnectionManager::new(redis_url)?;
        let pool = r2d2::Pool::builder().build(manager)?;
        Ok(CatalogCache {
            pool: Some(pool),
            ttl_secs,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some() && self.ttl_secs > 0
    }

    fn try_generation(&self, pool: &RedisPool) -> Result<u64, CacheError> {
        let mut conn = pool.get()?;
        let generation: Option<u64> = redis::cmd("GET").arg(GENERATION_KEY).query(&mut *conn)?;
        Ok(generation.unwrap_or(0))
    }

    fn try_get(&self, pool: &RedisPool, generation: u64) -> Result<Option<String>, CacheError> {
        let mut conn = pool.get()?;
        Ok(redis::cmd("GET").arg(listing_key(generation)).query(&mut *conn)?)
    }

    fn try_store(&self, pool: &RedisPool, generation: u64, json: &str) -> Result<(), CacheError> {
        let mut conn = pool.get()?;
        redis::cmd("SET")
            .arg(listing_key(generation))
            .arg(json)
            .arg("EX")
            .arg(self.ttl_secs)
            .query::<()>(&mut *conn)?;
        Ok(())
    }

    fn try_invalidate(&self, pool: &RedisPool) -> Result<(), CacheError> {
        let mut conn = pool.get()?;
        let current: u64 = redis::cmd("INCR").arg(GENERATION_KEY).query(&mut *conn)?;
        redis::cmd("DEL").arg(listing_key(current - 1)).query::<i64>(&mut *conn)?;
        Ok(())
    }

    /// Current generation. Read it before loading the catalog and hand it
    /// back to [`CatalogCache::catalog`] and [`CatalogCache::store_catalog`].
    /// `None` when caching is off or Redis is unreachable.
    pub fn generation(&self) -> Option<u64> {
        let pool = self.pool.as_ref().filter(|_| self.is_enabled())?;
        match self.try_generation(pool) {
            Ok(generation) => Some(generation),
            Err(err) => {
                tracing::warn!(error = %err, "catalog cache generation read failed");
                None
            }
        }
    }

    /// Serialized listing, if cached.
    pub fn catalog(&self, generation: u64) -> Option<String> {
        let pool = self.pool.as_ref().filter(|_| self.is_enabled())?;
        match self.try_get(pool, generation) {
            Ok(hit) => hit,
            Err(err) => {
                tracing::warn!(error = %err, "catalog cache read failed");
                None
            }
        }
    }

    pub fn store_catalog(&self, generation: u64, json: &str) {
        let Some(pool) = self.pool.as_ref().filter(|_| self.is_enabled()) else {
            return;
        };
        if let Err(err) = self.try_store(pool, generation, json) {
            tracing::warn!(error = %err, "catalog cache write failed");
        }
    }

    /// Called after every product mutation.
    pub fn invalidate(&self) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        if let Err(err) = self.try_invalidate(pool) {
            tracing::warn!(error = %err, "catalog cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_cache_is_a_no_op() {
        let cache = CatalogCache::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.generation(), None);
        cache.store_catalog(0, "[]");
        cache.invalidate();
        assert_eq!(cache.catalog(0), None);
    }

    #[test]
    fn each_generation_has_its_own_listing_key() {
        assert_eq!(listing_key(0), "thinkpad_store:catalog:products:0");
        assert_ne!(listing_key(4), listing_key(5));
        assert_ne!(listing_key(7), GENERATION_KEY);
    }
}
