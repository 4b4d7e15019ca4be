//! Fee oracle
//!
//! The oracle answers "what fee strategy applies to this (level, token) right
//! now". The network-backed implementation lives outside this crate; here are
//! the trait, a static oracle fed by configuration, and a TTL cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::amount::TokenId;
use crate::fees::{minimum_fee, FeeLevel, FeeStrategy, FixedFeeStrategy};
use veil_params::EngineConfig;

/// Fee oracle fetch failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Oracle could not be reached
    #[error("fee oracle unreachable: {0}")]
    Unreachable(String),
    /// Oracle answered with something unusable
    #[error("invalid fee oracle response: {0}")]
    InvalidResponse(String),
    /// Oracle did not answer in time
    #[error("fee oracle timed out")]
    Timeout,
}

/// Source of current fee strategies
#[async_trait]
pub trait FeeOracle: Send + Sync {
    /// Strategy for a fee level and token
    async fn fee_strategy(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError>;
}

#[async_trait]
impl<T: FeeOracle + ?Sized> FeeOracle for Arc<T> {
    async fn fee_strategy(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        (**self).fee_strategy(level, token_id).await
    }
}

/// Oracle serving fixed minimum fees scaled by level
#[derive(Debug, Clone, Default)]
pub struct StaticFeeOracle {
    minimum_fees: BTreeMap<TokenId, u64>,
}

impl StaticFeeOracle {
    /// Oracle using built-in minimum fees
    pub fn new() -> Self {
        Self::default()
    }

    /// Oracle using the configured minimum fees, falling back to built-ins
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            minimum_fees: config
                .minimum_fees
                .iter()
                .map(|f| (f.token_id, f.minimum_fee))
                .collect(),
        }
    }

    /// Override one token's minimum fee
    pub fn with_minimum_fee(mut self, token_id: TokenId, fee: u64) -> Self {
        self.minimum_fees.insert(token_id, fee);
        self
    }

    /// Minimum fee served for a token
    pub fn minimum_fee(&self, token_id: TokenId) -> u64 {
        self.minimum_fees
            .get(&token_id)
            .copied()
            .unwrap_or_else(|| minimum_fee(token_id))
    }
}

#[async_trait]
impl FeeOracle for StaticFeeOracle {
    async fn fee_strategy(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        let fee = level.apply(self.minimum_fee(token_id));
        Ok(Arc::new(FixedFeeStrategy::new(fee)))
    }
}

type CacheEntry = (Instant, Arc<dyn FeeStrategy>);

/// TTL cache in front of another oracle
///
/// A cached strategy is served until `ttl` has elapsed since it was fetched.
/// Failures are not cached.
pub struct CachingFeeOracle<O> {
    inner: O,
    ttl: Duration,
    cache: Mutex<HashMap<(FeeLevel, TokenId), CacheEntry>>,
}

impl<O: FeeOracle> CachingFeeOracle<O> {
    /// Wrap `inner`
    pub fn new(inner: O, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Wrap `inner` with the configured TTL
    pub fn from_config(inner: O, config: &EngineConfig) -> Self {
        Self::new(inner, Duration::from_secs(config.fee_cache_ttl_secs))
    }

    /// Drop every cached strategy
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    /// Wrapped oracle
    pub fn inner(&self) -> &O {
        &self.inner
    }

    fn cached(&self, key: (FeeLevel, TokenId)) -> Option<Arc<dyn FeeStrategy>> {
        let cache = self.cache.lock();
        cache
            .get(&key)
            .filter(|(fetched_at, _)| fetched_at.elapsed() < self.ttl)
            .map(|(_, strategy)| Arc::clone(strategy))
    }
}

#[async_trait]
impl<O: FeeOracle> FeeOracle for CachingFeeOracle<O> {
    async fn fee_strategy(
        &self,
        level: FeeLevel,
        token_id: TokenId,
    ) -> Result<Arc<dyn FeeStrategy>, ConnectionError> {
        let key = (level, token_id);
        if let Some(strategy) = self.cached(key) {
            tracing::debug!("Fee cache hit for {} {}", level, token_id);
            return Ok(strategy);
        }

        let strategy = self.inner.fee_strategy(level, token_id).await?;
        self.cache
            .lock()
            .insert(key, (Instant::now(), Arc::clone(&strategy)));
        Ok(strategy)
    }
}

impl<O> std::fmt::Debug for CachingFeeOracle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFeeOracle")
            .field("ttl", &self.ttl)
            .field("entries", &self.cache.lock().len())
            .finish()
    }
}
