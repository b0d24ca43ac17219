//! Memoizing Wrappers
//!
//! Wrap an operation so repeated calls with the same key inside the TTL
//! window are served from a [`TtlCache`] instead of re-running it.
//!
//! Two wrappers are chosen at composition time:
//! - [`BlockingMemo`] runs a synchronous operation on the blocking thread pool
//! - [`AsyncMemo`] awaits an async operation inline
//!
//! Both expose the same `async fn call`. Failed invocations are returned to
//! the caller and never cached.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::TtlCache;

/// Query parameters of an inbound request.
pub type QueryParams = HashMap<String, String>;

// == Memo Policy ==
/// Expiry policy applied to memoized results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoPolicy {
    pub ttl: Duration,
    pub sliding: bool,
}

impl MemoPolicy {
    /// Fixed expiry.
    pub fn fixed(ttl: Duration) -> Self {
        Self { ttl, sliding: false }
    }

    /// Expiry reset on every hit.
    pub fn sliding(ttl: Duration) -> Self {
        Self { ttl, sliding: true }
    }
}

// == Key Derivation ==
/// Key from the operation identity and its ordered argument values.
pub fn args_key<A: Debug + ?Sized>(identity: &str, args: &A) -> String {
    format!("{}:{:?}", identity, args)
}

/// Key from a handler identity and the sorted query-parameter set.
///
/// Pairs are rendered with `Debug`, so names and values are quoted and
/// escaped: a value containing `&` or `=` cannot collide with extra pairs.
pub fn query_key<'a, I>(identity: &str, params: I) -> String
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut pairs: Vec<(&String, &String)> = params.into_iter().collect();
    pairs.sort();
    format!("{}:{:?}", identity, pairs)
}

// == Blocking Memo ==
type BlockingOp<A, V> = dyn Fn(A) -> anyhow::Result<V> + Send + Sync;

/// Memoizes a synchronous operation, running misses on the blocking pool.
pub struct BlockingMemo<A, V> {
    cache: TtlCache<V>,
    identity: String,
    policy: MemoPolicy,
    op: Arc<BlockingOp<A, V>>,
}

impl<A, V> BlockingMemo<A, V>
where
    A: Debug + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new<F>(cache: TtlCache<V>, identity: impl Into<String>, policy: MemoPolicy, op: F) -> Self
    where
        F: Fn(A) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        Self {
            cache,
            identity: identity.into(),
            policy,
            op: Arc::new(op),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the cached result for `args`, or runs the operation and caches it.
    pub async fn call(&self, args: A) -> anyhow::Result<V> {
        let key = args_key(&self.identity, &args);
        if let Some(hit) = self.cache.get(&key, self.policy.sliding) {
            debug!(key = %key, "Memo hit");
            return Ok(hit);
        }

        let op = Arc::clone(&self.op);
        let value = tokio::task::spawn_blocking(move || op(args)).await??;
        self.cache.set(key, value.clone(), self.policy.ttl);
        Ok(value)
    }
}

// == Async Memo ==
/// Memoizes an async operation, awaiting misses inline.
pub struct AsyncMemo<A, V, F> {
    cache: TtlCache<V>,
    identity: String,
    policy: MemoPolicy,
    op: F,
    _args: PhantomData<fn(A)>,
}

impl<A, V, F, Fut> AsyncMemo<A, V, F>
where
    V: Clone,
    F: Fn(A) -> Fut,
    Fut: Future<Output = anyhow::Result<V>>,
{
    pub fn new(cache: TtlCache<V>, identity: impl Into<String>, policy: MemoPolicy, op: F) -> Self {
        Self {
            cache,
            identity: identity.into(),
            policy,
            op,
            _args: PhantomData,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Returns the cached result for `args`, or awaits the operation and caches it.
    pub async fn call(&self, args: A) -> anyhow::Result<V>
    where
        A: Debug,
    {
        let key = args_key(&self.identity, &args);
        self.call_keyed(key, args).await
    }

    async fn call_keyed(&self, key: String, args: A) -> anyhow::Result<V> {
        if let Some(hit) = self.cache.get(&key, self.policy.sliding) {
            debug!(key = %key, "Memo hit");
            return Ok(hit);
        }

        let value = (self.op)(args).await?;
        self.cache.set(key, value.clone(), self.policy.ttl);
        Ok(value)
    }
}

impl<V, F, Fut> AsyncMemo<QueryParams, V, F>
where
    V: Clone,
    F: Fn(QueryParams) -> Fut,
    Fut: Future<Output = anyhow::Result<V>>,
{
    /// Request-handler form: keyed by the sorted query parameters, so the
    /// order parameters arrive in does not matter.
    pub async fn call_request(&self, params: QueryParams) -> anyhow::Result<V> {
        let key = query_key(&self.identity, &params);
        self.call_keyed(key, params).await
    }
}
