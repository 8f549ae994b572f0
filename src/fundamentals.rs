//! Company fundamentals
//!
//! The fundamentals source is an external capability. Missing data means the
//! stock is skipped; no default values are ever substituted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use crate::config::QualityConfig;
use crate::Symbol;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Fraction, e.g. 0.18 for 18%
    pub return_on_equity: f64,
    pub debt_to_equity: f64,
    pub market_cap: f64,
    pub trailing_pe: f64,
    pub book_value: f64,
}

/// Source of fundamentals; `None` when the symbol has no data
pub trait FundamentalsProvider: Send + Sync {
    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals>;
}

/// In-memory fundamentals, typically loaded from a CSV snapshot
#[derive(Debug, Clone, Default)]
pub struct StaticFundamentals {
    entries: HashMap<Symbol, Fundamentals>,
}

impl StaticFundamentals {
    pub fn new(entries: HashMap<Symbol, Fundamentals>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, symbol: Symbol, fundamentals: Fundamentals) {
        self.entries.insert(symbol, fundamentals);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: FundamentalsProvider + ?Sized> FundamentalsProvider for Arc<P> {
    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals> {
        (**self).fundamentals(symbol)
    }
}

impl FundamentalsProvider for StaticFundamentals {
    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals> {
        self.entries.get(symbol).cloned()
    }
}

// =============================================================================
// Clock + TTL cache
// =============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

/// Cache lookup outcome
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup<V> {
    Fresh(V),
    Stale { value: V, age: Duration },
    Miss,
}

/// Key-value cache with a time-to-live, scoped to whoever owns it
pub struct TtlCache<K, V> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: HashMap<K, (V, DateTime<Utc>)>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> CacheLookup<V> {
        match self.entries.get(key) {
            None => CacheLookup::Miss,
            Some((value, stored_at)) => {
                let age = self.clock.now() - *stored_at;
                if age <= self.ttl {
                    CacheLookup::Fresh(value.clone())
                } else {
                    CacheLookup::Stale {
                        value: value.clone(),
                        age,
                    }
                }
            }
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        self.entries.insert(key, (value, now));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fundamentals provider memoized through a [`TtlCache`].
///
/// Expired entries are refetched; if the refetch comes back empty the stale
/// entry is served and logged with its age.
pub struct CachedFundamentals<P> {
    inner: P,
    cache: Mutex<TtlCache<Symbol, Fundamentals>>,
}

impl<P: FundamentalsProvider> CachedFundamentals<P> {
    pub fn new(inner: P, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            cache: Mutex::new(TtlCache::new(ttl, clock)),
        }
    }

    /// Forget every cached entry, fresh or stale
    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }
}

impl<P: FundamentalsProvider> FundamentalsProvider for CachedFundamentals<P> {
    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals> {
        let cached = match self.cache.lock() {
            Ok(cache) => cache.get(symbol),
            Err(_) => CacheLookup::Miss,
        };

        let stale = match cached {
            CacheLookup::Fresh(value) => return Some(value),
            CacheLookup::Stale { value, age } => Some((value, age)),
            CacheLookup::Miss => None,
        };

        match self.inner.fundamentals(symbol) {
            Some(fresh) => {
                if let Ok(mut cache) = self.cache.lock() {
                    cache.insert(symbol.clone(), fresh.clone());
                }
                Some(fresh)
            }
            None => stale.map(|(value, age)| {
                tracing::warn!(
                    symbol = %symbol,
                    age_secs = age.num_seconds(),
                    "Serving stale fundamentals"
                );
                value
            }),
        }
    }
}

// =============================================================================
// Quality filter
// =============================================================================

/// Fundamentals gate applied to the universe before strategies see it
#[derive(Debug, Clone, Default)]
pub struct QualityFilter {
    config: QualityConfig,
}

impl QualityFilter {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn passes(&self, fundamentals: &Fundamentals) -> bool {
        let c = &self.config;
        fundamentals.return_on_equity >= c.min_return_on_equity
            && fundamentals.debt_to_equity <= c.max_debt_to_equity
            && fundamentals.market_cap >= c.min_market_cap
            && fundamentals.trailing_pe > 0.0
            && fundamentals.trailing_pe <= c.max_trailing_pe
            && (!c.require_positive_book_value || fundamentals.book_value > 0.0)
    }

    /// Keep only symbols with fundamentals that pass every gate
    pub fn filter(&self, candidates: &[Symbol], provider: &dyn FundamentalsProvider) -> Vec<Symbol> {
        candidates
            .iter()
            .filter(|symbol| match provider.fundamentals(symbol) {
                Some(f) => self.passes(&f),
                None => {
                    tracing::debug!(symbol = %symbol, "No fundamentals, excluded by quality filter");
                    false
                }
            })
            .cloned()
            .collect()
    }
}
