//! Snapshot result types.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tracing::warn;

/// Outcome of waiting for one snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot<T> {
    /// A running service answered within the budget.
    Received(T),
    /// Nothing usable arrived; this is the caller's default.
    Defaulted(T),
}

impl<T> Snapshot<T> {
    pub fn is_received(&self) -> bool {
        matches!(self, Snapshot::Received(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Snapshot::Received(v) | Snapshot::Defaulted(v) => v,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Snapshot::Received(v) | Snapshot::Defaulted(v) => v,
        }
    }

    /// Transform the value, keeping whether it was received.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Snapshot<U> {
        match self {
            Snapshot::Received(v) => Snapshot::Received(f(v)),
            Snapshot::Defaulted(v) => Snapshot::Defaulted(f(v)),
        }
    }
}

/// Typed handle to one expected topic of a waiter.
pub struct SnapshotKey<T> {
    pub(crate) index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SnapshotKey<T> {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for SnapshotKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SnapshotKey<T> {}

impl<T> fmt::Debug for SnapshotKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotKey({})", self.index)
    }
}

/// Everything a waiter collected, indexed by [`SnapshotKey`].
#[derive(Debug)]
pub struct SnapshotSet {
    topics: Vec<String>,
    values: Vec<Option<Value>>,
}

impl SnapshotSet {
    pub(crate) fn new(topics: Vec<String>, values: Vec<Option<Value>>) -> Self {
        Self { topics, values }
    }

    /// Number of topics that produced a usable snapshot.
    pub fn received(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Whether every expected topic produced a snapshot.
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Take the value for `key`, or `default` if none arrived.
    ///
    /// A value can be taken once; later calls return the default.
    pub fn take<T: DeserializeOwned>(&mut self, key: SnapshotKey<T>, default: T) -> Snapshot<T> {
        let Some(value) = self.values.get_mut(key.index).and_then(Option::take) else {
            return Snapshot::Defaulted(default);
        };
        match serde_json::from_value(value) {
            Ok(parsed) => Snapshot::Received(parsed),
            Err(e) => {
                // Already validated by the waiter, so only reachable when
                // the same key type is reused against another topic.
                warn!("Snapshot for {} no longer decodes: {}", self.topics[key.index], e);
                Snapshot::Defaulted(default)
            }
        }
    }

    pub fn take_or_default<T: DeserializeOwned + Default>(
        &mut self,
        key: SnapshotKey<T>,
    ) -> Snapshot<T> {
        self.take(key, T::default())
    }
}
