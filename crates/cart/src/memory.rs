//! In-memory adapters for the engine's ports.
//!
//! `MemoryCartStore` behaves like the storefront's cart API and records every
//! call, with switches to inject failures and latency. `MemoryStorage` holds
//! raw JSON the way browser local storage holds a string, so malformed
//! content can be planted directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tastetrove_core::{CartLine, LineUpdate, ProductId, UserId};

use crate::ports::{LocalCartStorage, RemoteCartStore, RemoteError, decode_lines, encode_lines};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded call to [`MemoryCartStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Fetch(UserId),
    Write(UserId, Vec<LineUpdate>),
}

/// In-memory remote cart store.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    carts: Mutex<HashMap<UserId, BTreeMap<ProductId, u32>>>,
    calls: Mutex<Vec<RemoteCall>>,
    fail_fetch: AtomicBool,
    fail_write: AtomicBool,
    reject_writes: Mutex<Option<u16>>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a user's stored cart.
    pub fn seed(&self, user: UserId, lines: impl IntoIterator<Item = CartLine>) {
        let cart = lines
            .into_iter()
            .filter(|line| line.quantity > 0)
            .map(|line| (line.product_id, line.quantity))
            .collect();
        lock(&self.carts).insert(user, cart);
    }

    /// A user's stored cart, in product order.
    #[must_use]
    pub fn cart(&self, user: UserId) -> Vec<CartLine> {
        lock(&self.carts)
            .get(&user)
            .map(|cart| {
                cart.iter()
                    .map(|(id, q)| CartLine::new(id.clone(), *q))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every call made so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.calls).clone()
    }

    /// Only the write batches, in call order.
    #[must_use]
    pub fn writes(&self) -> Vec<Vec<LineUpdate>> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Write(_, updates) => Some(updates.clone()),
                RemoteCall::Fetch(_) => None,
            })
            .collect()
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_write(&self, fail: bool) {
        self.fail_write.store(fail, Ordering::SeqCst);
    }

    /// Answer every write with this HTTP status, as a storefront refusing
    /// the batch would.
    pub fn set_reject_writes(&self, status: Option<u16>) {
        *lock(&self.reject_writes) = status;
    }

    /// Delay every call by `latency` (tokio time, so paused clocks apply).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    async fn simulate_latency(&self) {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl RemoteCartStore for MemoryCartStore {
    async fn fetch(&self, user: UserId) -> Result<Vec<CartLine>, RemoteError> {
        lock(&self.calls).push(RemoteCall::Fetch(user));
        // The answer reflects the cart when the request arrived.
        let cart = self.cart(user);
        self.simulate_latency().await;

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("fetch disabled".to_string()));
        }
        Ok(cart)
    }

    async fn write(&self, user: UserId, updates: Vec<LineUpdate>) -> Result<(), RemoteError> {
        lock(&self.calls).push(RemoteCall::Write(user, updates.clone()));
        self.simulate_latency().await;

        if self.fail_write.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("write disabled".to_string()));
        }
        let rejected = *lock(&self.reject_writes);
        if let Some(status) = rejected {
            return Err(RemoteError::Status {
                status,
                message: "rejected".to_string(),
            });
        }

        let mut carts = lock(&self.carts);
        let cart = carts.entry(user).or_default();
        for update in updates {
            if update.is_delete() {
                cart.remove(&update.product_id);
            } else {
                cart.insert(update.product_id, update.quantity);
            }
        }
        Ok(())
    }
}

/// In-memory local storage holding the raw serialized cart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    raw: Mutex<Option<String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with arbitrary content (valid or not).
    #[must_use]
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }

    /// The stored string, if any.
    #[must_use]
    pub fn raw(&self) -> Option<String> {
        lock(&self.raw).clone()
    }
}

impl LocalCartStorage for MemoryStorage {
    fn read(&self) -> Option<Vec<CartLine>> {
        lock(&self.raw).as_deref().and_then(decode_lines)
    }

    fn write(&self, lines: &[CartLine]) {
        if let Some(raw) = encode_lines(lines) {
            *lock(&self.raw) = Some(raw);
        }
    }

    fn clear(&self) {
        *lock(&self.raw) = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_applies_absolute_updates() {
        let store = MemoryCartStore::new();
        let user = UserId::new(1);
        store.seed(user, [CartLine::new(pid("a"), 2), CartLine::new(pid("b"), 1)]);

        store
            .write(
                user,
                vec![LineUpdate::new(pid("a"), 5), LineUpdate::new(pid("b"), 0)],
            )
            .await
            .unwrap();

        assert_eq!(store.cart(user), vec![CartLine::new(pid("a"), 5)]);
        assert_eq!(store.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryCartStore::new();
        store.set_fail_write(true);
        let result = store.write(UserId::new(1), vec![]).await;
        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn test_memory_storage_roundtrip_and_clear() {
        let storage = MemoryStorage::new();
        assert!(storage.read().is_none());

        let lines = vec![CartLine::new(pid("a"), 1)];
        storage.write(&lines);
        assert_eq!(storage.read(), Some(lines));

        storage.clear();
        assert!(storage.raw().is_none());
    }

    #[test]
    fn test_memory_storage_malformed() {
        let storage = MemoryStorage::with_raw("]]");
        assert!(storage.read().is_none());
    }
}
