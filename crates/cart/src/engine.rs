//! Cart reconciliation engine.
//!
//! Presents one cart regardless of whether the shopper is anonymous or signed
//! in:
//!
//! - Anonymous: local storage is the source of truth.
//! - Signed in: the remote store is the source of truth. Edits are applied
//!   optimistically, cached locally, queued in [`PendingWrites`], and flushed
//!   as one batch once edits have been quiet for the debounce window.
//!
//! State lives behind a single mutex that is never held across an `.await`.
//! Network calls (fetch on start/sign-in, flush) are the only suspension
//! points. An identity generation counter lets completions of stale network
//! calls be recognised and ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tastetrove_core::{CartLine, ProductId, UserId};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CartTotals, CatalogLookup, get_totals};
use crate::config::{EngineConfig, SignInPolicy};
use crate::debounce::Debouncer;
use crate::event::{CartEvent, CartView};
use crate::ports::{LocalCartStorage, RemoteCartStore, RemoteError};
use crate::snapshot::{CartSnapshot, PendingWrites};

/// Capacity of the change notification channel.
const EVENT_CAPACITY: usize = 64;

/// Handle to a running cart engine. Cheap to clone.
///
/// Dropping the last handle cancels any armed flush; a flush already in flight
/// runs to completion.
pub struct CartEngine<R, L> {
    shared: Arc<Shared<R, L>>,
}

impl<R, L> Clone for CartEngine<R, L> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

struct Shared<R, L> {
    remote: R,
    local: L,
    config: EngineConfig,
    state: Mutex<EngineState>,
    debouncer: Debouncer,
    events: broadcast::Sender<CartEvent>,
}

struct EngineState {
    cart: CartSnapshot,
    totals: CartTotals,
    pending: PendingWrites,
    /// Edits made since the current sign-in fetch started; `None` outside one.
    sign_in_edits: Option<PendingWrites>,
    identity: Option<UserId>,
    generation: u64,
    catalog: Arc<dyn CatalogLookup>,
    shut_down: bool,
}

impl EngineState {
    /// State-side handler for a change; runs before the change is broadcast.
    fn handle(&mut self, event: &CartEvent) {
        match event {
            CartEvent::CartChanged | CartEvent::CatalogChanged => {
                self.totals = get_totals(&self.cart, self.catalog.as_ref());
            }
            CartEvent::PendingChanged
            | CartEvent::IdentityChanged(_)
            | CartEvent::Flushed { .. }
            | CartEvent::FlushFailed => {}
        }
    }
}

impl<R, L> Shared<R, L> {
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply state handlers for `events`, release the lock, then broadcast.
    fn commit(&self, mut state: MutexGuard<'_, EngineState>, events: Vec<CartEvent>) {
        for event in &events {
            state.handle(event);
        }
        drop(state);
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

impl<R: RemoteCartStore, L: LocalCartStorage> Shared<R, L> {
    /// Send every pending write queued under `generation` as one batch.
    ///
    /// On success only the entries that still hold the sent value are
    /// cleared. A rejected batch (see [`RemoteError::is_rejection`]) is
    /// cleared the same way so it is not re-sent forever; any other failure
    /// leaves the queue untouched for the next flush.
    async fn flush(&self, generation: u64) -> Result<usize, RemoteError> {
        let (user, batch) = {
            let state = self.lock();
            if state.shut_down || state.generation != generation {
                debug!("Skipping flush for a superseded identity");
                return Ok(0);
            }
            let Some(user) = state.identity else {
                return Ok(0);
            };
            if state.pending.is_empty() {
                return Ok(0);
            }
            (user, state.pending.to_updates())
        };

        debug!(%user, updates = batch.len(), "Flushing pending cart writes");
        let result = self.remote.write(user, batch.clone()).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!(%user, "Identity changed during flush, ignoring completion");
            return result.map(|()| 0);
        }

        match result {
            Ok(()) => {
                let cleared = state.pending.acknowledge(&batch);
                info!(
                    %user,
                    sent = batch.len(),
                    cleared,
                    remaining = state.pending.len(),
                    "Flushed cart writes"
                );
                self.commit(
                    state,
                    vec![
                        CartEvent::Flushed { sent: batch.len() },
                        CartEvent::PendingChanged,
                    ],
                );
                Ok(batch.len())
            }
            Err(e) if e.is_rejection() => {
                let dropped = state.pending.acknowledge(&batch);
                warn!(
                    %user,
                    error = %e,
                    dropped,
                    remaining = state.pending.len(),
                    "Remote cart rejected writes, dropping them"
                );
                self.commit(
                    state,
                    vec![CartEvent::FlushFailed, CartEvent::PendingChanged],
                );
                Err(e)
            }
            Err(e) => {
                warn!(
                    %user,
                    error = %e,
                    pending = state.pending.len(),
                    "Remote cart write failed, keeping pending writes"
                );
                self.commit(state, vec![CartEvent::FlushFailed]);
                Err(e)
            }
        }
    }
}

/// Fetch a user's remote cart, logging and returning `None` on failure.
async fn fetch_remote<R: RemoteCartStore>(remote: &R, user: UserId) -> Option<CartSnapshot> {
    match remote.fetch(user).await {
        Ok(lines) => Some(CartSnapshot::from_lines(lines)),
        Err(e) => {
            warn!(%user, error = %e, "Failed to fetch remote cart");
            None
        }
    }
}

impl<R: RemoteCartStore, L: LocalCartStorage> CartEngine<R, L> {
    /// Start an engine, loading the initial cart.
    ///
    /// With an identity the remote cart is fetched (and cached locally);
    /// a failed fetch starts with an empty cart. Without one the local cart
    /// is read, and missing or malformed content starts empty.
    #[instrument(skip(remote, local, catalog, config))]
    pub async fn start(
        remote: R,
        local: L,
        catalog: impl CatalogLookup + 'static,
        identity: Option<UserId>,
        config: EngineConfig,
    ) -> Self {
        let cart = match identity {
            Some(user) => match fetch_remote(&remote, user).await {
                Some(cart) => {
                    local.write(&cart.lines());
                    cart
                }
                None => CartSnapshot::new(),
            },
            None => CartSnapshot::from_lines(local.read().unwrap_or_default()),
        };

        let catalog: Arc<dyn CatalogLookup> = Arc::new(catalog);
        let totals = get_totals(&cart, catalog.as_ref());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(lines = cart.len(), signed_in = identity.is_some(), "Cart engine started");

        Self {
            shared: Arc::new(Shared {
                remote,
                local,
                config,
                state: Mutex::new(EngineState {
                    cart,
                    totals,
                    pending: PendingWrites::default(),
                    sign_in_edits: None,
                    identity,
                    generation: 0,
                    catalog,
                    shut_down: false,
                }),
                debouncer: Debouncer::new(),
                events,
            }),
        }
    }

    /// Set the absolute quantity of a product; `0` removes it.
    ///
    /// The cart and totals reflect the edit when this returns. Signed-in edits
    /// are queued and flushed after the debounce window; remote failures are
    /// logged, never returned. Must be called from within a tokio runtime.
    pub fn edit_cart(&self, product_id: ProductId, quantity: u32) {
        self.edit_with(product_id, |_| quantity);
    }

    /// Add one unit of a product.
    pub fn increment(&self, product_id: ProductId) {
        self.edit_with(product_id, |current| current.saturating_add(1));
    }

    /// Remove one unit of a product, dropping the line at zero.
    pub fn decrement(&self, product_id: ProductId) {
        self.edit_with(product_id, |current| current.saturating_sub(1));
    }

    /// Remove a product's line entirely.
    pub fn remove(&self, product_id: ProductId) {
        self.edit_with(product_id, |_| 0);
    }

    fn edit_with(&self, product_id: ProductId, quantity: impl FnOnce(u32) -> u32) {
        let mut state = self.shared.lock();
        if state.shut_down {
            debug!(%product_id, "Ignoring edit after shutdown");
            return;
        }

        let quantity = quantity(state.cart.quantity(&product_id));
        let mut working = state.cart.clone();
        let changed = working.set(product_id.clone(), quantity);

        self.shared.local.write(&working.lines());
        state.cart = working;

        let mut events = Vec::with_capacity(2);
        if changed {
            events.push(CartEvent::CartChanged);
        }

        if let Some(edits) = state.sign_in_edits.as_mut() {
            edits.record(product_id.clone(), quantity);
        }

        let arm = state.identity.is_some();
        if arm {
            state.pending.record(product_id, quantity);
            events.push(CartEvent::PendingChanged);
        }

        let generation = state.generation;
        self.shared.commit(state, events);
        if arm {
            self.arm_flush(generation);
        }
    }

    /// (Re)arm the debounced flush for the given identity generation.
    fn arm_flush(&self, generation: u64) {
        let shared: Weak<Shared<R, L>> = Arc::downgrade(&self.shared);
        self.shared
            .debouncer
            .schedule(self.shared.config.debounce, async move {
                if let Some(shared) = shared.upgrade() {
                    // Failures are logged in `flush` and stay queued.
                    let _ = shared.flush(generation).await;
                }
            });
    }

    /// Flush pending writes immediately, disarming the debounce timer.
    ///
    /// Returns the number of updates sent (`0` when nothing was pending).
    ///
    /// # Errors
    ///
    /// Returns the remote store's error; the writes stay queued.
    pub async fn flush_now(&self) -> Result<usize, RemoteError> {
        self.shared.debouncer.cancel();
        let generation = self.shared.lock().generation;
        self.shared.flush(generation).await
    }

    /// React to a change of the signed-in user.
    ///
    /// Any armed flush is cancelled and unflushed writes are abandoned.
    /// Signing out clears local storage and empties the cart. Signing in
    /// fetches the remote cart, which replaces the anonymous cart unless the
    /// engine is configured with [`SignInPolicy::Merge`].
    #[instrument(skip(self))]
    pub async fn set_identity(&self, identity: Option<UserId>) {
        let (generation, anonymous) = {
            let mut state = self.shared.lock();
            if state.shut_down || state.identity == identity {
                return;
            }

            self.shared.debouncer.cancel();
            if !state.pending.is_empty() {
                warn!(
                    abandoned = state.pending.len(),
                    "Abandoning unflushed cart writes on identity change"
                );
            }
            state.pending.clear();
            state.sign_in_edits = identity.map(|_| PendingWrites::default());
            state.generation += 1;
            let previous = std::mem::replace(&mut state.identity, identity);
            let anonymous = previous.is_none().then(|| state.cart.clone());
            let generation = state.generation;

            let mut events = vec![
                CartEvent::IdentityChanged(identity),
                CartEvent::PendingChanged,
            ];
            if identity.is_none() {
                self.shared.local.clear();
                state.cart = CartSnapshot::new();
                events.push(CartEvent::CartChanged);
                info!("Signed out, cart cleared");
            }
            self.shared.commit(state, events);
            (generation, anonymous)
        };

        let Some(user) = identity else {
            return;
        };

        let mut cart = fetch_remote(&self.shared.remote, user)
            .await
            .unwrap_or_default();

        let mut state = self.shared.lock();
        if state.generation != generation {
            debug!(%user, "Identity changed during cart fetch, discarding result");
            return;
        }
        let edits = state.sign_in_edits.take().unwrap_or_default();

        if self.shared.config.sign_in == SignInPolicy::Merge
            && let Some(anonymous) = anonymous.filter(|cart| !cart.is_empty())
        {
            let mut merged = 0usize;
            for (product_id, quantity) in anonymous.iter() {
                if edits.get(product_id).is_none() {
                    cart.set(product_id.clone(), quantity);
                    state.pending.record(product_id.clone(), quantity);
                    merged += 1;
                }
            }
            info!(%user, merged, "Merged anonymous cart into remote cart");
        }

        // Edits made after sign-in started win over the fetched state, even
        // if they were flushed before the fetch answered.
        for (product_id, quantity) in edits.iter() {
            cart.set(product_id.clone(), quantity);
        }

        self.shared.local.write(&cart.lines());
        state.cart = cart;

        let arm = !state.pending.is_empty();
        let mut events = vec![CartEvent::CartChanged];
        if arm {
            events.push(CartEvent::PendingChanged);
        }
        info!(%user, lines = state.cart.len(), "Loaded remote cart");
        self.shared.commit(state, events);

        if arm {
            self.arm_flush(generation);
        }
    }

    /// Track an identity provider, applying every change via [`set_identity`].
    ///
    /// The returned task ends when the sender is dropped or the engine is gone.
    ///
    /// [`set_identity`]: Self::set_identity
    pub fn follow_identity(&self, mut identity: watch::Receiver<Option<UserId>>) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            loop {
                let current = *identity.borrow_and_update();
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                Self { shared }.set_identity(current).await;

                if identity.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Replace the catalog and recompute totals.
    pub fn set_catalog(&self, catalog: impl CatalogLookup + 'static) {
        let mut state = self.shared.lock();
        state.catalog = Arc::new(catalog);
        self.shared.commit(state, vec![CartEvent::CatalogChanged]);
    }

    /// Stop the engine: cancel any armed flush and ignore further edits.
    ///
    /// Completions of flushes already in flight are ignored.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.generation += 1;
        let cancelled = self.shared.debouncer.cancel();
        info!(
            cancelled_flush = cancelled,
            unflushed = state.pending.len(),
            "Cart engine shut down"
        );
    }
}

impl<R, L> CartEngine<R, L> {
    /// Subscribe to change notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartEvent> {
        self.shared.events.subscribe()
    }

    /// Current lines, totals, identity and pending count.
    #[must_use]
    pub fn view(&self) -> CartView {
        let state = self.shared.lock();
        CartView {
            lines: state.cart.lines(),
            totals: state.totals,
            identity: state.identity,
            pending: state.pending.len(),
        }
    }

    /// A copy of the current cart.
    #[must_use]
    pub fn cart(&self) -> CartSnapshot {
        self.shared.lock().cart.clone()
    }

    /// The current lines.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.shared.lock().cart.lines()
    }

    /// The current totals.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.shared.lock().totals
    }

    /// A copy of the unflushed writes.
    #[must_use]
    pub fn pending_writes(&self) -> PendingWrites {
        self.shared.lock().pending.clone()
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn identity(&self) -> Option<UserId> {
        self.shared.lock().identity
    }

    /// Whether a debounced flush is armed and waiting.
    #[must_use]
    pub fn flush_armed(&self) -> bool {
        self.shared.debouncer.is_armed()
    }

    /// The remote store adapter.
    #[must_use]
    pub fn remote(&self) -> &R {
        &self.shared.remote
    }

    /// The local storage adapter.
    #[must_use]
    pub fn local(&self) -> &L {
        &self.shared.local
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tastetrove_core::{Price, Product};

    use super::*;
    use crate::catalog::Catalog;
    use crate::memory::{MemoryCartStore, MemoryStorage};

    fn pid(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    fn catalog() -> Catalog {
        Catalog::new([Product {
            id: pid("tahini"),
            name: "Tahini".to_string(),
            description: None,
            price: Price::from_cents(650),
            image_url: None,
        }])
    }

    async fn anonymous_engine() -> CartEngine<MemoryCartStore, MemoryStorage> {
        CartEngine::start(
            MemoryCartStore::new(),
            MemoryStorage::new(),
            catalog(),
            None,
            EngineConfig::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_anonymous_edit_does_not_queue_writes() {
        let engine = anonymous_engine().await;
        engine.edit_cart(pid("tahini"), 2);

        assert_eq!(engine.totals().quantity, 2);
        assert_eq!(engine.totals().price, Price::from_cents(1300));
        assert!(engine.pending_writes().is_empty());
        assert!(!engine.flush_armed());
        assert!(engine.local().raw().is_some());
    }

    #[tokio::test]
    async fn test_increment_and_decrement() {
        let engine = anonymous_engine().await;
        engine.increment(pid("tahini"));
        engine.increment(pid("tahini"));
        engine.decrement(pid("tahini"));
        assert_eq!(engine.cart().quantity(&pid("tahini")), 1);

        engine.decrement(pid("tahini"));
        assert!(engine.cart().is_empty());
        engine.decrement(pid("tahini"));
        assert!(engine.cart().is_empty());
    }

    #[tokio::test]
    async fn test_events_published_in_order() {
        let engine = anonymous_engine().await;
        let mut events = engine.subscribe();

        engine.edit_cart(pid("tahini"), 1);
        engine.set_catalog(Catalog::default());

        assert_eq!(events.recv().await.unwrap(), CartEvent::CartChanged);
        assert_eq!(events.recv().await.unwrap(), CartEvent::CatalogChanged);
        assert_eq!(engine.totals().price, Price::ZERO);
        assert_eq!(engine.totals().quantity, 1);
    }

    #[tokio::test]
    async fn test_catalog_change_recomputes_totals() {
        let engine = anonymous_engine().await;
        engine.edit_cart(pid("tahini"), 3);

        let mut repriced = catalog();
        repriced.insert(Product {
            id: pid("tahini"),
            name: "Tahini".to_string(),
            description: None,
            price: Price::new(Decimal::new(1, 0)),
            image_url: None,
        });
        engine.set_catalog(repriced);

        assert_eq!(engine.view().totals.price, Price::from_cents(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_armed_flush() {
        let engine = CartEngine::start(
            MemoryCartStore::new(),
            MemoryStorage::new(),
            catalog(),
            Some(UserId::new(1)),
            EngineConfig::default(),
        )
        .await;

        engine.edit_cart(pid("tahini"), 1);
        assert!(engine.flush_armed());

        engine.shutdown();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(engine.remote().writes().is_empty());
        engine.edit_cart(pid("tahini"), 4);
        assert_eq!(engine.cart().quantity(&pid("tahini")), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_sends_immediately() {
        let engine = CartEngine::start(
            MemoryCartStore::new(),
            MemoryStorage::new(),
            catalog(),
            Some(UserId::new(1)),
            EngineConfig::default(),
        )
        .await;

        engine.edit_cart(pid("tahini"), 2);
        assert_eq!(engine.flush_now().await.unwrap(), 1);
        assert!(!engine.flush_armed());
        assert!(engine.pending_writes().is_empty());
        assert_eq!(engine.flush_now().await.unwrap(), 0);
        assert_eq!(engine.remote().writes().len(), 1);
    }
}
