//! Cart engine behaviour over the in-memory adapters.
//!
//! Time-dependent tests run on a paused clock, so debounce windows elapse
//! instantly and deterministically.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio::sync::{broadcast::error::TryRecvError, watch};
use tokio::time::sleep;

use tastetrove_cart::{
    CartEngine, CartEvent, Catalog, EngineConfig, FileStorage, LocalCartStorage, MemoryCartStore,
    MemoryStorage, RemoteCall, SignInPolicy,
};
use tastetrove_core::{CartLine, LineUpdate, Price, UserId};
use tastetrove_integration_tests::{pid, sample_products};

const USER: UserId = UserId::new(1);
const OTHER_USER: UserId = UserId::new(2);

type MemoryEngine = CartEngine<MemoryCartStore, MemoryStorage>;

fn catalog() -> Catalog {
    Catalog::new(sample_products())
}

async fn start(
    store: MemoryCartStore,
    storage: MemoryStorage,
    identity: Option<UserId>,
) -> MemoryEngine {
    start_with(store, storage, identity, EngineConfig::default()).await
}

async fn start_with(
    store: MemoryCartStore,
    storage: MemoryStorage,
    identity: Option<UserId>,
    config: EngineConfig,
) -> MemoryEngine {
    CartEngine::start(store, storage, catalog(), identity, config).await
}

/// Let the debounce window elapse and the flush run.
async fn settle() {
    sleep(Duration::from_secs(1)).await;
}

// =============================================================================
// Edits and totals
// =============================================================================

#[tokio::test]
async fn test_zero_edit_on_missing_product_is_a_no_op() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("B"), 1);
    let before = engine.cart();
    let mut events = engine.subscribe();

    engine.edit_cart(pid("A"), 0);

    assert_eq!(engine.cart(), before);
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn test_edit_replaces_quantity() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("A"), 2);
    engine.edit_cart(pid("A"), 5);

    assert_eq!(engine.lines(), vec![CartLine::new(pid("A"), 5)]);
}

#[tokio::test]
async fn test_zero_quantity_removes_line() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("A"), 3);
    engine.edit_cart(pid("B"), 1);

    engine.edit_cart(pid("A"), 0);

    assert_eq!(engine.lines(), vec![CartLine::new(pid("B"), 1)]);
}

#[tokio::test]
async fn test_totals_round_half_up_to_cents() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("A"), 2);
    engine.edit_cart(pid("B"), 1);

    let totals = engine.totals();
    assert_eq!(totals.quantity, 3);
    assert_eq!(totals.price, Price::from_cents(2251));
    assert_eq!(totals.price.to_string(), "$22.51");
}

#[tokio::test]
async fn test_unknown_product_counts_quantity_only() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("A"), 1);
    engine.edit_cart(pid("discontinued"), 4);

    let totals = engine.totals();
    assert_eq!(totals.quantity, 5);
    assert_eq!(totals.price, Price::from_cents(1000));
}

// =============================================================================
// Debounced flush
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_quick_edits_coalesce_into_one_write() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;

    engine.edit_cart(pid("A"), 1);
    sleep(Duration::from_millis(100)).await;
    engine.edit_cart(pid("A"), 2);
    sleep(Duration::from_millis(100)).await;
    engine.edit_cart(pid("A"), 3);
    settle().await;

    assert_eq!(
        engine.remote().writes(),
        vec![vec![LineUpdate::new(pid("A"), 3)]]
    );
    assert!(engine.pending_writes().is_empty());
    assert_eq!(engine.remote().cart(USER), vec![CartLine::new(pid("A"), 3)]);
}

#[tokio::test(start_paused = true)]
async fn test_edits_separated_by_a_pause_write_twice() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;

    engine.edit_cart(pid("A"), 1);
    sleep(Duration::from_millis(600)).await;
    engine.edit_cart(pid("B"), 2);
    settle().await;

    assert_eq!(
        engine.remote().writes(),
        vec![
            vec![LineUpdate::new(pid("A"), 1)],
            vec![LineUpdate::new(pid("B"), 2)],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_flush_publishes_events() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    let mut events = engine.subscribe();

    engine.edit_cart(pid("A"), 1);
    settle().await;

    assert_eq!(events.recv().await.unwrap(), CartEvent::CartChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::PendingChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::Flushed { sent: 1 });
    assert_eq!(events.recv().await.unwrap(), CartEvent::PendingChanged);
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_keeps_writes_for_next_flush() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    let mut events = engine.subscribe();
    engine.remote().set_fail_write(true);

    engine.edit_cart(pid("A"), 1);
    settle().await;

    assert_eq!(engine.remote().writes().len(), 1);
    assert_eq!(engine.pending_writes().get(&pid("A")), Some(1));
    assert_eq!(engine.cart().quantity(&pid("A")), 1);
    assert!(engine.remote().cart(USER).is_empty());
    assert_eq!(events.recv().await.unwrap(), CartEvent::CartChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::PendingChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::FlushFailed);

    engine.remote().set_fail_write(false);
    engine.edit_cart(pid("B"), 2);
    settle().await;

    let writes = engine.remote().writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(
        writes[1],
        vec![LineUpdate::new(pid("A"), 1), LineUpdate::new(pid("B"), 2)]
    );
    assert!(engine.pending_writes().is_empty());
    assert_eq!(
        engine.remote().cart(USER),
        vec![CartLine::new(pid("A"), 1), CartLine::new(pid("B"), 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_flush_survives_completion() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    engine.remote().set_latency(Some(Duration::from_secs(1)));

    // First flush starts at 500 ms and completes at 1500 ms.
    engine.edit_cart(pid("A"), 1);
    sleep(Duration::from_millis(600)).await;
    assert_eq!(engine.remote().writes().len(), 1);

    engine.edit_cart(pid("A"), 2);
    sleep(Duration::from_millis(1000)).await;

    // The first write has completed but did not carry the newer quantity.
    assert_eq!(engine.pending_writes().get(&pid("A")), Some(2));

    sleep(Duration::from_secs(2)).await;

    assert_eq!(
        engine.remote().writes(),
        vec![
            vec![LineUpdate::new(pid("A"), 1)],
            vec![LineUpdate::new(pid("A"), 2)],
        ]
    );
    assert!(engine.pending_writes().is_empty());
    assert_eq!(engine.remote().cart(USER), vec![CartLine::new(pid("A"), 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_write_does_not_block_later_edits() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    let mut events = engine.subscribe();
    engine.remote().set_reject_writes(Some(400));

    engine.edit_cart(pid("discontinued"), 1);
    settle().await;

    assert_eq!(engine.remote().writes().len(), 1);
    assert!(engine.pending_writes().is_empty());
    assert_eq!(engine.cart().quantity(&pid("discontinued")), 1);
    assert_eq!(events.recv().await.unwrap(), CartEvent::CartChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::PendingChanged);
    assert_eq!(events.recv().await.unwrap(), CartEvent::FlushFailed);
    assert_eq!(events.recv().await.unwrap(), CartEvent::PendingChanged);

    engine.remote().set_reject_writes(None);
    engine.edit_cart(pid("A"), 2);
    settle().await;

    assert_eq!(
        engine.remote().writes()[1],
        vec![LineUpdate::new(pid("A"), 2)]
    );
    assert_eq!(engine.remote().cart(USER), vec![CartLine::new(pid("A"), 2)]);
    assert!(engine.pending_writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_session_errors_keep_writes_queued() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    engine.remote().set_reject_writes(Some(401));

    engine.edit_cart(pid("A"), 1);
    assert!(engine.flush_now().await.is_err());

    assert_eq!(engine.pending_writes().get(&pid("A")), Some(1));
}

// =============================================================================
// Local storage
// =============================================================================

#[tokio::test]
async fn test_anonymous_cart_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cart.json");

    let first = CartEngine::start(
        MemoryCartStore::new(),
        FileStorage::new(&path),
        catalog(),
        None,
        EngineConfig::default(),
    )
    .await;
    first.edit_cart(pid("A"), 2);
    first.edit_cart(pid("B"), 1);
    let snapshot = first.cart();
    first.shutdown();
    drop(first);

    let second = CartEngine::start(
        MemoryCartStore::new(),
        FileStorage::new(&path),
        catalog(),
        None,
        EngineConfig::default(),
    )
    .await;

    assert_eq!(second.cart(), snapshot);
    assert_eq!(second.totals().price, Price::from_cents(2251));
    assert!(second.remote().calls().is_empty());
}

#[tokio::test]
async fn test_malformed_local_storage_loads_empty() {
    for raw in ["not json", r#"{"lines":[]}"#, r#"[{"productId":"A"}]"#] {
        let engine = start(MemoryCartStore::new(), MemoryStorage::with_raw(raw), None).await;
        assert!(engine.cart().is_empty(), "{raw} should load as empty");
        assert_eq!(engine.totals().quantity, 0);
    }
}

#[tokio::test]
async fn test_signed_in_start_caches_remote_cart_locally() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("B"), 4)]);
    let engine = start(store, MemoryStorage::with_raw("[]"), Some(USER)).await;

    assert_eq!(engine.lines(), vec![CartLine::new(pid("B"), 4)]);
    assert_eq!(engine.local().read(), Some(vec![CartLine::new(pid("B"), 4)]));
}

#[tokio::test]
async fn test_signed_in_start_with_failed_fetch_is_empty() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("B"), 4)]);
    store.set_fail_fetch(true);
    let engine = start(store, MemoryStorage::new(), Some(USER)).await;

    assert!(engine.cart().is_empty());
    assert_eq!(engine.identity(), Some(USER));
}

// =============================================================================
// Identity transitions
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_in_replaces_anonymous_cart() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("B"), 1)]);
    let engine = start(store, MemoryStorage::new(), None).await;
    engine.edit_cart(pid("A"), 2);

    engine.set_identity(Some(USER)).await;

    assert_eq!(engine.lines(), vec![CartLine::new(pid("B"), 1)]);
    assert_eq!(engine.local().read(), Some(vec![CartLine::new(pid("B"), 1)]));
    assert!(engine.pending_writes().is_empty());
    assert_eq!(engine.totals().price, Price::from_cents(251));

    settle().await;
    assert!(engine.remote().writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_with_merge_policy_keeps_anonymous_lines() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("A"), 5), CartLine::new(pid("B"), 1)]);
    let config = EngineConfig {
        sign_in: SignInPolicy::Merge,
        ..EngineConfig::default()
    };
    let engine = start_with(store, MemoryStorage::new(), None, config).await;
    engine.edit_cart(pid("A"), 2);

    engine.set_identity(Some(USER)).await;

    assert_eq!(
        engine.lines(),
        vec![CartLine::new(pid("A"), 2), CartLine::new(pid("B"), 1)]
    );
    assert_eq!(engine.pending_writes().get(&pid("A")), Some(2));

    settle().await;
    assert_eq!(
        engine.remote().writes(),
        vec![vec![LineUpdate::new(pid("A"), 2)]]
    );
    assert_eq!(
        engine.remote().cart(USER),
        vec![CartLine::new(pid("A"), 2), CartLine::new(pid("B"), 1)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_same_identity_is_a_no_op() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    engine.edit_cart(pid("A"), 1);

    engine.set_identity(Some(USER)).await;

    assert_eq!(engine.pending_writes().len(), 1);
    assert!(engine.flush_armed());
    assert_eq!(engine.remote().calls(), vec![RemoteCall::Fetch(USER)]);
}

#[tokio::test(start_paused = true)]
async fn test_identity_change_cancels_armed_flush() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), Some(USER)).await;
    engine.edit_cart(pid("A"), 1);
    assert!(engine.flush_armed());

    engine.set_identity(Some(OTHER_USER)).await;
    settle().await;

    assert!(engine.remote().writes().is_empty());
    assert!(engine.pending_writes().is_empty());
    assert!(engine.cart().is_empty());
    assert_eq!(
        engine.remote().calls(),
        vec![RemoteCall::Fetch(USER), RemoteCall::Fetch(OTHER_USER)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_local_storage_and_cart() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("A"), 2)]);
    let engine = start(store, MemoryStorage::new(), Some(USER)).await;
    let mut events = engine.subscribe();
    assert!(engine.local().raw().is_some());

    engine.set_identity(None).await;

    assert!(engine.cart().is_empty());
    assert!(engine.local().raw().is_none());
    assert_eq!(engine.totals().quantity, 0);
    assert_eq!(engine.totals().price, Price::ZERO);
    assert_eq!(events.recv().await.unwrap(), CartEvent::IdentityChanged(None));

    // The remote cart is untouched.
    assert_eq!(engine.remote().cart(USER), vec![CartLine::new(pid("A"), 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_edit_during_sign_in_fetch_survives() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("B"), 1)]);
    store.set_latency(Some(Duration::from_secs(1)));
    let engine = start(store, MemoryStorage::new(), None).await;

    let signing_in = tokio::spawn({
        let engine = engine.clone();
        async move { engine.set_identity(Some(USER)).await }
    });
    sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.identity(), Some(USER));

    engine.edit_cart(pid("A"), 3);
    signing_in.await.unwrap();

    assert_eq!(
        engine.lines(),
        vec![CartLine::new(pid("A"), 3), CartLine::new(pid("B"), 1)]
    );

    sleep(Duration::from_secs(5)).await;
    assert!(engine.pending_writes().is_empty());
    assert_eq!(
        engine.remote().cart(USER),
        vec![CartLine::new(pid("A"), 3), CartLine::new(pid("B"), 1)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_edit_flushed_before_sign_in_fetch_answers_survives() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("B"), 1)]);
    store.set_latency(Some(Duration::from_secs(1)));
    let engine = start(store, MemoryStorage::new(), None).await;

    let signing_in = tokio::spawn({
        let engine = engine.clone();
        async move { engine.set_identity(Some(USER)).await }
    });
    sleep(Duration::from_millis(100)).await;

    // The fetch still holds the cart as it was when the request arrived,
    // while the edit's flush goes through at once.
    engine.remote().set_latency(None);
    engine.edit_cart(pid("A"), 3);
    sleep(Duration::from_millis(600)).await;
    assert!(engine.pending_writes().is_empty());
    assert_eq!(
        engine.remote().cart(USER),
        vec![CartLine::new(pid("A"), 3), CartLine::new(pid("B"), 1)]
    );

    signing_in.await.unwrap();

    let expected = vec![CartLine::new(pid("A"), 3), CartLine::new(pid("B"), 1)];
    assert_eq!(engine.lines(), expected);
    assert_eq!(engine.local().read(), Some(expected));
    assert_eq!(engine.totals().quantity, 4);
    assert_eq!(engine.remote().writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_follow_identity_tracks_sign_in_and_out() {
    let store = MemoryCartStore::new();
    store.seed(USER, [CartLine::new(pid("A"), 1)]);
    let engine = start(store, MemoryStorage::new(), None).await;

    let (identity, receiver) = watch::channel(None);
    let task = engine.follow_identity(receiver);

    identity.send(Some(USER)).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.identity(), Some(USER));
    assert_eq!(engine.lines(), vec![CartLine::new(pid("A"), 1)]);

    identity.send(None).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.identity(), None);
    assert!(engine.cart().is_empty());

    drop(identity);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_catalog_update_reprices_cart() {
    let engine = start(MemoryCartStore::new(), MemoryStorage::new(), None).await;
    engine.edit_cart(pid("B"), 2);
    assert_eq!(engine.totals().price, Price::from_cents(501));

    engine.set_catalog(Catalog::default());
    assert_eq!(engine.totals().price, Price::ZERO);
    assert_eq!(engine.view().totals.quantity, 2);
}
