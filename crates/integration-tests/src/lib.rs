//! Integration tests for TasteTrove.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tastetrove-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `engine_properties` - Cart engine behaviour over in-memory adapters
//! - `http_adapters` - HTTP cart store and catalog client against
//!   [`MockStorefront`]
//!
//! Nothing here needs a database: [`MockStorefront`] is an in-process axum
//! server that speaks the storefront's JSON API with in-memory state.

#![allow(clippy::missing_panics_doc)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;

use tastetrove_core::{CartBody, CartLine, CartUpdateBody, Price, Product, ProductId, UserId};

/// Session cookie name, matching the real storefront.
pub const SESSION_COOKIE: &str = "tt_session";

/// Parse a product ID in tests.
#[must_use]
pub fn pid(s: &str) -> ProductId {
    ProductId::parse(s).unwrap_or_else(|e| panic!("invalid product id {s:?}: {e}"))
}

/// Build a product with no description or image.
#[must_use]
pub fn product(id: &str, name: &str, price: Decimal) -> Product {
    Product {
        id: pid(id),
        name: name.to_string(),
        description: None,
        price: Price::new(price),
        image_url: None,
    }
}

/// The two-product catalog used across tests: `A` at 10.00, `B` at 2.505.
#[must_use]
pub fn sample_products() -> Vec<Product> {
    vec![
        product("A", "Aleppo Pepper", Decimal::new(1000, 2)),
        product("B", "Black Cardamom", Decimal::new(2505, 3)),
    ]
}

// =============================================================================
// Mock storefront
// =============================================================================

#[derive(Debug)]
struct Account {
    id: UserId,
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct MockState {
    products: Vec<Product>,
    accounts: Vec<Account>,
    sessions: HashMap<String, UserId>,
    carts: HashMap<UserId, BTreeMap<ProductId, u32>>,
    next_session: u64,
}

impl MockState {
    fn account(&self, user: UserId) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == user)
    }

    fn start_session(&mut self, user: UserId) -> String {
        self.next_session += 1;
        let token = format!("session-{}", self.next_session);
        self.sessions.insert(token.clone(), user);
        token
    }

    fn cart_lines(&self, user: UserId) -> Vec<CartLine> {
        self.carts
            .get(&user)
            .map(|cart| {
                cart.iter()
                    .map(|(id, q)| CartLine::new(id.clone(), *q))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Clone, Default)]
struct Shared {
    state: Arc<Mutex<MockState>>,
    product_requests: Arc<AtomicUsize>,
    cart_writes: Arc<AtomicUsize>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process storefront API with in-memory accounts, sessions and carts.
///
/// The server runs until the test's runtime shuts down.
pub struct MockStorefront {
    addr: SocketAddr,
    shared: Shared,
}

impl MockStorefront {
    /// Bind to an ephemeral port and start serving `products`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn spawn(products: Vec<Product>) -> std::io::Result<Self> {
        let shared = Shared::default();
        shared.lock().products = products;

        let app = Router::new()
            .route("/api/products", get(list_products))
            .route("/api/auth/register", post(register))
            .route("/api/auth/login", post(login))
            .route("/api/auth/logout", post(logout))
            .route("/api/auth/me", get(me))
            .route("/api/users/{user_id}/cart", get(show_cart).put(update_cart))
            .with_state(shared.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            // Ends with the runtime.
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, shared })
    }

    /// Base URL of the running server, with a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Number of `GET /api/products` requests served.
    #[must_use]
    pub fn product_requests(&self) -> usize {
        self.shared.product_requests.load(Ordering::SeqCst)
    }

    /// Number of successful cart `PUT`s.
    #[must_use]
    pub fn cart_writes(&self) -> usize {
        self.shared.cart_writes.load(Ordering::SeqCst)
    }

    /// Replace the served catalog.
    pub fn set_products(&self, products: Vec<Product>) {
        self.shared.lock().products = products;
    }

    /// The stored cart of a user.
    #[must_use]
    pub fn cart(&self, user: UserId) -> Vec<CartLine> {
        self.shared.lock().cart_lines(user)
    }

    /// Overwrite the stored cart of a user.
    pub fn seed_cart(&self, user: UserId, lines: impl IntoIterator<Item = CartLine>) {
        let cart = lines
            .into_iter()
            .map(|line| (line.product_id, line.quantity))
            .collect();
        self.shared.lock().carts.insert(user, cart);
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

fn session_user(shared: &Shared, headers: &HeaderMap) -> Result<UserId, Response> {
    session_token(headers)
        .and_then(|token| shared.lock().sessions.get(&token).copied())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Not signed in"))
}

fn signed_in(status: StatusCode, token: &str, account: &Account) -> Response {
    let cookie = format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax");
    let mut response = (
        status,
        Json(json!({ "id": account.id, "email": account.email })),
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

#[derive(Deserialize)]
struct CredentialsBody {
    email: String,
    password: String,
}

async fn list_products(State(shared): State<Shared>) -> Json<Vec<Product>> {
    shared.product_requests.fetch_add(1, Ordering::SeqCst);
    Json(shared.lock().products.clone())
}

async fn register(State(shared): State<Shared>, Json(body): Json<CredentialsBody>) -> Response {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return error(StatusCode::BAD_REQUEST, "Invalid email address");
    }
    if body.password.chars().count() < 8 {
        return error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters",
        );
    }

    let mut state = shared.lock();
    if state.accounts.iter().any(|a| a.email == email) {
        return error(
            StatusCode::CONFLICT,
            "An account with this email already exists",
        );
    }

    let id = UserId::new(i32::try_from(state.accounts.len()).unwrap_or(i32::MAX - 1) + 1);
    state.accounts.push(Account {
        id,
        email,
        password: body.password,
    });
    let token = state.start_session(id);
    let Some(account) = state.account(id) else {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };
    signed_in(StatusCode::CREATED, &token, account)
}

async fn login(State(shared): State<Shared>, Json(body): Json<CredentialsBody>) -> Response {
    let email = body.email.trim().to_lowercase();
    let mut state = shared.lock();
    let Some(id) = state
        .accounts
        .iter()
        .find(|a| a.email == email && a.password == body.password)
        .map(|a| a.id)
    else {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials");
    };

    let token = state.start_session(id);
    let Some(account) = state.account(id) else {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
    };
    signed_in(StatusCode::OK, &token, account)
}

async fn logout(State(shared): State<Shared>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = session_token(&headers) {
        shared.lock().sessions.remove(&token);
    }
    StatusCode::NO_CONTENT
}

async fn me(State(shared): State<Shared>, headers: HeaderMap) -> Response {
    let user = match session_user(&shared, &headers) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let state = shared.lock();
    match state.account(user) {
        Some(account) => Json(json!({ "id": account.id, "email": account.email })).into_response(),
        None => error(StatusCode::UNAUTHORIZED, "Not signed in"),
    }
}

fn owned_cart(shared: &Shared, headers: &HeaderMap, user_id: UserId) -> Result<(), Response> {
    let user = session_user(shared, headers)?;
    if user == user_id {
        Ok(())
    } else {
        Err(error(
            StatusCode::FORBIDDEN,
            "Cannot access another user's cart",
        ))
    }
}

async fn show_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
) -> Response {
    if let Err(response) = owned_cart(&shared, &headers, user_id) {
        return response;
    }
    let lines = shared.lock().cart_lines(user_id);
    Json(CartBody { lines }).into_response()
}

async fn update_cart(
    State(shared): State<Shared>,
    headers: HeaderMap,
    Path(user_id): Path<UserId>,
    Json(body): Json<CartUpdateBody>,
) -> Response {
    if let Err(response) = owned_cart(&shared, &headers, user_id) {
        return response;
    }

    let mut state = shared.lock();
    let known: Vec<ProductId> = state.products.iter().map(|p| p.id.clone()).collect();
    let cart = state.carts.entry(user_id).or_default();
    for update in body.updates {
        if update.is_delete() {
            cart.remove(&update.product_id);
        } else if known.contains(&update.product_id) {
            cart.insert(update.product_id, update.quantity);
        }
    }
    shared.cart_writes.fetch_add(1, Ordering::SeqCst);

    let lines = state.cart_lines(user_id);
    Json(CartBody { lines }).into_response()
}
