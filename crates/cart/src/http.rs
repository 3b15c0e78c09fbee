//! HTTP adapters for the storefront REST API.
//!
//! [`HttpCartStore`] implements [`RemoteCartStore`] over
//! `GET`/`PUT /api/users/{id}/cart` and carries the session cookie obtained
//! from [`HttpCartStore::login`]. [`HttpCatalogClient`] loads
//! `/api/products` into a [`Catalog`], cached for 5 minutes.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tastetrove_core::{CartBody, CartLine, CartUpdateBody, LineUpdate, Product, UserId};
use tracing::{debug, instrument};
use url::Url;

use crate::catalog::Catalog;
use crate::ports::{RemoteCartStore, RemoteError};

/// How long a fetched catalog is reused.
const CATALOG_TTL: Duration = Duration::from_secs(300);

/// Parse a base URL, making sure relative joins keep its path.
fn parse_base_url(raw: &str) -> Result<Url, RemoteError> {
    let mut url = Url::parse(raw)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Turn a non-success response into [`RemoteError::Status`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.is_empty() {
        status.canonical_reason().unwrap_or_default().to_string()
    } else {
        body.chars().take(200).collect()
    };
    tracing::warn!(status = %status, message = %message, "Storefront returned non-success status");
    Err(RemoteError::Status {
        status: status.as_u16(),
        message,
    })
}

/// A signed-in storefront user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

// =============================================================================
// HttpCartStore
// =============================================================================

/// Remote cart store backed by the storefront REST API.
///
/// Cloning shares the cookie jar, so every clone acts within the same session.
#[derive(Debug, Clone)]
pub struct HttpCartStore {
    client: reqwest::Client,
    base: Url,
}

impl HttpCartStore {
    /// Create a store for the storefront at `base_url` with its own cookie jar.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Self::with_client(client, base_url)
    }

    /// Create a store around an existing client.
    ///
    /// The client needs a cookie store for authenticated requests to succeed.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, RemoteError> {
        Ok(Self {
            client,
            base: parse_base_url(base_url)?,
        })
    }

    fn cart_url(&self, user: UserId) -> Result<Url, RemoteError> {
        Ok(self.base.join(&format!("api/users/{user}/cart"))?)
    }

    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionUser, RemoteError> {
        let response = self
            .client
            .post(self.base.join(path)?)
            .json(&Credentials { email, password })
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    /// Create an account and start a session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Status` with 409 if the email is taken, 400 if
    /// the input is invalid.
    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<SessionUser, RemoteError> {
        self.authenticate("api/auth/register", email, password).await
    }

    /// Start a session.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Status` with 401 for bad credentials.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, RemoteError> {
        self.authenticate("api/auth/login", email, password).await
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.base.join("api/auth/logout")?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// The user of the current session, or `None` without one.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails for any reason other than 401.
    pub async fn current_user(&self) -> Result<Option<SessionUser>, RemoteError> {
        let response = self
            .client
            .get(self.base.join("api/auth/me")?)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        Ok(Some(check(response).await?.json().await?))
    }
}

impl RemoteCartStore for HttpCartStore {
    #[instrument(skip(self))]
    async fn fetch(&self, user: UserId) -> Result<Vec<CartLine>, RemoteError> {
        let response = self.client.get(self.cart_url(user)?).send().await?;
        let body: CartBody = check(response).await?.json().await?;
        debug!(lines = body.lines.len(), "Fetched remote cart");
        Ok(body.lines)
    }

    #[instrument(skip(self, updates), fields(updates = updates.len()))]
    async fn write(&self, user: UserId, updates: Vec<LineUpdate>) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.cart_url(user)?)
            .json(&CartUpdateBody { updates })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }
}

// =============================================================================
// HttpCatalogClient
// =============================================================================

/// Catalog client for `GET /api/products`.
#[derive(Clone)]
pub struct HttpCatalogClient {
    inner: Arc<HttpCatalogClientInner>,
}

struct HttpCatalogClientInner {
    client: reqwest::Client,
    base: Url,
    cache: Cache<(), Arc<Catalog>>,
}

impl HttpCatalogClient {
    /// Create a catalog client for the storefront at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a catalog client around an existing client.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, RemoteError> {
        let cache = Cache::builder()
            .max_capacity(1)
            .time_to_live(CATALOG_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(HttpCatalogClientInner {
                client,
                base: parse_base_url(base_url)?,
                cache,
            }),
        })
    }

    /// The full catalog, served from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body cannot be decoded.
    #[instrument(skip(self))]
    pub async fn catalog(&self) -> Result<Arc<Catalog>, RemoteError> {
        if let Some(catalog) = self.inner.cache.get(&()).await {
            debug!("Cache hit for catalog");
            return Ok(catalog);
        }

        let response = self
            .inner
            .client
            .get(self.inner.base.join("api/products")?)
            .send()
            .await?;
        let products: Vec<Product> = check(response).await?.json().await?;
        let catalog = Arc::new(Catalog::new(products));
        debug!(products = catalog.len(), "Fetched catalog");

        self.inner.cache.insert((), Arc::clone(&catalog)).await;
        Ok(catalog)
    }

    /// Drop the cached catalog so the next call refetches.
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(&()).await;
    }
}
