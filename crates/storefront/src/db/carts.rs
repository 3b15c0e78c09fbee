//! Remote cart repository.
//!
//! One row per `(user, product)`. Updates are absolute: a quantity replaces
//! the stored one and zero deletes the row.

use sqlx::PgPool;

use tastetrove_core::{CartLine, LineUpdate, ProductId, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: ProductId,
    quantity: i32,
}

impl TryFrom<CartLineRow> for CartLine {
    type Error = RepositoryError;

    fn try_from(row: CartLineRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(row.quantity).map_err(|_| {
            RepositoryError::DataCorruption(format!(
                "negative quantity {} for {}",
                row.quantity, row.product_id
            ))
        })?;
        Ok(Self::new(row.product_id, quantity))
    }
}

/// Convert a wire quantity into the `INTEGER` column type.
fn column_quantity(update: &LineUpdate) -> Result<i32, RepositoryError> {
    i32::try_from(update.quantity).map_err(|_| {
        RepositoryError::InvalidInput(format!(
            "quantity {} for {} is out of range",
            update.quantity, update.product_id
        ))
    })
}

/// Split a batch into the updates to apply and the products skipped.
///
/// Deletes always apply. Upserts of products missing from `known` are
/// skipped so a discontinued product cannot block the rest of the batch.
fn applicable<'u>(
    updates: &'u [LineUpdate],
    known: &[ProductId],
) -> (Vec<&'u LineUpdate>, Vec<&'u ProductId>) {
    let mut apply = Vec::with_capacity(updates.len());
    let mut skipped = Vec::new();
    for update in updates {
        if update.is_delete() || known.contains(&update.product_id) {
            apply.push(update);
        } else {
            skipped.push(&update.product_id);
        }
    }
    (apply, skipped)
}

/// Repository for per-user carts.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every line of the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn lines(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT product_id, quantity
            FROM storefront.cart_line
            WHERE user_id = $1
            ORDER BY product_id
            ",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply a batch of absolute-set updates in one transaction.
    ///
    /// Either every update is applied or none is. Upserts of products missing
    /// from the catalog are skipped. Returns the resulting lines, which leave
    /// out skipped products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidInput` if a quantity does not fit the
    /// column.
    pub async fn apply(
        &self,
        user: UserId,
        updates: &[LineUpdate],
    ) -> Result<Vec<CartLine>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<&str> = updates.iter().map(|u| u.product_id.as_str()).collect();
        let known: Vec<ProductId> = sqlx::query_scalar(
            r"
            SELECT id FROM storefront.product WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        let (updates, skipped) = applicable(updates, &known);
        if !skipped.is_empty() {
            tracing::warn!(%user, ?skipped, "Skipping cart updates for unknown products");
        }

        for &update in &updates {
            if update.is_delete() {
                sqlx::query(
                    r"
                    DELETE FROM storefront.cart_line
                    WHERE user_id = $1 AND product_id = $2
                    ",
                )
                .bind(user)
                .bind(&update.product_id)
                .execute(&mut *tx)
                .await?;
            } else {
                sqlx::query(
                    r"
                    INSERT INTO storefront.cart_line (user_id, product_id, quantity)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (user_id, product_id) DO UPDATE
                    SET quantity = EXCLUDED.quantity,
                        updated_at = NOW()
                    ",
                )
                .bind(user)
                .bind(&update.product_id)
                .bind(column_quantity(update)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT product_id, quantity
            FROM storefront.cart_line
            WHERE user_id = $1
            ORDER BY product_id
            ",
        )
        .bind(user)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(%user, updates = updates.len(), lines = rows.len(), "Applied cart updates");
        rows.into_iter().map(TryInto::try_into).collect()
    }
}
