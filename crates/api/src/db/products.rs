//! Product repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use nutmart_core::{Money, ProductId};

use super::{Page, PageRequest, RepositoryError, like_pattern, to_i32, to_u32};
use crate::models::catalog::{Product, ProductDraft, ProductFilter};

const PRODUCT_COLUMNS: &str = "id, slug, name, description, category, image_url, price, \
     sale_price, weight_grams, stock, active, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    slug: String,
    name: String,
    description: String,
    category: String,
    image_url: Option<String>,
    price: Money,
    sale_price: Option<Money>,
    weight_grams: i32,
    stock: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            slug: row.slug,
            name: row.name,
            description: row.description,
            category: row.category,
            image_url: row.image_url,
            price: row.price,
            sale_price: row.sale_price,
            weight_grams: to_u32(row.weight_grams, "weight_grams")?,
            stock: to_u32(row.stock, "stock")?,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_products(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products. With `include_inactive` false only active products
    /// are returned, as the storefront shows them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(
        &self,
        filter: &ProductFilter,
        include_inactive: bool,
        page: PageRequest,
    ) -> Result<Page<Product>, RepositoryError> {
        let pattern = filter.q.as_deref().map(like_pattern);
        let category = filter.category.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let conditions = "($1 OR active) \
             AND ($2::text IS NULL OR category = $2) \
             AND ($3::text IS NULL OR name ILIKE $3 OR slug ILIKE $3 OR description ILIKE $3)";

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.products \
             WHERE {conditions} \
             ORDER BY {} \
             LIMIT $4 OFFSET $5",
            filter.sort.order_by()
        ))
        .bind(include_inactive)
        .bind(category)
        .bind(pattern.as_deref())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM shop.products WHERE {conditions}"
        ))
        .bind(include_inactive)
        .bind(category)
        .bind(pattern.as_deref())
        .fetch_one(self.pool)
        .await?;

        Ok(Page::new(into_products(rows)?, total, page))
    }

    /// Distinct categories of active products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let categories = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT category FROM shop.products \
             WHERE active AND category <> '' \
             ORDER BY category",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(categories)
    }

    /// An active product by slug.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if no active product has the slug.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.products WHERE slug = $1 AND active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Active products among `ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_active(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.products WHERE id = ANY($1) AND active"
        ))
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        into_products(rows)
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn get(&self, id: ProductId) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM shop.products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn create(&self, draft: &ProductDraft) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO shop.products \
                 (slug, name, description, category, image_url, price, sale_price, \
                  weight_grams, stock, active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&draft.slug)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(draft.image_url.as_deref())
        .bind(draft.price)
        .bind(draft.sale_price)
        .bind(to_i32(draft.weight_grams, "weight_grams")?)
        .bind(to_i32(draft.stock, "stock")?)
        .bind(draft.active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "slug already exists"))?
        .try_into()
    }

    /// Overwrite a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if the slug is taken.
    pub async fn update(
        &self,
        id: ProductId,
        draft: &ProductDraft,
    ) -> Result<Product, RepositoryError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE shop.products \
             SET slug = $2, name = $3, description = $4, category = $5, image_url = $6, \
                 price = $7, sale_price = $8, weight_grams = $9, stock = $10, active = $11, \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&draft.slug)
        .bind(&draft.name)
        .bind(&draft.description)
        .bind(&draft.category)
        .bind(draft.image_url.as_deref())
        .bind(draft.price)
        .bind(draft.sale_price)
        .bind(to_i32(draft.weight_grams, "weight_grams")?)
        .bind(to_i32(draft.stock, "stock")?)
        .bind(draft.active)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "slug already exists"))?
        .ok_or(RepositoryError::NotFound)?
        .try_into()
    }

    /// Delete a product. Past order lines keep their copied name and price.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM shop.products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

// =============================================================================
// Transaction steps
// =============================================================================

/// Lock and load products for checkout, in ID order to avoid deadlocks.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn lock_for_checkout(
    conn: &mut PgConnection,
    ids: &[ProductId],
) -> Result<Vec<Product>, RepositoryError> {
    let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
    let rows = sqlx::query_as::<_, ProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM shop.products \
         WHERE id = ANY($1) \
         ORDER BY id \
         FOR UPDATE"
    ))
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await?;

    into_products(rows)
}

/// Take `quantity` units from stock if enough remain. Returns whether it did.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn decrement_stock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: u32,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query(
        "UPDATE shop.products SET stock = stock - $2, updated_at = now() \
         WHERE id = $1 AND stock >= $2",
    )
    .bind(id)
    .bind(to_i32(quantity, "quantity")?)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Put `quantity` units back in stock. Deleted products are skipped.
///
/// # Errors
///
/// Returns `RepositoryError::Database` if the query fails.
pub async fn restock(
    conn: &mut PgConnection,
    id: ProductId,
    quantity: u32,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "UPDATE shop.products SET stock = stock + $2, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .bind(to_i32(quantity, "quantity")?)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(weight_grams: i32, stock: i32) -> ProductRow {
        ProductRow {
            id: ProductId::new(1),
            slug: "hat-dieu-rang-muoi".to_string(),
            name: "Hạt điều rang muối".to_string(),
            description: String::new(),
            category: "hat-dieu".to_string(),
            image_url: None,
            price: Money::from_dong(250_000),
            sale_price: Some(Money::from_dong(220_000)),
            weight_grams,
            stock,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_conversion() {
        let product = Product::try_from(row(500, 12)).unwrap();
        assert_eq!(product.weight_grams, 500);
        assert_eq!(product.stock, 12);
        assert_eq!(product.unit_price(), Money::from_dong(220_000));
    }

    #[test]
    fn test_negative_stock_is_corruption() {
        let err = Product::try_from(row(500, -1)).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
