//! Catalog models: products and membership packages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nutmart_core::text::{is_valid_slug, slugify};
use nutmart_core::{Money, PackageId, ProductId, TierId};

use super::{
    ValidationError, nullable, optional_text, required_text, validate_optional_link,
};

// =============================================================================
// Products
// =============================================================================

/// A product for sale.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub weight_grams: u32,
    pub stock: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// The price a customer pays now.
    #[must_use]
    pub fn unit_price(&self) -> Money {
        self.sale_price.unwrap_or(self.price)
    }

    /// Whether `quantity` units can be ordered.
    #[must_use]
    pub const fn can_order(&self, quantity: u32) -> bool {
        self.active && quantity > 0 && quantity <= self.stock
    }
}

/// Sort orders for the storefront product list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    /// SQL `ORDER BY` clause for this sort. Never built from user input.
    #[must_use]
    pub const fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC, id DESC",
            Self::PriceAsc => "COALESCE(sale_price, price) ASC, id",
            Self::PriceDesc => "COALESCE(sale_price, price) DESC, id",
            Self::Name => "name ASC, id",
        }
    }
}

/// Storefront product list query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub q: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Validated product fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    pub weight_grams: u32,
    pub stock: u32,
    pub active: bool,
}

impl ProductDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let name = required_text(&self.name, "name")?;
        let slug = self.slug.trim().to_owned();
        if !is_valid_slug(&slug) {
            return Err(ValidationError::new(
                "slug must be lowercase letters, digits and single dashes",
            ));
        }
        if self.sale_price.is_some_and(|sale| sale >= self.price) {
            return Err(ValidationError::new("sale_price must be lower than price"));
        }
        let image_url = validate_optional_link(self.image_url, "image_url")?;
        Ok(Self {
            slug,
            name,
            category: self.category.trim().to_owned(),
            image_url,
            ..self
        })
    }
}

/// Product creation form. The slug is derived from the name when omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub weight_grams: u32,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewProduct {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank name, bad slug or sale price.
    pub fn into_draft(self) -> Result<ProductDraft, ValidationError> {
        let slug = optional_text(self.slug).unwrap_or_else(|| slugify(&self.name));
        ProductDraft {
            slug,
            name: self.name,
            description: self.description,
            category: self.category,
            image_url: self.image_url,
            price: self.price,
            sale_price: self.sale_price,
            weight_grams: self.weight_grams,
            stock: self.stock,
            active: self.active,
        }
        .validate()
    }
}

/// Partial product update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub price: Option<Money>,
    #[serde(default, deserialize_with = "nullable")]
    pub sale_price: Option<Option<Money>>,
    pub weight_grams: Option<u32>,
    pub stock: Option<u32>,
    pub active: Option<bool>,
}

impl ProductPatch {
    /// Apply the patch to an existing product.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged product is invalid.
    pub fn apply(self, current: Product) -> Result<ProductDraft, ValidationError> {
        ProductDraft {
            slug: self.slug.unwrap_or(current.slug),
            name: self.name.unwrap_or(current.name),
            description: self.description.unwrap_or(current.description),
            category: self.category.unwrap_or(current.category),
            image_url: self.image_url.unwrap_or(current.image_url),
            price: self.price.unwrap_or(current.price),
            sale_price: self.sale_price.unwrap_or(current.sale_price),
            weight_grams: self.weight_grams.unwrap_or(current.weight_grams),
            stock: self.stock.unwrap_or(current.stock),
            active: self.active.unwrap_or(current.active),
        }
        .validate()
    }
}

// =============================================================================
// Packages
// =============================================================================

/// A membership/voucher package.
///
/// Completing a package order issues `voucher_count` vouchers of
/// `voucher_value` to the buyer and, if `tier_id` is set, makes the buyer a
/// sale agent of that tier.
#[derive(Debug, Clone, Serialize)]
pub struct Package {
    pub id: PackageId,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub voucher_count: u32,
    pub voucher_value: Money,
    pub voucher_min_order: Money,
    pub voucher_valid_days: u32,
    pub tier_id: Option<TierId>,
    pub sort_order: i32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated package fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDraft {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub price: Money,
    pub voucher_count: u32,
    pub voucher_value: Money,
    pub voucher_min_order: Money,
    pub voucher_valid_days: u32,
    pub tier_id: Option<TierId>,
    pub sort_order: i32,
    pub active: bool,
}

impl PackageDraft {
    fn validate(self) -> Result<Self, ValidationError> {
        let name = required_text(&self.name, "name")?;
        if self.voucher_valid_days == 0 {
            return Err(ValidationError::new("voucher_valid_days must be at least 1"));
        }
        if self.voucher_count > 0 && self.voucher_value.is_zero() {
            return Err(ValidationError::new(
                "voucher_value is required when the package issues vouchers",
            ));
        }
        let image_url = validate_optional_link(self.image_url, "image_url")?;
        Ok(Self {
            name,
            image_url,
            ..self
        })
    }
}

/// Package creation form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub image_url: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub voucher_count: u32,
    #[serde(default)]
    pub voucher_value: Money,
    #[serde(default)]
    pub voucher_min_order: Money,
    #[serde(default = "default_valid_days")]
    pub voucher_valid_days: u32,
    pub tier_id: Option<TierId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewPackage {
    /// Validate into a draft.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank name or inconsistent voucher settings.
    pub fn into_draft(self) -> Result<PackageDraft, ValidationError> {
        PackageDraft {
            name: self.name,
            description: self.description,
            image_url: self.image_url,
            price: self.price,
            voucher_count: self.voucher_count,
            voucher_value: self.voucher_value,
            voucher_min_order: self.voucher_min_order,
            voucher_valid_days: self.voucher_valid_days,
            tier_id: self.tier_id,
            sort_order: self.sort_order,
            active: self.active,
        }
        .validate()
    }
}

/// Partial package update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackagePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    pub price: Option<Money>,
    pub voucher_count: Option<u32>,
    pub voucher_value: Option<Money>,
    pub voucher_min_order: Option<Money>,
    pub voucher_valid_days: Option<u32>,
    #[serde(default, deserialize_with = "nullable")]
    pub tier_id: Option<Option<TierId>>,
    pub sort_order: Option<i32>,
    pub active: Option<bool>,
}

impl PackagePatch {
    /// Apply the patch to an existing package.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the merged package is invalid.
    pub fn apply(self, current: Package) -> Result<PackageDraft, ValidationError> {
        PackageDraft {
            name: self.name.unwrap_or(current.name),
            description: self.description.unwrap_or(current.description),
            image_url: self.image_url.unwrap_or(current.image_url),
            price: self.price.unwrap_or(current.price),
            voucher_count: self.voucher_count.unwrap_or(current.voucher_count),
            voucher_value: self.voucher_value.unwrap_or(current.voucher_value),
            voucher_min_order: self.voucher_min_order.unwrap_or(current.voucher_min_order),
            voucher_valid_days: self.voucher_valid_days.unwrap_or(current.voucher_valid_days),
            tier_id: self.tier_id.unwrap_or(current.tier_id),
            sort_order: self.sort_order.unwrap_or(current.sort_order),
            active: self.active.unwrap_or(current.active),
        }
        .validate()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_valid_days() -> u32 {
    30
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product() -> Product {
        let now = Utc::now();
        Product {
            id: ProductId::new(1),
            slug: "hat-dieu-rang-muoi".to_string(),
            name: "Hạt điều rang muối".to_string(),
            description: String::new(),
            category: "hat-dieu".to_string(),
            image_url: None,
            price: Money::from_dong(250_000),
            sale_price: Some(Money::from_dong(219_000)),
            weight_grams: 500,
            stock: 3,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_unit_price_prefers_sale_price() {
        let mut p = product();
        assert_eq!(p.unit_price(), Money::from_dong(219_000));
        p.sale_price = None;
        assert_eq!(p.unit_price(), Money::from_dong(250_000));
    }

    #[test]
    fn test_can_order_checks_stock_and_active() {
        let mut p = product();
        assert!(p.can_order(3));
        assert!(!p.can_order(4));
        assert!(!p.can_order(0));
        p.active = false;
        assert!(!p.can_order(1));
    }

    #[test]
    fn test_sale_price_must_be_lower() {
        let patch = ProductPatch {
            sale_price: Some(Some(Money::from_dong(250_000))),
            ..ProductPatch::default()
        };
        assert_eq!(
            patch.apply(product()).unwrap_err().to_string(),
            "sale_price must be lower than price"
        );

        let clear: ProductPatch = serde_json::from_str(r#"{"sale_price": null}"#).unwrap();
        assert_eq!(clear.apply(product()).unwrap().sale_price, None);
    }

    #[test]
    fn test_new_product_accepts_string_or_number_prices() {
        let p: NewProduct = serde_json::from_str(
            r#"{"name": "Hạnh nhân Mỹ", "price": "320000", "sale_price": 299000}"#,
        )
        .unwrap();
        let draft = p.into_draft().unwrap();
        assert_eq!(draft.slug, "hanh-nhan-my");
        assert_eq!(draft.price, Money::from_dong(320_000));
        assert_eq!(draft.sale_price, Some(Money::from_dong(299_000)));
    }

    #[test]
    fn test_package_requires_voucher_value() {
        let p: NewPackage =
            serde_json::from_str(r#"{"name": "Gói CTV", "price": "990000", "voucher_count": 5}"#)
                .unwrap();
        assert!(p.into_draft().is_err());
    }

    #[test]
    fn test_sort_order_by_is_static() {
        assert_eq!(ProductSort::default().order_by(), "created_at DESC, id DESC");
        let f: ProductFilter = serde_json::from_str(r#"{"sort": "price_asc"}"#).unwrap();
        assert_eq!(f.sort, ProductSort::PriceAsc);
    }
}
