//! Checkout: turning a cart or a package into a pending order.
//!
//! Everything an order touches is written in one transaction: the order and
//! its lines, the first history entry, stock, the redeemed voucher and the
//! pending commission entries. Products are locked in ID order before stock
//! is checked.

use chrono::Utc;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use thiserror::Error;
use tracing::{info, instrument};

use nutmart_core::codes::order_code;
use nutmart_core::commission::{self, AgentRates, CommissionPlan};
use nutmart_core::shipping::{ShippingError, ShippingQuote};
use nutmart_core::voucher::{VoucherError, vietnam_date};
use nutmart_core::{
    Email, EmailError, Money, OrderKind, PackageId, PaymentMethod, Phone, PhoneError, ProductId,
    ReferralCode, UserId,
};

use super::shipping::{ShippingCache, ShippingServiceError};
use crate::config::ShopSettings;
use crate::db::RepositoryError;
use crate::db::commissions::insert_plan;
use crate::db::orders::{NewOrderRecord, insert_items, insert_order};
use crate::db::packages::get_package;
use crate::db::products::{ProductRepository, decrement_stock, lock_for_checkout};
use crate::db::users::{UserRepository, load_agent, referred_by};
use crate::db::vouchers::{lock_by_code, mark_used};
use crate::models::catalog::Product;
use crate::models::order::{Order, OrderItem, ShippingAddress};
use crate::models::shipping::QuoteRequest;
use crate::models::{ValidationError, optional_text, required_text};

/// Errors that can occur while placing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A form field is missing or malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Contact phone is not a Vietnamese phone number.
    #[error("invalid phone: {0}")]
    InvalidPhone(#[from] PhoneError),

    /// Contact email is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// No lines in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A product was deleted or deactivated.
    #[error("product {0} is no longer available")]
    ProductUnavailable(ProductId),

    /// Not enough stock for a line.
    #[error("only {available} left of {name}")]
    InsufficientStock { name: String, available: u32 },

    /// The package was deleted or deactivated.
    #[error("package is no longer available")]
    PackageUnavailable,

    /// The delivery province cannot be served.
    #[error(transparent)]
    Shipping(#[from] ShippingError),

    /// The shipping table could not be loaded.
    #[error(transparent)]
    ShippingTable(#[from] ShippingServiceError),

    /// The voucher cannot be used for this order.
    #[error(transparent)]
    Voucher(#[from] VoucherError),

    /// No voucher has the given code.
    #[error("unknown voucher code")]
    UnknownVoucher,

    /// A typed referral code belongs to no active agent.
    #[error("unknown referral code")]
    UnknownReferralCode,

    /// Database operation failed.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CheckoutError {
    /// Whether the error is the customer's to fix (as opposed to ours).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        !matches!(self, Self::ShippingTable(_) | Self::Repository(_))
    }
}

/// One cart line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Product checkout form.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub items: Vec<CartLine>,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub address: ShippingAddress,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: String,
    pub voucher_code: Option<String>,
    pub referral_code: Option<String>,
}

/// Package checkout form.
///
/// Packages are not shipped, so the address is optional.
#[derive(Debug, Clone, Deserialize)]
pub struct PackageCheckoutInput {
    pub package_id: PackageId,
    pub contact_name: String,
    pub contact_phone: String,
    pub contact_email: Option<String>,
    pub address: Option<ShippingAddress>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub note: String,
    pub referral_code: Option<String>,
}

/// Who is checking out.
#[derive(Debug, Clone, Default)]
pub struct Buyer {
    /// Logged-in user, if any.
    pub user_id: Option<UserId>,
    /// Referral code captured from a `?ref=` link earlier in the session.
    pub link_code: Option<ReferralCode>,
}

/// Validated contact details.
struct Contact {
    name: String,
    phone: Phone,
    email: Option<Email>,
}

impl Contact {
    fn parse(name: &str, phone: &str, email: Option<String>) -> Result<Self, CheckoutError> {
        Ok(Self {
            name: required_text(name, "contact_name")?,
            phone: Phone::parse(phone)?,
            email: optional_text(email).as_deref().map(Email::parse).transpose()?,
        })
    }
}

/// Merge duplicate lines, keeping cart order.
///
/// # Errors
///
/// Returns `CheckoutError::EmptyCart` for no lines and
/// `CheckoutError::Validation` for a zero quantity.
pub fn merge_lines(lines: &[CartLine]) -> Result<Vec<CartLine>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity == 0 {
            return Err(ValidationError::new("quantity must be at least 1").into());
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

/// Snapshot cart lines against the catalog.
///
/// `products` must hold every product still for sale; a missing or inactive
/// product fails the whole cart.
fn build_items(lines: &[CartLine], products: &[Product]) -> Result<Vec<OrderItem>, CheckoutError> {
    lines
        .iter()
        .map(|line| {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id && p.active)
                .ok_or(CheckoutError::ProductUnavailable(line.product_id))?;
            if !product.can_order(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    name: product.name.clone(),
                    available: product.stock,
                });
            }
            Ok(OrderItem {
                product_id: Some(product.id),
                name: product.name.clone(),
                unit_price: product.unit_price(),
                quantity: line.quantity,
                weight_grams: product.weight_grams,
            })
        })
        .collect()
}

/// Parcel weight and merchandise subtotal of the lines.
fn totals(items: &[OrderItem]) -> (u32, Money) {
    let weight = items.iter().fold(0_u32, |acc, item| {
        acc.saturating_add(item.weight_grams.saturating_mul(item.quantity))
    });
    let subtotal = items.iter().map(OrderItem::line_total).sum();
    (weight, subtotal)
}

/// Checkout service.
pub struct CheckoutService<'a> {
    pool: &'a PgPool,
    shipping: &'a ShippingCache,
    shop: &'a ShopSettings,
}

impl<'a> CheckoutService<'a> {
    /// Create a new checkout service.
    #[must_use]
    pub const fn new(pool: &'a PgPool, shipping: &'a ShippingCache, shop: &'a ShopSettings) -> Self {
        Self {
            pool,
            shipping,
            shop,
        }
    }

    /// Quote shipping for a province and either a weight or cart lines.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::Shipping` if the province cannot be served,
    /// or a validation error if neither weight nor lines are given.
    pub async fn quote(&self, request: &QuoteRequest) -> Result<ShippingQuote, CheckoutError> {
        let province = required_text(&request.province, "province")?;

        let (weight, cart_subtotal) = if request.items.is_empty() {
            let weight = request
                .weight_grams
                .ok_or_else(|| ValidationError::new("weight_grams or items is required"))?;
            (weight, Money::ZERO)
        } else {
            let lines = merge_lines(&request.items)?;
            let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
            let products = ProductRepository::new(self.pool).get_active(&ids).await?;
            totals(&build_items(&lines, &products)?)
        };
        let subtotal = request.subtotal.unwrap_or(cart_subtotal);

        let table = self.shipping.table(self.pool).await?;
        Ok(table.quote(&province, weight, subtotal)?)
    }

    /// Place a product order.
    ///
    /// # Errors
    ///
    /// Returns a `CheckoutError` describing the first problem found; nothing
    /// is written in that case.
    #[instrument(skip(self, input, buyer), fields(user_id = ?buyer.user_id))]
    pub async fn place_order(
        &self,
        input: CheckoutInput,
        buyer: &Buyer,
    ) -> Result<Order, CheckoutError> {
        let contact = Contact::parse(&input.contact_name, &input.contact_phone, input.contact_email)?;
        let address = input.address.validate()?;
        let lines = merge_lines(&input.items)?;
        let typed_referrer = self.resolve_typed_code(input.referral_code).await?;
        let link_referrer = self.resolve_link_code(buyer.link_code.as_ref()).await?;
        let table = self.shipping.table(self.pool).await?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = lock_for_checkout(&mut *tx, &ids).await?;
        let items = build_items(&lines, &products)?;
        let (weight, subtotal) = totals(&items);

        let quote = table.quote(&address.province, weight, subtotal)?;

        let voucher_code = optional_text(input.voucher_code).map(|c| c.to_uppercase());
        let (voucher, discount) = match voucher_code.as_deref() {
            Some(code) => {
                let voucher = lock_by_code(&mut *tx, code)
                    .await?
                    .ok_or(CheckoutError::UnknownVoucher)?;
                let discount = voucher.apply(buyer.user_id, subtotal, now)?;
                (Some(voucher), discount)
            }
            None => (None, Money::ZERO),
        };

        let referrer = match typed_referrer.or(link_referrer) {
            Some(agent) => Some(agent),
            None => match buyer.user_id {
                Some(user) => referred_by(&mut *tx, user).await?,
                None => None,
            },
        }
        .filter(|agent| Some(*agent) != buyer.user_id);

        let base = commission::commission_base(subtotal, discount);
        let (referrer, plan) = self.plan_commissions(&mut *tx, referrer, buyer, base).await?;

        let code = order_code(&mut rand::rng(), vietnam_date(now));
        let order = insert_order(
            &mut *tx,
            &NewOrderRecord {
                code,
                kind: OrderKind::Product,
                user_id: buyer.user_id,
                package_id: None,
                contact_name: contact.name,
                contact_phone: contact.phone,
                contact_email: contact.email,
                address,
                weight_grams: weight,
                subtotal,
                shipping_fee: quote.fee,
                discount,
                total: subtotal.saturating_sub(discount) + quote.fee,
                payment_method: input.payment_method,
                note: input.note.trim().to_owned(),
                voucher_code: voucher.as_ref().map(|v| v.code.clone()),
                referrer_id: referrer,
            },
        )
        .await?;

        insert_items(&mut *tx, order.id, &items).await?;
        for item in &items {
            let Some(product_id) = item.product_id else {
                continue;
            };
            if !decrement_stock(&mut *tx, product_id, item.quantity).await? {
                return Err(CheckoutError::InsufficientStock {
                    name: item.name.clone(),
                    available: 0,
                });
            }
        }
        if let Some(voucher) = &voucher
            && !mark_used(&mut *tx, voucher.id, order.id).await?
        {
            return Err(VoucherError::AlreadyUsed.into());
        }
        insert_plan(&mut *tx, order.id, &plan).await?;

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            order_id = %order.id,
            code = %order.code,
            total = %order.total,
            referrer_id = ?order.referrer_id,
            "Order placed"
        );
        Ok(order)
    }

    /// Place a package order. Packages are paid like products but carry no
    /// shipping and take no voucher.
    ///
    /// # Errors
    ///
    /// Returns `CheckoutError::PackageUnavailable` if the package is gone or
    /// inactive.
    #[instrument(skip(self, input), fields(package_id = %input.package_id))]
    pub async fn place_package_order(
        &self,
        input: PackageCheckoutInput,
        buyer: UserId,
        link_code: Option<&ReferralCode>,
    ) -> Result<Order, CheckoutError> {
        let contact = Contact::parse(&input.contact_name, &input.contact_phone, input.contact_email)?;
        let address = input
            .address
            .filter(|a| a != &ShippingAddress::default())
            .map(ShippingAddress::validate)
            .transpose()?
            .unwrap_or_default();
        let typed_referrer = self.resolve_typed_code(input.referral_code).await?;
        let link_referrer = self.resolve_link_code(link_code).await?;
        let now = Utc::now();

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let package = match get_package(&mut *tx, input.package_id).await {
            Ok(package) if package.active => package,
            Ok(_) | Err(RepositoryError::NotFound) => return Err(CheckoutError::PackageUnavailable),
            Err(e) => return Err(e.into()),
        };

        let referrer = match typed_referrer.or(link_referrer) {
            Some(agent) => Some(agent),
            None => referred_by(&mut *tx, buyer).await?,
        }
        .filter(|agent| *agent != buyer);

        let buyer_info = Buyer {
            user_id: Some(buyer),
            link_code: None,
        };
        let (referrer, plan) = self
            .plan_commissions(&mut *tx, referrer, &buyer_info, package.price)
            .await?;

        let code = order_code(&mut rand::rng(), vietnam_date(now));
        let order = insert_order(
            &mut *tx,
            &NewOrderRecord {
                code,
                kind: OrderKind::Package,
                user_id: Some(buyer),
                package_id: Some(package.id),
                contact_name: contact.name,
                contact_phone: contact.phone,
                contact_email: contact.email,
                address,
                weight_grams: 0,
                subtotal: package.price,
                shipping_fee: Money::ZERO,
                discount: Money::ZERO,
                total: package.price,
                payment_method: input.payment_method,
                note: input.note.trim().to_owned(),
                voucher_code: None,
                referrer_id: referrer,
            },
        )
        .await?;

        insert_items(
            &mut *tx,
            order.id,
            &[OrderItem {
                product_id: None,
                name: package.name.clone(),
                unit_price: package.price,
                quantity: 1,
                weight_grams: 0,
            }],
        )
        .await?;
        insert_plan(&mut *tx, order.id, &plan).await?;

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            order_id = %order.id,
            code = %order.code,
            package = %package.name,
            "Package order placed"
        );
        Ok(order)
    }

    /// Agent behind a code typed at checkout. An unknown code is an error.
    async fn resolve_typed_code(
        &self,
        code: Option<String>,
    ) -> Result<Option<UserId>, CheckoutError> {
        let Some(code) = optional_text(code) else {
            return Ok(None);
        };
        let code = ReferralCode::parse(&code).map_err(|_| CheckoutError::UnknownReferralCode)?;
        let agent = UserRepository::new(self.pool)
            .get_agent_by_referral_code(&code)
            .await?
            .ok_or(CheckoutError::UnknownReferralCode)?;
        Ok(Some(agent.id))
    }

    /// Agent behind a link code. An unknown or stale code is ignored.
    async fn resolve_link_code(
        &self,
        code: Option<&ReferralCode>,
    ) -> Result<Option<UserId>, CheckoutError> {
        let Some(code) = code else {
            return Ok(None);
        };
        let agent = UserRepository::new(self.pool)
            .get_agent_by_referral_code(code)
            .await?;
        Ok(agent.map(|a| a.id))
    }

    /// Commission plan for a referred order. Returns the referrer kept on the
    /// order, which is dropped if they are no longer an active agent.
    async fn plan_commissions(
        &self,
        conn: &mut PgConnection,
        referrer: Option<UserId>,
        buyer: &Buyer,
        base: Money,
    ) -> Result<(Option<UserId>, CommissionPlan), CheckoutError> {
        let Some(referrer) = referrer else {
            return Ok((None, CommissionPlan::default()));
        };
        let Some(seller) = load_agent(conn, referrer)
            .await?
            .filter(|a| a.is_active_agent())
        else {
            return Ok((None, CommissionPlan::default()));
        };

        let manager: Option<AgentRates> = match seller.manager_id {
            Some(manager_id) => load_agent(conn, manager_id)
                .await?
                .filter(|m| m.is_active_agent())
                .map(|m| m.rates),
            None => None,
        };

        let plan = commission::plan(
            base,
            buyer.user_id,
            &seller.rates,
            manager.as_ref(),
            self.shop.default_commission_rate,
        );
        Ok((Some(referrer), plan))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn line(id: i32, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(id),
            quantity,
        }
    }

    fn product(id: i32, price: i64, weight: u32, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            slug: format!("san-pham-{id}"),
            name: format!("Sản phẩm {id}"),
            description: String::new(),
            category: "hat".to_string(),
            image_url: None,
            price: Money::from_dong(price),
            sale_price: None,
            weight_grams: weight,
            stock,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let merged = merge_lines(&[line(2, 1), line(1, 2), line(2, 3)]).unwrap();
        assert_eq!(merged, vec![line(2, 4), line(1, 2)]);
    }

    #[test]
    fn test_merge_lines_rejects_empty_and_zero() {
        assert!(matches!(merge_lines(&[]), Err(CheckoutError::EmptyCart)));
        assert!(matches!(
            merge_lines(&[line(1, 0)]),
            Err(CheckoutError::Validation(_))
        ));
    }

    #[test]
    fn test_build_items_snapshots_price_and_weight() {
        let mut cashew = product(1, 250_000, 500, 10);
        cashew.sale_price = Some(Money::from_dong(220_000));
        let macadamia = product(2, 180_000, 250, 5);

        let items = build_items(&[line(1, 2), line(2, 1)], &[macadamia, cashew]).unwrap();
        assert_eq!(items[0].unit_price, Money::from_dong(220_000));

        let (weight, subtotal) = totals(&items);
        assert_eq!(weight, 1_250);
        assert_eq!(subtotal, Money::from_dong(620_000));
    }

    #[test]
    fn test_build_items_checks_stock_and_availability() {
        let products = [product(1, 100_000, 500, 2)];
        assert!(matches!(
            build_items(&[line(1, 3)], &products),
            Err(CheckoutError::InsufficientStock { available: 2, .. })
        ));
        assert!(matches!(
            build_items(&[line(9, 1)], &products),
            Err(CheckoutError::ProductUnavailable(id)) if id == ProductId::new(9)
        ));

        let mut hidden = product(1, 100_000, 500, 2);
        hidden.active = false;
        assert!(matches!(
            build_items(&[line(1, 1)], &[hidden]),
            Err(CheckoutError::ProductUnavailable(_))
        ));
    }

    #[test]
    fn test_contact_validation() {
        assert!(matches!(
            Contact::parse(" ", "0901234567", None),
            Err(CheckoutError::Validation(_))
        ));
        assert!(matches!(
            Contact::parse("Lan", "12", None),
            Err(CheckoutError::InvalidPhone(_))
        ));
        assert!(matches!(
            Contact::parse("Lan", "0901234567", Some("not-an-email".into())),
            Err(CheckoutError::InvalidEmail(_))
        ));
        let contact = Contact::parse("Lan", "0901234567", Some("  ".into())).unwrap();
        assert!(contact.email.is_none());
    }

    #[test]
    fn test_client_errors() {
        assert!(CheckoutError::EmptyCart.is_client_error());
        assert!(!CheckoutError::Repository(RepositoryError::NotFound).is_client_error());
    }
}
