//! Order models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use nutmart_core::{
    Email, Money, OrderId, OrderKind, OrderStatus, PackageId, PaymentMethod, Phone, ProductId,
    UserId,
};

use super::{ValidationError, required_text};

/// Where an order is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub province: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub ward: String,
    #[serde(default)]
    pub street: String,
}

impl ShippingAddress {
    /// Validate a delivery address: every part is required.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` naming the first blank part.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            province: required_text(&self.province, "province")?,
            district: required_text(&self.district, "district")?,
            ward: required_text(&self.ward, "ward")?,
            street: required_text(&self.street, "street")?,
        })
    }
}

/// An order header.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub code: String,
    pub kind: OrderKind,
    pub user_id: Option<UserId>,
    pub package_id: Option<PackageId>,
    pub contact_name: String,
    pub contact_phone: Phone,
    pub contact_email: Option<Email>,
    pub address: ShippingAddress,
    pub weight_grams: u32,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub discount: Money,
    pub total: Money,
    pub payment_method: PaymentMethod,
    pub note: String,
    pub voucher_code: Option<String>,
    pub referrer_id: Option<UserId>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line of an order, snapshotted at checkout.
#[derive(Debug, Clone, Serialize)]
pub struct OrderItem {
    pub product_id: Option<ProductId>,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub weight_grams: u32,
}

impl OrderItem {
    /// Price of the line.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity)
    }
}

/// One entry of an order's status history.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderStatusChange {
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub changed_by: Option<UserId>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

/// An order with its lines and history.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub history: Vec<OrderStatusChange>,
}

/// Admin order list filters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub kind: Option<OrderKind>,
    /// Matches the order code, contact name or phone.
    pub q: Option<String>,
    /// First day included (Vietnam date).
    pub from: Option<NaiveDate>,
    /// Last day included (Vietnam date).
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Admin status change request.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusChangeInput {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: String,
}

/// Order count in one status.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Back-office dashboard figures.
#[derive(Debug, Clone, Serialize)]
pub struct OrderStats {
    /// Orders per status, every status listed.
    pub by_status: Vec<StatusCount>,
    /// Orders completed this month (Vietnam time).
    pub month_completed: i64,
    /// Total of orders completed this month.
    pub month_revenue: Money,
    /// Withdrawals waiting for a decision.
    pub pending_withdrawals: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_address_requires_all_parts() {
        let address = ShippingAddress {
            province: "TP. Hồ Chí Minh".to_string(),
            district: "Quận 3".to_string(),
            ward: " ".to_string(),
            street: "12 Võ Văn Tần".to_string(),
        };
        assert_eq!(address.validate().unwrap_err().to_string(), "ward is required");
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            product_id: Some(ProductId::new(1)),
            name: "Hạt macca".to_string(),
            unit_price: Money::from_dong(180_000),
            quantity: 3,
            weight_grams: 250,
        };
        assert_eq!(item.line_total(), Money::from_dong(540_000));
    }
}
