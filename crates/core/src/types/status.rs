//! Status and kind enums for various entities.
//!
//! With the `postgres` feature these map to the enum types created in the
//! `shop` schema by the API migrations.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Implements `Display` and `FromStr` using the snake_case wire names.
macro_rules! wire_names {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// The snake_case name used in JSON and in the database.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(format!(concat!("invalid ", $label, ": {}"), s)),
                }
            }
        }
    };
}

// =============================================================================
// Orders
// =============================================================================

/// Order lifecycle status.
///
/// Orders move forward through `pending → confirmed → shipping → completed`.
/// Only a `pending` order can be cancelled. `completed` and `cancelled` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Shipping,
    Completed,
    Cancelled,
}

/// An order status change that the lifecycle does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {from} to {to}")]
pub struct TransitionError {
    /// Current status.
    pub from: OrderStatus,
    /// Requested status.
    pub to: OrderStatus,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Shipping,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Statuses reachable from this one in a single step.
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [Self] {
        match self {
            Self::Pending => &[Self::Confirmed, Self::Cancelled],
            Self::Confirmed => &[Self::Shipping],
            Self::Shipping => &[Self::Completed],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    /// Whether the order can move directly to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Move to `next`, if allowed.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if `next` is not reachable in one step.
    pub fn transition(self, next: Self) -> Result<Self, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

wire_names!(OrderStatus, "order status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Shipping => "shipping",
    Completed => "completed",
    Cancelled => "cancelled",
});

/// What an order buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.order_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// Physical products, shipped.
    Product,
    /// A membership/voucher package, fulfilled by issuing vouchers.
    Package,
}

wire_names!(OrderKind, "order kind", {
    Product => "product",
    Package => "package",
});

/// How the customer pays. Collection happens outside the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.payment_method", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery.
    #[default]
    Cod,
    /// Bank transfer before shipping.
    BankTransfer,
}

wire_names!(PaymentMethod, "payment method", {
    Cod => "cod",
    BankTransfer => "bank_transfer",
});

// =============================================================================
// Users
// =============================================================================

/// User role across the three portals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Storefront customer.
    #[default]
    Customer,
    /// Sale agent or collaborator; earns commission on referred orders.
    Sale,
    /// Back-office administrator.
    Admin,
}

impl UserRole {
    /// Whether this role may use the agent dashboard.
    #[must_use]
    pub const fn is_agent(self) -> bool {
        matches!(self, Self::Sale)
    }
}

wire_names!(UserRole, "user role", {
    Customer => "customer",
    Sale => "sale",
    Admin => "admin",
});

// =============================================================================
// Content
// =============================================================================

/// Blog post publication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.blog_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BlogStatus {
    #[default]
    Draft,
    Published,
}

wire_names!(BlogStatus, "blog status", {
    Draft => "draft",
    Published => "published",
});

/// Where a banner is displayed on the storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.banner_position", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum BannerPosition {
    #[default]
    HomeHero,
    HomeMiddle,
    Sidebar,
    Popup,
}

wire_names!(BannerPosition, "banner position", {
    HomeHero => "home_hero",
    HomeMiddle => "home_middle",
    Sidebar => "sidebar",
    Popup => "popup",
});

// =============================================================================
// Affiliate
// =============================================================================

/// Why a commission entry was earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.commission_kind", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    /// The agent whose referral code was used.
    Direct,
    /// The manager of that agent (rate differential).
    Rollup,
}

wire_names!(CommissionKind, "commission kind", {
    Direct => "direct",
    Rollup => "rollup",
});

/// Commission entry status; follows the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.commission_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    /// Order not yet completed.
    #[default]
    Pending,
    /// Added to the beneficiary's wallet.
    Credited,
    /// Order cancelled.
    Void,
}

wire_names!(CommissionStatus, "commission status", {
    Pending => "pending",
    Credited => "credited",
    Void => "void",
});

/// Withdrawal request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.withdrawal_status", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

wire_names!(WithdrawalStatus, "withdrawal status", {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

/// How a voucher came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "shop.voucher_source", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum VoucherSource {
    /// Issued when a package order completed.
    Package,
    /// Issued by a voucher reward rule.
    Reward,
    /// Issued manually from the back-office.
    Admin,
}

wire_names!(VoucherSource, "voucher source", {
    Package => "package",
    Reward => "reward",
    Admin => "admin",
});

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Shipping));
        assert!(Shipping.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Cancelled));
    }

    #[test]
    fn test_illegal_transitions() {
        use OrderStatus::*;
        // skipping steps
        assert!(!Pending.can_transition_to(Shipping));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Confirmed.can_transition_to(Completed));
        // going backwards
        assert!(!Shipping.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Pending));
        // cancelling after confirmation
        assert!(!Confirmed.can_transition_to(Cancelled));
        assert!(!Shipping.can_transition_to(Cancelled));
        // self loops
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status), "{status} -> {status}");
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.is_terminal(),
                status.allowed_transitions().is_empty(),
                "{status}"
            );
        }
    }

    #[test]
    fn test_transition_error() {
        let err = OrderStatus::Completed
            .transition(OrderStatus::Cancelled)
            .unwrap_err();
        assert_eq!(err.from, OrderStatus::Completed);
        assert_eq!(err.to, OrderStatus::Cancelled);
        assert_eq!(err.to_string(), "cannot move order from completed to cancelled");
        assert_eq!(
            OrderStatus::Pending.transition(OrderStatus::Confirmed),
            Ok(OrderStatus::Confirmed)
        );
    }

    #[test]
    fn test_wire_names_round_trip_through_from_str() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert_eq!("sale".parse::<UserRole>().unwrap(), UserRole::Sale);
        assert!("manager".parse::<UserRole>().is_err());
        assert_eq!(
            serde_json::to_string(&PaymentMethod::BankTransfer).unwrap(),
            "\"bank_transfer\""
        );
        assert_eq!(
            serde_json::to_string(&BannerPosition::HomeHero).unwrap(),
            "\"home_hero\""
        );
    }
}
