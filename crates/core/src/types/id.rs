//! Database IDs.
//!
//! Every table has a `SERIAL` key. Each gets its own wrapper so a
//! `ProductId` cannot be passed where an `OrderId` is expected, even though
//! both are `i32` on the wire and in `PostgreSQL`.

/// Define one or more `i32` ID newtypes.
///
/// Each type serializes as a bare number, displays as the number, converts
/// to and from `i32`, and (with the `postgres` feature) binds as `INTEGER`.
///
/// ```rust
/// # use nutmart_core::define_id;
/// define_id! {
///     /// A warehouse.
///     WarehouseId,
///     /// A shelf in a warehouse.
///     ShelfId,
/// }
///
/// let shelf = ShelfId::new(3);
/// assert_eq!(shelf.to_string(), "3");
/// ```
#[macro_export]
macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),+ $(,)?) => {$(
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        #[cfg_attr(feature = "postgres", derive(::sqlx::Type))]
        #[cfg_attr(feature = "postgres", sqlx(transparent))]
        pub struct $name(i32);

        impl $name {
            /// Wrap a raw key.
            #[must_use]
            pub const fn new(id: i32) -> Self {
                Self(id)
            }

            /// The raw key, for binding arrays of IDs.
            #[must_use]
            pub const fn as_i32(&self) -> i32 {
                self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::convert::From<i32> for $name {
            fn from(id: i32) -> Self {
                Self(id)
            }
        }

        impl ::core::convert::From<$name> for i32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    )+};
}

define_id! {
    /// A customer, sale agent or admin account.
    UserId,
    ProductId,
    /// A membership/voucher package.
    PackageId,
    OrderId,
    BannerId,
    BlogId,
    EventId,
    ShippingZoneId,
    VoucherId,
    /// A monthly sales reward rule.
    VoucherRuleId,
    /// A commission tier.
    TierId,
    /// A row of the commission ledger.
    CommissionEntryId,
    WithdrawalId,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let id = OrderId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: OrderId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, id);
        assert!(serde_json::from_str::<OrderId>("\"42\"").is_err());
    }

    #[test]
    fn test_id_display_and_conversion() {
        let id = UserId::from(7);
        assert_eq!(id.to_string(), "7");
        assert_eq!(format!("{id:>3}"), "  7");
        assert_eq!(i32::from(id), 7);
        assert_eq!(id.as_i32(), 7);
    }

    #[test]
    fn test_ids_order_numerically() {
        let mut ids = vec![TierId::new(3), TierId::new(1), TierId::new(2)];
        ids.sort();
        assert_eq!(ids, [TierId::new(1), TierId::new(2), TierId::new(3)]);
    }
}
