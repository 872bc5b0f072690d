//! Domain models for the API.
//!
//! Read models are what handlers return as JSON. Input models (`New*`,
//! `*Patch`) are what handlers accept; they validate into `*Draft` values
//! that the repositories write as a whole row.

pub mod affiliate;
pub mod catalog;
pub mod content;
pub mod order;
pub mod session;
pub mod shipping;
pub mod user;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub use affiliate::{
    AgentDashboard, AttachCollaboratorInput, Collaborator, CommissionEntry, IssueVoucherInput,
    NewRewardRule, NewWithdrawal, RewardRuleDraft, RewardRulePatch, TierDraft, TierPatch,
    Withdrawal, WithdrawalDecision,
};
pub use catalog::{
    NewPackage, NewProduct, Package, PackageDraft, PackagePatch, Product, ProductDraft,
    ProductFilter, ProductPatch, ProductSort,
};
pub use content::{
    Banner, BannerDraft, BannerPatch, Blog, BlogDraft, BlogPage, BlogPatch, Event, EventDraft,
    EventPatch, NewBanner, NewBlog, NewEvent,
};
pub use order::{
    Order, OrderDetail, OrderFilter, OrderItem, OrderStats, OrderStatusChange, ShippingAddress,
    StatusChangeInput, StatusCount,
};
pub use session::{CurrentUser, keys as session_keys};
pub use shipping::{QuoteRequest, ShippingConfig, ShippingSettingsInput, ZoneDraft, ZoneInput};
pub use user::{User, UserCredentials, UserFilter, UserPatch};

/// A form field that failed validation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Trim a required text field.
pub(crate) fn required_text(value: &str, field: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

/// Trim an optional text field, treating blank as absent.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Check an absolute `http(s)` URL or a site-relative path.
pub(crate) fn validate_link(value: &str, field: &str) -> Result<String, ValidationError> {
    let value = required_text(value, field)?;
    if value.starts_with('/') && !value.starts_with("//") {
        return Ok(value);
    }
    match url::Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(value),
        _ => Err(ValidationError::new(format!(
            "{field} must be an http(s) URL or a path starting with /"
        ))),
    }
}

/// Check an optional link, treating blank as absent.
pub(crate) fn validate_optional_link(
    value: Option<String>,
    field: &str,
) -> Result<Option<String>, ValidationError> {
    optional_text(value)
        .map(|v| validate_link(&v, field))
        .transpose()
}

/// Deserialize a field that distinguishes "absent" from `null`.
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent leaves the value unchanged, `null` clears it.
pub(crate) fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
