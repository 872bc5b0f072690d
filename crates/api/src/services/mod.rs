//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration and password login
//! - `checkout` - Product and package orders
//! - `lifecycle` - Order status changes, payouts and rewards
//! - `affiliate` - Agent dashboard, collaborators, withdrawals, user admin
//! - `shipping` - Cached shipping table and zone administration
//! - `markdown` - Blog rendering

pub mod affiliate;
pub mod auth;
pub mod checkout;
pub mod lifecycle;
pub mod markdown;
pub mod shipping;
