//! Shop rules shared by the Nutmart API and CLI.
//!
//! Every decision about money lives here as a pure function over plain
//! values: which zone a province falls in and what a parcel costs to ship,
//! which commission rate applies to an agent and how much rolls up to their
//! manager, and what a voucher takes off a cart. Nothing in this crate talks
//! to the database or the network, so all of it is unit tested directly.
//!
//! [`types`] holds the newtypes the rest of the workspace passes around
//! (IDs, [`Money`], [`Rate`], [`Email`], phone numbers and statuses), and
//! [`text`] folds Vietnamese diacritics for slugs and province matching.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod codes;
pub mod commission;
pub mod shipping;
pub mod text;
pub mod types;
pub mod voucher;

pub use codes::ReferralCode;
pub use types::*;
