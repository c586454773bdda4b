//! Boxoffice
//!
//! Boxoffice answers the two questions a ticket shop asks on every checkout:
//! how much of each quota is still for sale, and what does this cart cost once
//! automatic discounts are applied.
//!
//! Quotas are evaluated against a [`quotas::sales::SalesSnapshot`] of orders,
//! cart holds, blocking vouchers and the waiting list. Discounts are evaluated
//! against a list of [`positions::LineItem`]s in cart order.

pub mod catalog;
pub mod discounts;
pub mod fixtures;
pub mod positions;
pub mod prelude;
pub mod pricing;
pub mod quotas;
pub mod report;
