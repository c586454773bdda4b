//! Sales Snapshot
//!
//! Everything that holds quota capacity at a point in time: orders, carts,
//! vouchers and the waiting list.

use jiff::Timestamp;
use serde::Deserialize;
use slotmap::{SlotMap, new_key_type};

use crate::{
    catalog::{ItemRef, SubeventKey},
    quotas::QuotaKey,
};

new_key_type! {
    /// Voucher Key
    pub struct VoucherKey;
}

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Paid
    Paid,

    /// Placed and awaiting payment
    Pending,

    /// Payment deadline passed
    Expired,

    /// Canceled
    Canceled,
}

/// A single ticket or product in an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPosition {
    /// Product
    pub target: ItemRef,

    /// Subevent
    pub subevent: Option<SubeventKey>,

    /// Canceled positions no longer hold capacity
    pub canceled: bool,
}

impl OrderPosition {
    /// A live position.
    pub const fn new(target: ItemRef, subevent: Option<SubeventKey>) -> Self {
        Self {
            target,
            subevent,
            canceled: false,
        }
    }
}

/// An order and its positions.
#[derive(Debug, Clone)]
pub struct Order {
    /// Status
    pub status: OrderStatus,

    /// Payment deadline of a pending order
    pub expires: Option<Timestamp>,

    /// Positions
    pub positions: Vec<OrderPosition>,
}

impl Order {
    /// Whether the order counts as paid.
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }

    /// Whether the order is pending and still within its payment deadline.
    pub fn is_pending_at(&self, now: Timestamp) -> bool {
        self.status == OrderStatus::Pending && self.expires.is_none_or(|expires| expires >= now)
    }

    /// Positions that still hold capacity.
    pub fn live_positions(&self) -> impl Iterator<Item = &OrderPosition> {
        self.positions.iter().filter(|position| !position.canceled)
    }
}

/// A time-limited hold on a product prior to checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartPosition {
    /// Product
    pub target: ItemRef,

    /// Subevent
    pub subevent: Option<SubeventKey>,

    /// End of the hold
    pub expires: Timestamp,

    /// Voucher redeemed in the cart
    pub voucher: Option<VoucherKey>,
}

impl CartPosition {
    /// Whether the hold is still active.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.expires >= now
    }
}

/// What a voucher is valid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherBinding {
    /// Any product in a quota
    Quota(QuotaKey),

    /// A single product
    Product(ItemRef),
}

/// A voucher; blocking vouchers hold quota before they are redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voucher {
    /// Products the voucher is valid for
    pub binding: VoucherBinding,

    /// Subevent the voucher is valid for
    pub subevent: Option<SubeventKey>,

    /// Whether the voucher reserves quota
    pub block_quota: bool,

    /// End of validity
    pub valid_until: Option<Timestamp>,

    /// Number of times the voucher can be redeemed
    pub max_usages: u32,

    /// Number of times the voucher has been redeemed
    pub redeemed: u32,
}

impl Voucher {
    /// Whether the voucher currently reserves quota.
    pub fn is_blocking_at(&self, now: Timestamp) -> bool {
        self.block_quota && self.valid_until.is_none_or(|until| until >= now)
    }

    /// Units held by the voucher at `now`.
    pub fn blocked_at(&self, now: Timestamp) -> u32 {
        if self.is_blocking_at(now) {
            self.max_usages.saturating_sub(self.redeemed)
        } else {
            0
        }
    }
}

/// A customer waiting for a product to become available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitingListEntry {
    /// Product
    pub target: ItemRef,

    /// Subevent
    pub subevent: Option<SubeventKey>,

    /// Whether a voucher was already sent, after which the voucher holds
    /// the capacity
    pub voucher_sent: bool,
}

/// Sales state at a point in time.
#[derive(Debug, Default)]
pub struct SalesSnapshot {
    /// Orders
    pub orders: Vec<Order>,

    /// Cart holds
    pub carts: Vec<CartPosition>,

    /// Vouchers
    pub vouchers: SlotMap<VoucherKey, Voucher>,

    /// Waiting list
    pub waiting_list: Vec<WaitingListEntry>,
}

impl SalesSnapshot {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a cart hold is covered by a voucher that already blocks quota.
    pub fn is_voucher_blocked(&self, cart: &CartPosition, now: Timestamp) -> bool {
        cart.voucher
            .and_then(|key| self.vouchers.get(key))
            .is_some_and(|voucher| voucher.is_blocking_at(now))
    }
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use testresult::TestResult;

    use crate::catalog::ItemKey;

    use super::*;

    fn voucher(now: Timestamp) -> Voucher {
        Voucher {
            binding: VoucherBinding::Product(ItemRef::item(ItemKey::default())),
            subevent: None,
            block_quota: true,
            valid_until: Some(now + 24.hours()),
            max_usages: 3,
            redeemed: 1,
        }
    }

    #[test]
    fn blocking_voucher_holds_unredeemed_usages() -> TestResult {
        let now: Timestamp = "2026-03-01T10:00:00Z".parse()?;
        let voucher = voucher(now);

        assert_eq!(voucher.blocked_at(now), 2);
        assert_eq!(voucher.blocked_at(now + 48.hours()), 0);
        assert_eq!(
            Voucher {
                block_quota: false,
                ..voucher
            }
            .blocked_at(now),
            0
        );
        assert_eq!(
            Voucher {
                redeemed: 5,
                ..voucher
            }
            .blocked_at(now),
            0
        );

        Ok(())
    }

    #[test]
    fn pending_orders_count_until_they_expire() -> TestResult {
        let now: Timestamp = "2026-03-01T10:00:00Z".parse()?;

        let order = Order {
            status: OrderStatus::Pending,
            expires: Some(now + 1.hour()),
            positions: Vec::new(),
        };

        assert!(order.is_pending_at(now));
        assert!(!order.is_pending_at(now + 2.hours()));
        assert!(!order.is_paid());

        Ok(())
    }

    #[test]
    fn cart_with_blocking_voucher_is_already_counted() -> TestResult {
        let now: Timestamp = "2026-03-01T10:00:00Z".parse()?;

        let mut snapshot = SalesSnapshot::new();
        let key = snapshot.vouchers.insert(voucher(now));

        let cart = CartPosition {
            target: ItemRef::item(ItemKey::default()),
            subevent: None,
            expires: now + 30.minutes(),
            voucher: Some(key),
        };

        assert!(snapshot.is_voucher_blocked(&cart, now));
        assert!(!snapshot.is_voucher_blocked(&CartPosition { voucher: None, ..cart }, now));

        Ok(())
    }
}
