//! Quota Availability
//!
//! Batched availability calculation: queue the quotas of interest, make one
//! pass over a [`SalesSnapshot`] and read the results.

use jiff::Timestamp;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::{
    catalog::{ItemKey, ItemRef, SubeventKey, VariationKey},
    quotas::{
        Availability, Quota, QuotaError, QuotaKey, QuotaSet, QuotaStatus,
        check::QuotaCache,
        sales::{SalesSnapshot, VoucherBinding},
    },
};

/// Units counted against a quota, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaCounts {
    /// Positions in paid orders
    pub paid: u32,

    /// Positions in pending orders within their payment deadline
    pub pending: u32,

    /// Unredeemed usages of blocking vouchers
    pub vouchers: u32,

    /// Active cart holds not already covered by a blocking voucher
    pub carts: u32,

    /// Waiting list entries without a voucher
    pub waiting_list: u32,
}

/// Product part of the coverage index. Variations are only covered through
/// their variation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Product {
    Item(ItemKey),
    Variation(VariationKey),
}

impl From<ItemRef> for Product {
    fn from(target: ItemRef) -> Self {
        match target.variation {
            Some(variation) => Product::Variation(variation),
            None => Product::Item(target.item),
        }
    }
}

type CoverageIndex = FxHashMap<(Product, Option<SubeventKey>), SmallVec<[QuotaKey; 2]>>;

/// Batched quota availability calculation.
#[derive(Debug)]
pub struct QuotaAvailability<'q> {
    quotas: &'q QuotaSet,
    queued: Vec<QuotaKey>,
    queued_keys: FxHashSet<QuotaKey>,
    count_waiting_list: bool,
    ignore_closed: bool,
    counts: FxHashMap<QuotaKey, QuotaCounts>,
    results: FxHashMap<QuotaKey, Availability>,
}

impl<'q> QuotaAvailability<'q> {
    /// New calculation over a quota set.
    pub fn new(quotas: &'q QuotaSet) -> Self {
        Self {
            quotas,
            queued: Vec::new(),
            queued_keys: FxHashSet::default(),
            count_waiting_list: false,
            ignore_closed: false,
            counts: FxHashMap::default(),
            results: FxHashMap::default(),
        }
    }

    /// Also count waiting list demand against the quotas.
    #[must_use]
    pub fn with_count_waiting_list(mut self, count_waiting_list: bool) -> Self {
        self.count_waiting_list = count_waiting_list;
        self
    }

    /// Compute closed quotas as if they were open.
    #[must_use]
    pub fn with_ignore_closed(mut self, ignore_closed: bool) -> Self {
        self.ignore_closed = ignore_closed;
        self
    }

    /// Queue a quota for the next [`compute`](Self::compute).
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::UnknownQuota`] for a key not in the quota set.
    pub fn queue(&mut self, key: QuotaKey) -> Result<(), QuotaError> {
        self.quotas.try_get(key)?;
        self.push_queued(key);

        Ok(())
    }

    /// Queue every quota in the set.
    pub fn queue_all(&mut self) {
        for key in self.quotas.keys() {
            self.push_queued(key);
        }
    }

    /// Keep queue order, ignoring keys already queued.
    fn push_queued(&mut self, key: QuotaKey) {
        if self.queued_keys.insert(key) {
            self.queued.push(key);
        }
    }

    /// Compute availability of all queued quotas.
    ///
    /// Makes a single pass over the snapshot. Computing again replaces
    /// earlier results, so the same snapshot and `now` give the same results.
    pub fn compute(&mut self, snapshot: &SalesSnapshot, now: Timestamp) {
        let index = self.coverage_index();

        self.counts = self
            .queued
            .iter()
            .map(|key| (*key, QuotaCounts::default()))
            .collect();

        for order in &snapshot.orders {
            let paid = order.is_paid();

            if !paid && !order.is_pending_at(now) {
                continue;
            }

            for position in order.live_positions() {
                self.count(&index, position.target, position.subevent, |counts| {
                    if paid {
                        counts.paid = counts.paid.saturating_add(1);
                    } else {
                        counts.pending = counts.pending.saturating_add(1);
                    }
                });
            }
        }

        for voucher in snapshot.vouchers.values() {
            let blocked = voucher.blocked_at(now);

            if blocked == 0 {
                continue;
            }

            let add = |counts: &mut QuotaCounts| {
                counts.vouchers = counts.vouchers.saturating_add(blocked);
            };

            match voucher.binding {
                VoucherBinding::Quota(key) => {
                    if let Some(counts) = self.counts.get_mut(&key) {
                        add(counts);
                    }
                }
                VoucherBinding::Product(target) => {
                    self.count(&index, target, voucher.subevent, add);
                }
            }
        }

        for cart in &snapshot.carts {
            if !cart.is_active_at(now) || snapshot.is_voucher_blocked(cart, now) {
                continue;
            }

            self.count(&index, cart.target, cart.subevent, |counts| {
                counts.carts = counts.carts.saturating_add(1);
            });
        }

        if self.count_waiting_list {
            for entry in &snapshot.waiting_list {
                if entry.voucher_sent {
                    continue;
                }

                self.count(&index, entry.target, entry.subevent, |counts| {
                    counts.waiting_list = counts.waiting_list.saturating_add(1);
                });
            }
        }

        let mut results = FxHashMap::default();

        for key in &self.queued {
            let (Some(quota), Some(counts)) = (self.quotas.get(*key), self.counts.get(key)) else {
                continue;
            };

            let availability = self.evaluate(quota, counts);

            debug!(
                quota = quota.name.as_str(),
                status = %availability.status,
                remaining = ?availability.remaining,
                "computed quota availability"
            );

            results.insert(*key, availability);
        }

        self.results = results;
    }

    /// Index of queued quotas by the products and subevent they cover.
    fn coverage_index(&self) -> CoverageIndex {
        let mut index = CoverageIndex::default();

        for key in &self.queued {
            let Some(quota) = self.quotas.get(*key) else {
                continue;
            };

            let products = quota
                .items
                .iter()
                .map(|item| Product::Item(*item))
                .chain(quota.variations.iter().map(|v| Product::Variation(*v)));

            for product in products {
                index
                    .entry((product, quota.subevent))
                    .or_default()
                    .push(*key);
            }
        }

        index
    }

    fn count(
        &mut self,
        index: &CoverageIndex,
        target: ItemRef,
        subevent: Option<SubeventKey>,
        add: impl Fn(&mut QuotaCounts),
    ) {
        let Some(keys) = index.get(&(Product::from(target), subevent)) else {
            return;
        };

        for key in keys {
            if let Some(counts) = self.counts.get_mut(key) {
                add(counts);
            }
        }
    }

    /// Subtract the counts stage by stage; the first stage to use up the
    /// quota decides the status.
    fn evaluate(&self, quota: &Quota, counts: &QuotaCounts) -> Availability {
        if quota.closed && !self.ignore_closed {
            return Availability::gone();
        }

        let Some(size) = quota.size else {
            return Availability::unlimited();
        };

        let mut stages = vec![
            (QuotaStatus::Gone, counts.paid),
            (
                QuotaStatus::Ordered,
                counts.pending.saturating_add(counts.vouchers),
            ),
            (QuotaStatus::Reserved, counts.carts),
        ];

        if self.count_waiting_list {
            stages.push((QuotaStatus::Reserved, counts.waiting_list));
        }

        let mut remaining = i64::from(size);

        for (status, used) in stages {
            remaining -= i64::from(used);

            if remaining <= 0 {
                trace!(quota = quota.name.as_str(), %status, "quota used up");

                return Availability {
                    status,
                    remaining: Some(0),
                };
            }
        }

        Availability {
            status: QuotaStatus::Ok,
            remaining: Some(u32::try_from(remaining).unwrap_or(size)),
        }
    }

    /// Result for a quota, if it was queued and computed.
    pub fn result(&self, key: QuotaKey) -> Option<Availability> {
        self.results.get(&key).copied()
    }

    /// All computed results.
    pub fn results(&self) -> &FxHashMap<QuotaKey, Availability> {
        &self.results
    }

    /// Counts behind a computed result.
    pub fn counts(&self, key: QuotaKey) -> Option<&QuotaCounts> {
        self.counts.get(&key)
    }

    /// Quotas marked to close when sold out whose paid and pending orders
    /// have filled them.
    pub fn quotas_to_close(&self) -> Vec<QuotaKey> {
        self.queued
            .iter()
            .copied()
            .filter(|key| {
                let (Some(quota), Some(counts)) = (self.quotas.get(*key), self.counts.get(key))
                else {
                    return false;
                };

                quota.close_when_sold_out
                    && !quota.closed
                    && quota
                        .size
                        .is_some_and(|size| counts.paid.saturating_add(counts.pending) >= size)
            })
            .collect()
    }

    /// Store the results in a cache for [`check_quotas`](crate::quotas::check_quotas).
    pub fn write_to(&self, cache: &mut QuotaCache) {
        cache.extend(self.results.iter().map(|(key, result)| (*key, *result)));
    }
}

#[cfg(test)]
mod tests {
    use jiff::ToSpan;
    use slotmap::SlotMap;
    use testresult::TestResult;

    use crate::quotas::sales::{
        CartPosition, Order, OrderPosition, OrderStatus, Voucher, WaitingListEntry,
    };

    use super::*;

    struct World {
        now: Timestamp,
        ticket: ItemRef,
        quotas: QuotaSet,
        quota: QuotaKey,
        snapshot: SalesSnapshot,
    }

    impl World {
        fn new(size: Option<u32>) -> Result<Self, jiff::Error> {
            Self::configured(size, |_| {})
        }

        fn configured(
            size: Option<u32>,
            configure: impl FnOnce(&mut Quota),
        ) -> Result<Self, jiff::Error> {
            let mut items = SlotMap::<ItemKey, ()>::with_key();
            let ticket = ItemRef::item(items.insert(()));

            let mut quota = Quota::new("Tickets", size).with_product(ticket);
            configure(&mut quota);

            let mut quotas = QuotaSet::new();
            let quota = quotas.insert(quota);

            Ok(Self {
                now: "2026-05-01T09:00:00Z".parse()?,
                ticket,
                quotas,
                quota,
                snapshot: SalesSnapshot::new(),
            })
        }

        fn order(&mut self, status: OrderStatus, count: usize) {
            self.snapshot.orders.push(Order {
                status,
                expires: Some(self.now + 1.hour()),
                positions: vec![OrderPosition::new(self.ticket, None); count],
            });
        }

        fn cart(&mut self, expires: Timestamp) {
            self.snapshot.carts.push(CartPosition {
                target: self.ticket,
                subevent: None,
                expires,
                voucher: None,
            });
        }

        fn voucher(&mut self, valid_until: Timestamp) -> crate::quotas::sales::VoucherKey {
            self.snapshot.vouchers.insert(Voucher {
                binding: VoucherBinding::Product(self.ticket),
                subevent: None,
                block_quota: true,
                valid_until: Some(valid_until),
                max_usages: 1,
                redeemed: 0,
            })
        }

        fn compute(&self) -> Availability {
            self.compute_at(self.now, false)
        }

        fn compute_at(&self, now: Timestamp, count_waiting_list: bool) -> Availability {
            let mut availability =
                QuotaAvailability::new(&self.quotas).with_count_waiting_list(count_waiting_list);
            availability.queue_all();
            availability.compute(&self.snapshot, now);

            availability
                .result(self.quota)
                .unwrap_or(Availability::unlimited())
        }
    }

    #[test]
    fn paid_order_filling_the_quota_is_gone() -> TestResult {
        let mut world = World::new(Some(2))?;
        world.order(OrderStatus::Paid, 2);

        assert_eq!(world.compute(), Availability::gone());

        Ok(())
    }

    #[test]
    fn stages_decide_status() -> TestResult {
        let mut world = World::new(Some(3))?;
        world.order(OrderStatus::Paid, 1);

        assert_eq!(
            world.compute(),
            Availability {
                status: QuotaStatus::Ok,
                remaining: Some(2)
            }
        );

        world.order(OrderStatus::Pending, 1);
        world.cart(world.now + 10.minutes());

        assert_eq!(
            world.compute(),
            Availability {
                status: QuotaStatus::Reserved,
                remaining: Some(0)
            }
        );

        world.order(OrderStatus::Pending, 1);

        assert_eq!(
            world.compute(),
            Availability {
                status: QuotaStatus::Ordered,
                remaining: Some(0)
            }
        );

        Ok(())
    }

    #[test]
    fn remaining_never_goes_negative() -> TestResult {
        let mut world = World::new(Some(1))?;
        world.order(OrderStatus::Paid, 5);
        world.cart(world.now + 10.minutes());

        assert_eq!(world.compute().remaining, Some(0));

        Ok(())
    }

    #[test]
    fn unlimited_quota_stays_available() -> TestResult {
        let mut world = World::new(None)?;
        world.order(OrderStatus::Paid, 1_000);

        assert_eq!(world.compute(), Availability::unlimited());

        Ok(())
    }

    #[test]
    fn expired_and_canceled_sales_do_not_count() -> TestResult {
        let mut world = World::new(Some(2))?;

        world.order(OrderStatus::Expired, 2);
        world.order(OrderStatus::Canceled, 2);
        world.snapshot.orders.push(Order {
            status: OrderStatus::Pending,
            expires: Some(world.now - 1.minute()),
            positions: vec![OrderPosition::new(world.ticket, None)],
        });
        world.snapshot.orders.push(Order {
            status: OrderStatus::Paid,
            expires: None,
            positions: vec![OrderPosition {
                canceled: true,
                ..OrderPosition::new(world.ticket, None)
            }],
        });
        world.cart(world.now - 1.minute());

        assert_eq!(
            world.compute(),
            Availability {
                status: QuotaStatus::Ok,
                remaining: Some(2)
            }
        );

        Ok(())
    }

    #[test]
    fn blocking_voucher_holds_one_until_it_expires() -> TestResult {
        let mut world = World::new(Some(5))?;
        let valid_until = world.now + 1.hour();
        world.voucher(valid_until);

        assert_eq!(world.compute().remaining, Some(4));
        assert_eq!(
            world.compute_at(valid_until + 1.minute(), false).remaining,
            Some(5)
        );

        Ok(())
    }

    #[test]
    fn cart_redeeming_blocking_voucher_is_counted_once() -> TestResult {
        let mut world = World::new(Some(5))?;
        let voucher = world.voucher(world.now + 1.hour());

        world.snapshot.carts.push(CartPosition {
            target: world.ticket,
            subevent: None,
            expires: world.now + 10.minutes(),
            voucher: Some(voucher),
        });

        assert_eq!(world.compute().remaining, Some(4));

        Ok(())
    }

    #[test]
    fn voucher_bound_to_quota_counts_against_it() -> TestResult {
        let mut world = World::new(Some(5))?;

        world.snapshot.vouchers.insert(Voucher {
            binding: VoucherBinding::Quota(world.quota),
            subevent: None,
            block_quota: true,
            valid_until: None,
            max_usages: 3,
            redeemed: 1,
        });

        assert_eq!(world.compute().remaining, Some(3));

        Ok(())
    }

    #[test]
    fn waiting_list_counts_only_when_enabled() -> TestResult {
        let mut world = World::new(Some(2))?;
        world.order(OrderStatus::Paid, 1);

        world.snapshot.waiting_list.push(WaitingListEntry {
            target: world.ticket,
            subevent: None,
            voucher_sent: false,
        });
        world.snapshot.waiting_list.push(WaitingListEntry {
            target: world.ticket,
            subevent: None,
            voucher_sent: true,
        });

        assert_eq!(world.compute_at(world.now, false).remaining, Some(1));
        assert_eq!(
            world.compute_at(world.now, true),
            Availability {
                status: QuotaStatus::Reserved,
                remaining: Some(0)
            }
        );

        Ok(())
    }

    #[test]
    fn closed_quota_is_gone_unless_ignored() -> TestResult {
        let world = World::configured(Some(10), |quota| quota.closed = true)?;

        assert_eq!(world.compute(), Availability::gone());

        let mut open = QuotaAvailability::new(&world.quotas).with_ignore_closed(true);
        open.queue(world.quota)?;
        open.compute(&world.snapshot, world.now);

        assert_eq!(
            open.result(world.quota),
            Some(Availability {
                status: QuotaStatus::Ok,
                remaining: Some(10)
            })
        );

        Ok(())
    }

    #[test]
    fn recomputing_gives_the_same_results() -> TestResult {
        let mut world = World::new(Some(4))?;
        world.order(OrderStatus::Paid, 1);
        world.order(OrderStatus::Pending, 1);
        world.cart(world.now + 5.minutes());

        let mut availability = QuotaAvailability::new(&world.quotas);
        availability.queue_all();

        availability.compute(&world.snapshot, world.now);
        let first = availability.results().clone();
        let first_counts = availability.counts(world.quota).copied();

        availability.compute(&world.snapshot, world.now);

        assert_eq!(availability.results(), &first);
        assert_eq!(availability.counts(world.quota).copied(), first_counts);

        Ok(())
    }

    #[test]
    fn sold_out_quotas_marked_for_closing() -> TestResult {
        let mut world = World::configured(Some(2), |quota| quota.close_when_sold_out = true)?;
        let closing = world.quota;
        let other = world
            .quotas
            .insert(Quota::new("Other", Some(2)).with_product(world.ticket));

        world.order(OrderStatus::Paid, 1);
        world.order(OrderStatus::Pending, 1);

        let mut availability = QuotaAvailability::new(&world.quotas);
        availability.queue_all();
        availability.compute(&world.snapshot, world.now);

        assert_eq!(availability.quotas_to_close(), vec![closing]);
        assert_eq!(
            availability.result(other).map(|result| result.status),
            Some(QuotaStatus::Ordered)
        );

        Ok(())
    }

    #[test]
    fn queueing_a_quota_twice_computes_it_once() -> TestResult {
        let mut world = World::new(Some(3))?;
        world.order(OrderStatus::Paid, 1);

        let mut availability = QuotaAvailability::new(&world.quotas);
        availability.queue(world.quota)?;
        availability.queue(world.quota)?;
        availability.queue_all();
        availability.compute(&world.snapshot, world.now);

        assert_eq!(availability.results().len(), 1);
        assert_eq!(
            availability.counts(world.quota).map(|counts| counts.paid),
            Some(1)
        );
        assert_eq!(
            availability.result(world.quota).and_then(|result| result.remaining),
            Some(2)
        );

        Ok(())
    }

    #[test]
    fn unknown_quota_cannot_be_queued() -> TestResult {
        let world = World::new(Some(2))?;

        let mut elsewhere = QuotaSet::new();
        elsewhere.insert(Quota::new("First", None));
        let foreign = elsewhere.insert(Quota::new("Second", None));

        let mut availability = QuotaAvailability::new(&world.quotas);

        assert_eq!(availability.queue(world.quota), Ok(()));
        assert_eq!(
            availability.queue(foreign),
            Err(QuotaError::UnknownQuota(foreign))
        );

        Ok(())
    }
}
