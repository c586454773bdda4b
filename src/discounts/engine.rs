//! Discount Engine
//!
//! Prices a cart by evaluating automatic discount rules one after another.
//! A line priced (or consumed to satisfy a condition) by one rule is not
//! visible to later rules, so discounts never stack on a line. Allocation is
//! greedy in rule order.

use rustc_hash::FxHashSet;
use rusty_money::{Money, iso::Currency};
use tracing::{debug, trace};

use crate::{
    discounts::{
        DiscountError,
        grouping::{Candidate, CandidateGroup, group},
        reduce_by,
        rule::{BenefitScope, DiscountKey, DiscountRule, SubeventMode},
    },
    positions::LineItem,
    pricing::sum_in,
};

/// Final price of a cart line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinePrice<'a> {
    /// Price after automatic discounts
    pub price: Money<'a, Currency>,

    /// Rule that consumed this line, if any.
    ///
    /// A line consumed only to satisfy a condition keeps its price but is
    /// still attributed to the rule.
    pub discount: Option<DiscountKey>,
}

/// Apply discount rules to cart lines.
///
/// Rules are evaluated in ascending [`DiscountRule::position`]; rules sharing
/// a position keep their order in `rules`. Inactive rules are skipped, but no
/// other availability checks are made here, see
/// [`available_rules`](crate::discounts::rule::available_rules).
///
/// Returns one [`LinePrice`] per line, in the same order as `lines`.
///
/// # Errors
///
/// Returns a [`DiscountError`] if money arithmetic fails, for example when a
/// rule's minimum value and the cart use different currencies.
pub fn apply_discounts<'a, 'r>(
    lines: &[LineItem<'a>],
    rules: impl IntoIterator<Item = &'r DiscountRule<'a>>,
) -> Result<Vec<LinePrice<'a>>, DiscountError>
where
    'a: 'r,
{
    let mut ordered: Vec<&DiscountRule<'a>> =
        rules.into_iter().filter(|rule| rule.is_active()).collect();

    ordered.sort_by_key(|rule| rule.position());

    let mut priced: Vec<Option<LinePrice<'a>>> = vec![None; lines.len()];

    for rule in ordered {
        let allocation = apply_rule(rule, lines, &priced)?;

        debug!(
            discount = ?rule.key(),
            name = rule.name(),
            consumed = allocation.len(),
            "applied discount rule"
        );

        for (idx, price) in allocation {
            if let Some(slot) = priced.get_mut(idx) {
                *slot = Some(LinePrice {
                    price,
                    discount: Some(rule.key()),
                });
            }
        }
    }

    Ok(lines
        .iter()
        .zip(priced)
        .map(|(line, priced)| {
            priced.unwrap_or(LinePrice {
                price: *line.price(),
                discount: None,
            })
        })
        .collect())
}

/// Evaluate one rule against the lines not yet consumed.
///
/// Returns the consumed lines with their new prices.
fn apply_rule<'a>(
    rule: &DiscountRule<'a>,
    lines: &[LineItem<'a>],
    priced: &[Option<LinePrice<'a>>],
) -> Result<Vec<(usize, Money<'a, Currency>)>, DiscountError> {
    let available = || {
        lines
            .iter()
            .zip(priced)
            .enumerate()
            .filter(|(_, (line, priced))| priced.is_none() && !line.is_bundled())
            .map(|(idx, (line, _))| (idx, line))
    };

    let condition_candidates: Vec<Candidate<'a>> = available()
        .filter(|(_, line)| rule.condition().matches(line))
        .map(|(idx, line)| candidate(idx, line))
        .collect();

    let benefit_candidates: Option<Vec<Candidate<'a>>> = match rule.benefit().scope {
        BenefitScope::SameAsCondition => None,
        BenefitScope::Products { .. } => Some(
            available()
                .filter(|(_, line)| rule.benefit().scope.matches(line))
                .map(|(idx, line)| candidate(idx, line))
                .collect(),
        ),
    };

    let min_count = rule.condition().min_count.unwrap_or(1);
    let groups = group(rule.subevent_mode(), &condition_candidates, min_count);

    trace!(
        discount = ?rule.key(),
        candidates = condition_candidates.len(),
        groups = groups.len(),
        "grouped discount candidates"
    );

    let mut allocation = Allocation::default();

    for condition_group in &groups {
        let benefit_group = benefit_candidates
            .as_ref()
            .map(|benefit| benefit_for_group(rule, condition_group, benefit));

        apply_group(rule, condition_group, benefit_group.as_deref(), &mut allocation)?;
    }

    Ok(allocation.into_prices())
}

fn candidate<'a>(idx: usize, line: &LineItem<'a>) -> Candidate<'a> {
    Candidate {
        idx,
        subevent: line.subevent(),
        price: *line.price(),
    }
}

/// Benefit lines that belong with a condition group.
///
/// Groups only split by subevent in [`SubeventMode::Same`], where a benefit
/// line must share the group's date.
fn benefit_for_group<'a>(
    rule: &DiscountRule<'a>,
    condition_group: &[Candidate<'a>],
    benefit: &[Candidate<'a>],
) -> CandidateGroup<'a> {
    match (rule.subevent_mode(), condition_group.first()) {
        (SubeventMode::Same, Some(first)) => benefit
            .iter()
            .filter(|candidate| candidate.subevent == first.subevent)
            .copied()
            .collect(),
        _ => benefit.iter().copied().collect(),
    }
}

/// Lines consumed by the rule being evaluated.
#[derive(Debug, Default)]
struct Allocation<'a> {
    prices: Vec<(usize, Money<'a, Currency>)>,
    consumed: FxHashSet<usize>,
}

impl<'a> Allocation<'a> {
    /// Record a line unless an earlier group of this rule already took it.
    fn consume(&mut self, idx: usize, price: Money<'a, Currency>) {
        if self.consumed.insert(idx) {
            self.prices.push((idx, price));
        }
    }

    fn contains(&self, idx: usize) -> bool {
        self.consumed.contains(&idx)
    }

    fn into_prices(self) -> Vec<(usize, Money<'a, Currency>)> {
        self.prices
    }
}

/// Evaluate the condition on one group and allocate the benefit.
fn apply_group<'a>(
    rule: &DiscountRule<'a>,
    condition_group: &[Candidate<'a>],
    benefit_group: Option<&[Candidate<'a>]>,
    allocation: &mut Allocation<'a>,
) -> Result<(), DiscountError> {
    let condition = rule.condition();
    let benefit = rule.benefit();

    if condition
        .min_count
        .is_some_and(|min_count| condition_group.len() < min_count)
    {
        return Ok(());
    }

    if let Some(min_value) = condition.min_value {
        let total = sum_in(
            min_value.currency(),
            condition_group.iter().map(|candidate| &candidate.price),
        )?;

        if total.to_minor_units() < min_value.to_minor_units() {
            return Ok(());
        }
    }

    let (consume, discount): (CandidateGroup<'a>, CandidateGroup<'a>) =
        match (benefit.only_apply_to_cheapest_n_matches, condition.min_count) {
            (Some(cheapest_n), Some(min_count)) => {
                let sorted = cheapest_first(condition_group.iter().copied());
                let sets = sorted.len() / min_count;
                let consume: CandidateGroup<'a> =
                    sorted.iter().copied().take(sets * min_count).collect();

                let pool = match benefit_group {
                    None => sorted,
                    Some(benefit_group) => cheapest_first(
                        benefit_group
                            .iter()
                            .filter(|candidate| !consume.iter().any(|c| c.idx == candidate.idx))
                            .copied(),
                    ),
                };

                let discount = pool.into_iter().take(sets * cheapest_n).collect();

                (consume, discount)
            }
            _ => {
                let consume: CandidateGroup<'a> = condition_group.iter().copied().collect();

                let discount = match benefit_group {
                    None => consume.clone(),
                    Some(benefit_group) => benefit_group
                        .iter()
                        .filter(|candidate| !consume.iter().any(|c| c.idx == candidate.idx))
                        .copied()
                        .collect(),
                };

                (consume, discount)
            }
        };

    trace!(
        discount = ?rule.key(),
        consumed = consume.len(),
        discounted = discount.len(),
        "condition met"
    );

    for candidate in &discount {
        if !allocation.contains(candidate.idx) {
            let price = reduce_by(&candidate.price, &benefit.percentage)?;

            allocation.consume(candidate.idx, price);
        }
    }

    for candidate in &consume {
        allocation.consume(candidate.idx, candidate.price);
    }

    Ok(())
}

/// Sort ascending by price; equal prices keep cart order.
fn cheapest_first<'a>(candidates: impl IntoIterator<Item = Candidate<'a>>) -> CandidateGroup<'a> {
    let mut sorted: CandidateGroup<'a> = candidates.into_iter().collect();

    sorted.sort_by_key(|candidate| (candidate.price.to_minor_units(), candidate.idx));

    sorted
}

#[cfg(test)]
mod tests {
    use decimal_percentage::Percentage;
    use rusty_money::iso::{EUR, USD};
    use slotmap::SlotMap;
    use testresult::TestResult;

    use crate::{
        catalog::{ItemKey, ItemRef, SubeventKey},
        discounts::rule::{DiscountBenefit, DiscountCondition, DiscountConfigError, ProductScope},
    };

    use super::*;

    struct Keys {
        items: SlotMap<ItemKey, ()>,
        subevents: SlotMap<SubeventKey, ()>,
        discounts: SlotMap<DiscountKey, ()>,
    }

    impl Keys {
        fn new() -> Self {
            Self {
                items: SlotMap::with_key(),
                subevents: SlotMap::with_key(),
                discounts: SlotMap::with_key(),
            }
        }

        fn rule(
            &mut self,
            mode: SubeventMode,
            condition: DiscountCondition<'static>,
            benefit: DiscountBenefit,
        ) -> Result<DiscountRule<'static>, DiscountConfigError> {
            DiscountRule::new(self.discounts.insert(()), mode, condition, benefit)
        }
    }

    fn line(item: ItemKey, subevent: Option<SubeventKey>, minor: i64) -> LineItem<'static> {
        LineItem::new(ItemRef::item(item), subevent, Money::from_minor(minor, EUR))
    }

    fn prices(result: &[LinePrice<'_>]) -> Vec<i64> {
        result
            .iter()
            .map(|line| line.price.to_minor_units())
            .collect()
    }

    #[test]
    fn mixed_min_count_needs_enough_lines() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_count(3),
            DiscountBenefit::percentage(Percentage::from(0.2)),
        )?;

        let two = [line(ticket, None, 12_000), line(ticket, None, 12_000)];
        let three = [
            line(ticket, None, 12_000),
            line(ticket, None, 12_000),
            line(ticket, None, 12_000),
        ];

        let unchanged = apply_discounts(&two, [&rule])?;
        let discounted = apply_discounts(&three, [&rule])?;

        assert_eq!(prices(&unchanged), vec![12_000, 12_000]);
        assert!(unchanged.iter().all(|line| line.discount.is_none()));

        assert_eq!(prices(&discounted), vec![9_600, 9_600, 9_600]);
        assert!(
            discounted
                .iter()
                .all(|line| line.discount == Some(rule.key()))
        );

        Ok(())
    }

    #[test]
    fn rules_sharing_a_position_keep_their_order() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let half = keys
            .rule(
                SubeventMode::Mixed,
                DiscountCondition::min_count(1),
                DiscountBenefit::percentage(Percentage::from(0.5)),
            )?
            .with_position(0);

        let tenth = keys
            .rule(
                SubeventMode::Mixed,
                DiscountCondition::min_count(1),
                DiscountBenefit::percentage(Percentage::from(0.1)),
            )?
            .with_position(0);

        let lines = [line(ticket, None, 1_000)];

        let result = apply_discounts(&lines, [&half, &tenth])?;

        assert_eq!(prices(&result), [500]);
        assert_eq!(
            result.first().and_then(|line| line.discount),
            Some(half.key())
        );

        let result = apply_discounts(&lines, [&tenth, &half])?;

        assert_eq!(prices(&result), [900]);
        assert_eq!(
            result.first().and_then(|line| line.discount),
            Some(tenth.key())
        );

        Ok(())
    }

    #[test]
    fn distinct_cheapest_one_free() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());
        let dates: Vec<_> = (0..3).map(|_| keys.subevents.insert(())).collect();

        let rule = keys.rule(
            SubeventMode::Distinct,
            DiscountCondition::min_count(3),
            DiscountBenefit::cheapest(1, Percentage::from(1.0)),
        )?;

        let lines: Vec<_> = dates
            .iter()
            .map(|date| line(ticket, Some(*date), 12_000))
            .collect();

        let result = apply_discounts(&lines, [&rule])?;

        assert_eq!(prices(&result), vec![0, 12_000, 12_000]);

        Ok(())
    }

    #[test]
    fn distinct_same_date_twice_does_not_count() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());
        let a = keys.subevents.insert(());
        let b = keys.subevents.insert(());

        let rule = keys.rule(
            SubeventMode::Distinct,
            DiscountCondition::min_count(3),
            DiscountBenefit::cheapest(1, Percentage::from(1.0)),
        )?;

        let lines = [
            line(ticket, Some(a), 12_000),
            line(ticket, Some(a), 12_000),
            line(ticket, Some(b), 12_000),
        ];

        let result = apply_discounts(&lines, [&rule])?;

        assert_eq!(prices(&result), vec![12_000, 12_000, 12_000]);

        Ok(())
    }

    #[test]
    fn same_mode_evaluates_each_date_on_its_own() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());
        let a = keys.subevents.insert(());
        let b = keys.subevents.insert(());

        let rule = keys.rule(
            SubeventMode::Same,
            DiscountCondition::min_count(3),
            DiscountBenefit::percentage(Percentage::from(0.2)),
        )?;

        let lines = [
            line(ticket, Some(a), 12_000),
            line(ticket, Some(b), 12_000),
            line(ticket, Some(a), 12_000),
            line(ticket, Some(b), 12_000),
            line(ticket, Some(b), 12_000),
        ];

        let result = apply_discounts(&lines, [&rule])?;

        assert_eq!(
            prices(&result),
            vec![12_000, 9_600, 12_000, 9_600, 9_600]
        );

        Ok(())
    }

    #[test]
    fn cheapest_n_only_consumes_complete_sets() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        // Buy two, get one free, followed by a 10% rule for anything left.
        let free = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_count(3),
            DiscountBenefit::cheapest(1, Percentage::from(1.0)),
        )?;
        let rest = keys
            .rule(
                SubeventMode::Mixed,
                DiscountCondition::min_count(1),
                DiscountBenefit::percentage(Percentage::from(0.1)),
            )?
            .with_position(1);

        let lines = [
            line(ticket, None, 4_000),
            line(ticket, None, 1_000),
            line(ticket, None, 3_000),
            line(ticket, None, 2_000),
        ];

        let result = apply_discounts(&lines, [&rest, &free])?;

        assert_eq!(prices(&result), vec![3_600, 0, 3_000, 2_000]);
        assert_eq!(
            result.iter().map(|line| line.discount).collect::<Vec<_>>(),
            vec![
                Some(rest.key()),
                Some(free.key()),
                Some(free.key()),
                Some(free.key())
            ]
        );

        Ok(())
    }

    #[test]
    fn cheapest_n_ties_resolve_in_cart_order() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_count(2),
            DiscountBenefit::cheapest(1, Percentage::from(0.5)),
        )?;

        let lines = [
            line(ticket, None, 2_000),
            line(ticket, None, 1_000),
            line(ticket, None, 1_000),
            line(ticket, None, 2_000),
        ];

        let result = apply_discounts(&lines, [&rule])?;

        // Two complete sets: both 10.00 lines are the cheapest of their set.
        assert_eq!(prices(&result), vec![2_000, 500, 500, 2_000]);

        Ok(())
    }

    #[test]
    fn min_value_condition() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_value(Money::from_minor(20_000, EUR)),
            DiscountBenefit::percentage(Percentage::from(0.1)),
        )?;

        let below = [line(ticket, None, 9_000), line(ticket, None, 10_000)];
        let above = [line(ticket, None, 10_000), line(ticket, None, 10_000)];

        assert_eq!(
            prices(&apply_discounts(&below, [&rule])?),
            vec![9_000, 10_000]
        );
        assert_eq!(
            prices(&apply_discounts(&above, [&rule])?),
            vec![9_000, 9_000]
        );

        Ok(())
    }

    #[test]
    fn min_count_and_min_value_must_both_hold() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let condition = DiscountCondition {
            min_value: Some(Money::from_minor(30_000, EUR)),
            ..DiscountCondition::min_count(2)
        };

        let rule = keys.rule(
            SubeventMode::Mixed,
            condition,
            DiscountBenefit::percentage(Percentage::from(0.5)),
        )?;

        let cheap = [line(ticket, None, 10_000), line(ticket, None, 10_000)];
        let dear = [line(ticket, None, 15_000), line(ticket, None, 15_000)];

        assert_eq!(
            prices(&apply_discounts(&cheap, [&rule])?),
            vec![10_000, 10_000]
        );
        assert_eq!(
            prices(&apply_discounts(&dear, [&rule])?),
            vec![7_500, 7_500]
        );

        Ok(())
    }

    #[test]
    fn bundled_lines_and_addons_are_left_out() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let condition = DiscountCondition {
            apply_to_addons: false,
            ..DiscountCondition::min_count(1)
        };

        let rule = keys.rule(
            SubeventMode::Mixed,
            condition,
            DiscountBenefit::percentage(Percentage::from(0.5)),
        )?;

        let lines = [
            line(ticket, None, 1_000),
            line(ticket, None, 1_000).as_bundled(),
            line(ticket, None, 1_000).as_addon(),
        ];

        let result = apply_discounts(&lines, [&rule])?;

        assert_eq!(prices(&result), vec![500, 1_000, 1_000]);
        assert_eq!(result.get(1).and_then(|line| line.discount), None);

        Ok(())
    }

    #[test]
    fn separate_benefit_scope_discounts_other_products() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());
        let parking = keys.items.insert(());

        let benefit = DiscountBenefit::cheapest(1, Percentage::from(1.0)).with_scope(
            BenefitScope::Products {
                products: ProductScope::from_iter([parking]),
                apply_to_addons: true,
                ignore_voucher_discounted: false,
            },
        );

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_count(2).with_products(ProductScope::from_iter([ticket])),
            benefit,
        )?;

        let lines = [
            line(parking, None, 1_500),
            line(ticket, None, 12_000),
            line(ticket, None, 12_000),
            line(parking, None, 1_000),
        ];

        let result = apply_discounts(&lines, [&rule])?;

        assert_eq!(prices(&result), vec![1_500, 12_000, 12_000, 0]);
        assert_eq!(result.first().and_then(|line| line.discount), None);

        Ok(())
    }

    #[test]
    fn inactive_rules_are_skipped() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let rule = keys
            .rule(
                SubeventMode::Mixed,
                DiscountCondition::min_count(1),
                DiscountBenefit::percentage(Percentage::from(0.5)),
            )?
            .with_active(false);

        let lines = [line(ticket, None, 1_000)];

        assert_eq!(prices(&apply_discounts(&lines, [&rule])?), vec![1_000]);

        Ok(())
    }

    #[test]
    fn min_value_in_other_currency_is_an_error() -> TestResult {
        let mut keys = Keys::new();
        let ticket = keys.items.insert(());

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_value(Money::from_minor(100, USD)),
            DiscountBenefit::percentage(Percentage::from(0.5)),
        )?;

        let lines = [line(ticket, None, 1_000)];

        assert!(apply_discounts(&lines, [&rule]).is_err());

        Ok(())
    }

    #[test]
    fn empty_cart_prices_to_nothing() -> TestResult {
        let mut keys = Keys::new();

        let rule = keys.rule(
            SubeventMode::Mixed,
            DiscountCondition::min_count(1),
            DiscountBenefit::percentage(Percentage::from(0.5)),
        )?;

        assert!(apply_discounts(&[], [&rule])?.is_empty());

        Ok(())
    }
}
