//! Subevent Grouping
//!
//! Splits the candidate lines of a rule into the groups the condition is
//! evaluated on.

use std::collections::VecDeque;

use rusty_money::{Money, iso::Currency};
use smallvec::SmallVec;

use crate::{catalog::SubeventKey, discounts::rule::SubeventMode};

/// A line that is still available to the rule being evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<'a> {
    /// Index of the line in the cart
    pub idx: usize,

    /// Subevent of the line
    pub subevent: Option<SubeventKey>,

    /// Line price
    pub price: Money<'a, Currency>,
}

/// Lines evaluated together. Kept in cart order unless noted otherwise.
pub type CandidateGroup<'a> = SmallVec<[Candidate<'a>; 8]>;

/// Group candidates according to the subevent mode.
///
/// `min_count` is only used by [`SubeventMode::Distinct`].
pub fn group<'a>(
    mode: SubeventMode,
    candidates: &[Candidate<'a>],
    min_count: usize,
) -> Vec<CandidateGroup<'a>> {
    match mode {
        SubeventMode::Mixed => mixed(candidates),
        SubeventMode::Same => same(candidates),
        SubeventMode::Distinct => distinct(candidates, min_count),
    }
}

/// All candidates in a single group.
pub fn mixed<'a>(candidates: &[Candidate<'a>]) -> Vec<CandidateGroup<'a>> {
    if candidates.is_empty() {
        return Vec::new();
    }

    vec![candidates.iter().copied().collect()]
}

/// One group per subevent, in order of first appearance.
pub fn same<'a>(candidates: &[Candidate<'a>]) -> Vec<CandidateGroup<'a>> {
    let mut groups: Vec<(Option<SubeventKey>, CandidateGroup<'a>)> = Vec::new();

    for candidate in candidates {
        match groups
            .iter_mut()
            .find(|(subevent, _)| *subevent == candidate.subevent)
        {
            Some((_, group)) => group.push(*candidate),
            None => groups.push((candidate.subevent, SmallVec::from_slice(&[*candidate]))),
        }
    }

    groups.into_iter().map(|(_, group)| group).collect()
}

/// Groups of lines on pairwise distinct subevents.
///
/// Groups of exactly `min_count` lines are built first, always drawing from
/// the subevents with the most remaining candidates and taking the cheapest
/// line of each subevent. This spreads cheap lines over as many groups as
/// possible. Leftover lines then join the first group that does not yet
/// contain their subevent; lines that fit nowhere stay ungrouped.
pub fn distinct<'a>(candidates: &[Candidate<'a>], min_count: usize) -> Vec<CandidateGroup<'a>> {
    let min_count = min_count.max(1);

    let mut queues: Vec<(Option<SubeventKey>, VecDeque<Candidate<'a>>)> = Vec::new();

    for candidate in candidates {
        match queues
            .iter_mut()
            .find(|(subevent, _)| *subevent == candidate.subevent)
        {
            Some((_, queue)) => queue.push_back(*candidate),
            None => queues.push((candidate.subevent, VecDeque::from([*candidate]))),
        }
    }

    for (_, queue) in &mut queues {
        queue
            .make_contiguous()
            .sort_by_key(|candidate| candidate.price.to_minor_units());
    }

    let mut groups: Vec<CandidateGroup<'a>> = Vec::new();

    loop {
        queues.retain(|(_, queue)| !queue.is_empty());
        queues.sort_by_key(|(_, queue)| std::cmp::Reverse(queue.len()));

        if queues.len() < min_count {
            break;
        }

        let group: CandidateGroup<'a> = queues
            .iter_mut()
            .take(min_count)
            .filter_map(|(_, queue)| queue.pop_front())
            .collect();

        groups.push(group);
    }

    for (subevent, queue) in &mut queues {
        while let Some(candidate) = queue.pop_front() {
            let free_group = groups
                .iter_mut()
                .find(|group| group.iter().all(|member| member.subevent != *subevent));

            if let Some(group) = free_group {
                group.push(candidate);
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use rusty_money::iso::EUR;
    use slotmap::SlotMap;

    use super::*;

    fn subevents(n: usize) -> Vec<SubeventKey> {
        let mut keys = SlotMap::<SubeventKey, ()>::with_key();

        (0..n).map(|_| keys.insert(())).collect()
    }

    fn candidate(idx: usize, subevent: Option<SubeventKey>, minor: i64) -> Candidate<'static> {
        Candidate {
            idx,
            subevent,
            price: Money::from_minor(minor, EUR),
        }
    }

    fn indexes(groups: &[CandidateGroup<'_>]) -> Vec<Vec<usize>> {
        groups
            .iter()
            .map(|group| group.iter().map(|candidate| candidate.idx).collect())
            .collect()
    }

    #[test]
    fn mixed_pools_everything() {
        let se = subevents(2);
        let candidates = [
            candidate(0, se.first().copied(), 100),
            candidate(1, se.get(1).copied(), 100),
        ];

        assert_eq!(indexes(&mixed(&candidates)), vec![vec![0, 1]]);
        assert!(mixed(&[]).is_empty());
    }

    #[test]
    fn same_groups_by_subevent_in_first_appearance_order() {
        let se = subevents(2);
        let (a, b) = (se.first().copied(), se.get(1).copied());

        let candidates = [
            candidate(0, b, 100),
            candidate(1, a, 100),
            candidate(2, b, 100),
            candidate(3, None, 100),
        ];

        assert_eq!(
            indexes(&same(&candidates)),
            vec![vec![0, 2], vec![1], vec![3]]
        );
    }

    #[test]
    fn distinct_needs_enough_distinct_subevents() {
        let se = subevents(2);
        let (a, b) = (se.first().copied(), se.get(1).copied());

        let candidates = [
            candidate(0, a, 100),
            candidate(1, a, 100),
            candidate(2, b, 100),
        ];

        assert!(distinct(&candidates, 3).is_empty());
    }

    #[test]
    fn distinct_builds_one_group_across_three_dates() {
        let se = subevents(3);

        let candidates: Vec<_> = se
            .iter()
            .enumerate()
            .map(|(idx, subevent)| candidate(idx, Some(*subevent), 12_000))
            .collect();

        assert_eq!(indexes(&distinct(&candidates, 3)), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn distinct_spreads_cheap_lines_over_groups() {
        let se = subevents(3);
        let (a, b, c) = (se.first().copied(), se.get(1).copied(), se.get(2).copied());

        let candidates = [
            candidate(0, a, 300),
            candidate(1, a, 100),
            candidate(2, a, 200),
            candidate(3, b, 100),
            candidate(4, b, 200),
            candidate(5, c, 100),
        ];

        assert_eq!(
            indexes(&distinct(&candidates, 2)),
            vec![vec![1, 3], vec![2, 4], vec![0, 5]]
        );
        assert_eq!(indexes(&distinct(&candidates, 3)), vec![vec![1, 3, 5]]);
    }

    #[test]
    fn distinct_leftover_joins_group_without_its_subevent() {
        let se = subevents(3);
        let (a, b, c) = (se.first().copied(), se.get(1).copied(), se.get(2).copied());

        let candidates = [
            candidate(0, a, 100),
            candidate(1, b, 100),
            candidate(2, c, 100),
        ];

        assert_eq!(indexes(&distinct(&candidates, 2)), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn distinct_leftovers_join_groups_missing_their_subevent() {
        let se = subevents(3);
        let (a, b, c) = (se.first().copied(), se.get(1).copied(), se.get(2).copied());

        let candidates = [
            candidate(0, a, 100),
            candidate(1, a, 200),
            candidate(2, b, 100),
            candidate(3, c, 100),
        ];

        // a has the most lines, so it leads; the group of three takes
        // one line of each date. The second line for a cannot join it.
        assert_eq!(indexes(&distinct(&candidates, 3)), vec![vec![0, 2, 3]]);

        // With groups of two: [a, b] first, then [a, c]; nothing left over.
        assert_eq!(
            indexes(&distinct(&candidates, 2)),
            vec![vec![0, 2], vec![1, 3]]
        );
    }
}
