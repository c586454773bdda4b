//! Quota Checks

use jiff::Timestamp;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    catalog::{ItemRef, SubeventKey},
    quotas::{
        Availability, QuotaAvailability, QuotaError, QuotaKey, QuotaSet, sales::SalesSnapshot,
    },
};

/// Caller-owned cache of computed quota results.
pub type QuotaCache = FxHashMap<QuotaKey, Availability>;

/// Availability of a product on a subevent.
///
/// Combines every quota covering the product: the worst status and the
/// smallest remaining count, unlimited only if every quota is. Results found
/// in `cache` are used as they are; missing quotas are computed in one batch
/// and written back to the cache.
///
/// # Errors
///
/// Returns [`QuotaError::NoQuotas`] if no quota covers the product.
pub fn check_quotas(
    quotas: &QuotaSet,
    snapshot: &SalesSnapshot,
    target: ItemRef,
    subevent: Option<SubeventKey>,
    now: Timestamp,
    cache: Option<&mut QuotaCache>,
) -> Result<Availability, QuotaError> {
    let covering: SmallVec<[QuotaKey; 4]> = quotas
        .covering(target, subevent)
        .map(|(key, _)| key)
        .collect();

    if covering.is_empty() {
        return Err(QuotaError::NoQuotas);
    }

    let mut local = QuotaCache::default();
    let cache = cache.unwrap_or(&mut local);

    let missing: SmallVec<[QuotaKey; 4]> = covering
        .iter()
        .copied()
        .filter(|key| !cache.contains_key(key))
        .collect();

    if !missing.is_empty() {
        trace!(quotas = missing.len(), "computing uncached quotas");

        let mut availability = QuotaAvailability::new(quotas);

        for key in &missing {
            availability.queue(*key)?;
        }

        availability.compute(snapshot, now);
        availability.write_to(cache);
    }

    covering
        .iter()
        .map(|key| cache.get(key).copied().ok_or(QuotaError::UnknownQuota(*key)))
        .try_fold(Availability::unlimited(), |combined, result| {
            Ok(combined.and(result?))
        })
}
