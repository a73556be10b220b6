//! Random baseline of pairs that never went to school together
//!
//! First members are ordered by the municipality of their school; second members
//! are shuffled with a fixed seed and ordered the same way, so baseline partners
//! tend to live in the same region without sharing a school.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rustc_hash::FxHashSet;

use crate::stats::analysis::MemberPair;

/// Seed of the baseline shuffle
pub const DEFAULT_BASELINE_SEED: u64 = 0;

/// Draw baseline pairs from matched pairs
///
/// Returned pairs never share a school and never appear among `pairs` as the
/// same (first, second) combination.
#[must_use]
pub fn baseline_pairs(pairs: &[MemberPair], seed: u64) -> Vec<MemberPair> {
    let mut firsts: Vec<_> = pairs.iter().map(|p| &p.first).collect();
    firsts.sort_by(|a, b| a.municipality.cmp(&b.municipality));

    let mut rng = StdRng::seed_from_u64(seed);
    let mut seconds: Vec<_> = pairs.iter().map(|p| &p.second).collect();
    seconds.shuffle(&mut rng);
    seconds.sort_by(|a, b| a.municipality.cmp(&b.municipality));

    let existing: FxHashSet<(&str, &str)> = pairs
        .iter()
        .map(|p| (p.first.person.as_str(), p.second.person.as_str()))
        .collect();

    let mut same_school = 0u64;
    let mut co_enrolled = 0u64;
    let baseline: Vec<MemberPair> = firsts
        .into_iter()
        .zip(seconds)
        .filter(|(a, b)| {
            if a.school == b.school {
                same_school += 1;
                return false;
            }
            if existing.contains(&(a.person.as_str(), b.person.as_str())) {
                co_enrolled += 1;
                return false;
            }
            true
        })
        .map(|(a, b)| MemberPair {
            first: a.clone(),
            second: b.clone(),
        })
        .collect();

    log::info!(
        "Drew {} baseline pairs ({} sharing a school and {} already paired removed)",
        baseline.len(),
        same_school,
        co_enrolled
    );
    baseline
}
