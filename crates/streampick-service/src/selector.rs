//! Picks the single best candidate out of a catalog answer.
//!
//! Candidates are narrowed down in tiers:
//!
//! 1. verified high quality encodes, `1080p` together with `bluray` or `web-dl`,
//! 2. anything that is not obviously a cam or screener release,
//! 3. all candidates.
//!
//! The first non-empty tier is ranked by seeders and its head wins. As long as there is any
//! candidate at all, exactly one stream is selected.

use crate::types::{is_low_quality, CandidateRecord, Stream};

fn is_verified_encode(lowercase_title: &str) -> bool {
    lowercase_title.contains("1080p")
        && (lowercase_title.contains("bluray") || lowercase_title.contains("web-dl"))
}

/// Returns the best candidate, or `None` if there are no candidates.
///
/// Among equally seeded candidates the earlier one wins.
pub fn pick_best(candidates: &[CandidateRecord]) -> Option<&CandidateRecord> {
    let titles: Vec<String> = candidates.iter().map(|c| c.title.to_lowercase()).collect();

    let tier = |accept: fn(&str) -> bool| {
        candidates
            .iter()
            .zip(&titles)
            .filter(|(_, title)| accept(title))
            .map(|(candidate, _)| candidate)
            .collect::<Vec<_>>()
    };

    let mut survivors = tier(is_verified_encode);
    if survivors.is_empty() {
        survivors = tier(|title| !is_low_quality(title));
    }
    if survivors.is_empty() {
        survivors = candidates.iter().collect();
    }

    // stable, so ties keep their catalog order
    survivors.sort_by_key(|candidate| std::cmp::Reverse(candidate.seeders()));
    survivors.into_iter().next()
}

/// Reduces the catalog answer to a list of at most one stream.
pub fn select(candidates: Vec<CandidateRecord>) -> Vec<Stream> {
    let winner = pick_best(&candidates).cloned();
    match winner {
        Some(winner) => {
            tracing::trace!(title = %winner.title, "selected stream");
            vec![Stream::from(winner)]
        }
        None => Vec::new(),
    }
}
