//! Stage 3: fuzzy-match translated rows lacking a confident reference id
//! against the catalog's reference tables (§4.3 stage 3).
//!
//! Matching escalates through four passes, stopping at the first one that
//! yields at least one candidate: exact name match, normalized
//! (lowercased/trimmed) match, prefix match, then a Levenshtein-bounded
//! fuzzy match via `strsim`. Earlier passes are strictly more confident, so
//! a candidate from an earlier pass is never displaced by a later one.

use fleet_core::RefId;

/// Bound on edit distance for the final fuzzy pass; beyond this the
/// candidate is considered unrelated rather than a likely typo.
pub const MAX_LEVENSHTEIN_DISTANCE: usize = 3;

/// One candidate reference row considered for matching, reduced to just
/// the fields resolution needs.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The candidate's reference id.
    pub ref_id: RefId,
    /// The candidate's display name.
    pub name: String,
}

/// A ranked match produced for one unresolved row.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidate {
    /// The matched reference id.
    pub ref_id: RefId,
    /// Which pass produced the match, for diagnostics and `UnresolvedItem`
    /// confidence reporting.
    pub strategy: MatchStrategy,
}

/// Which escalation pass produced a [`ResolvedCandidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Byte-for-byte identical name.
    Exact,
    /// Identical after lowercasing and trimming whitespace.
    Normalized,
    /// One name is a prefix of the other, after normalization.
    Prefix,
    /// Within [`MAX_LEVENSHTEIN_DISTANCE`] edits, after normalization.
    Fuzzy,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Resolve `raw_name` against `candidates`, returning every match found by
/// the first pass that yields at least one, ranked best-first within that
/// pass (exact/normalized/prefix: stable input order; fuzzy: ascending
/// edit distance).
pub fn resolve_candidates(raw_name: &str, candidates: &[Candidate]) -> Vec<ResolvedCandidate> {
    let exact: Vec<_> = candidates
        .iter()
        .filter(|c| c.name == raw_name)
        .map(|c| ResolvedCandidate { ref_id: c.ref_id.clone(), strategy: MatchStrategy::Exact })
        .collect();
    if !exact.is_empty() {
        return exact;
    }

    let normalized_raw = normalize(raw_name);
    let normalized: Vec<_> = candidates
        .iter()
        .filter(|c| normalize(&c.name) == normalized_raw)
        .map(|c| ResolvedCandidate { ref_id: c.ref_id.clone(), strategy: MatchStrategy::Normalized })
        .collect();
    if !normalized.is_empty() {
        return normalized;
    }

    let prefix: Vec<_> = candidates
        .iter()
        .filter(|c| {
            let n = normalize(&c.name);
            n.starts_with(&normalized_raw) || normalized_raw.starts_with(&n)
        })
        .map(|c| ResolvedCandidate { ref_id: c.ref_id.clone(), strategy: MatchStrategy::Prefix })
        .collect();
    if !prefix.is_empty() {
        return prefix;
    }

    let mut fuzzy: Vec<(usize, &Candidate)> = candidates
        .iter()
        .map(|c| (strsim::levenshtein(&normalized_raw, &normalize(&c.name)), c))
        .filter(|(distance, _)| *distance <= MAX_LEVENSHTEIN_DISTANCE)
        .collect();
    fuzzy.sort_by_key(|(distance, _)| *distance);
    fuzzy
        .into_iter()
        .map(|(_, c)| ResolvedCandidate { ref_id: c.ref_id.clone(), strategy: MatchStrategy::Fuzzy })
        .collect()
}

/// Resolve `raw_name`, returning `Some` only when resolution is
/// unambiguous (exactly one candidate survived the winning pass).
/// Anything else — zero candidates, or more than one equally-ranked
/// candidate — is the caller's cue to record an `UnresolvedItem` instead
/// of guessing.
pub fn resolve_unambiguous(raw_name: &str, candidates: &[Candidate]) -> Option<RefId> {
    let matches = resolve_candidates(raw_name, candidates);
    match matches.as_slice() {
        [one] => Some(one.ref_id.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate { ref_id: RefId::from("cdn:officer:kirk"), name: "James T. Kirk".to_string() },
            Candidate { ref_id: RefId::from("cdn:officer:spock"), name: "Spock".to_string() },
            Candidate { ref_id: RefId::from("cdn:officer:spock-prime"), name: "Spock Prime".to_string() },
        ]
    }

    #[test]
    fn resolves_exact_match() {
        let got = resolve_unambiguous("Spock", &candidates());
        assert_eq!(got, Some(RefId::from("cdn:officer:spock")));
    }

    #[test]
    fn resolves_normalized_match() {
        let got = resolve_unambiguous("  spock  ", &candidates());
        assert_eq!(got, Some(RefId::from("cdn:officer:spock")));
    }

    #[test]
    fn ambiguous_prefix_is_unresolved() {
        let got = resolve_unambiguous("Spock Pri", &candidates());
        assert_eq!(got, None);
        let matches = resolve_candidates("Spock Pri", &candidates());
        assert_eq!(matches[0].strategy, MatchStrategy::Prefix);
    }

    #[test]
    fn resolves_fuzzy_typo_within_bound() {
        let got = resolve_unambiguous("Kirc", &candidates());
        assert_eq!(got, Some(RefId::from("cdn:officer:kirk")));
    }

    #[test]
    fn unrelated_name_is_unresolved() {
        let got = resolve_unambiguous("Completely Unrelated Name", &candidates());
        assert_eq!(got, None);
    }

    #[test]
    fn no_candidates_is_unresolved() {
        assert_eq!(resolve_unambiguous("Spock", &[]), None);
    }
}
