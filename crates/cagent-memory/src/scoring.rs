use cagent_core::MemoryEntry;
use chrono::{DateTime, Utc};

/// Relevance score combining token overlap with the query, recency decay,
/// the entry's own success/confidence signal, how recently it was
/// validated, and small bonuses for pinned/frequently-used entries. An
/// invalidated entry has its score scaled down to 18% of the raw value
/// rather than zeroed, so it naturally falls out of retrieval without
/// being deleted but can still surface for a query with nothing better.
pub fn score(entry: &MemoryEntry, query_tokens: &[String], now: DateTime<Utc>) -> f64 {
    let overlap = token_overlap(entry, query_tokens);
    let recency = age_decay(entry.updated_at, now, 30.0);
    let validation_recency = entry
        .last_validated_at
        .map(|t| age_decay(t, now, 45.0))
        .unwrap_or(0.0);
    let usage = (entry.use_count as f64 / 30.0).min(1.0);
    let pinned = if entry.pinned { 1.0 } else { 0.0 };

    let raw = 0.48 * overlap
        + 0.10 * recency
        + 0.14 * entry.success_score.clamp(0.0, 1.0)
        + 0.20 * entry.confidence_score.clamp(0.0, 1.0)
        + 0.06 * validation_recency
        + 0.02 * pinned
        + 0.02 * usage;

    raw * if entry.invalidated_at.is_some() { 0.18 } else { 1.0 }
}

fn token_overlap(entry: &MemoryEntry, query_tokens: &[String]) -> f64 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let haystack = format!("{} {} {}", entry.title, entry.content, entry.tags.join(" ")).to_lowercase();
    let matched = query_tokens
        .iter()
        .filter(|t| haystack.contains(t.to_lowercase().as_str()))
        .count();
    matched as f64 / query_tokens.len() as f64
}

/// `exp(-ageDays/half_life)`.
fn age_decay(at: DateTime<Utc>, now: DateTime<Utc>, half_life: f64) -> f64 {
    let days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
    (-days / half_life).exp()
}

pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| w.len() > 2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::MemoryType;

    fn entry(now: DateTime<Utc>) -> MemoryEntry {
        MemoryEntry {
            id: "1".into(),
            workspace: "/tmp".into(),
            kind: MemoryType::BugPattern,
            title: "pagination off by one".into(),
            content: "loop bound should be exclusive".into(),
            tags: vec!["pagination".into()],
            pinned: false,
            success_score: 0.8,
            confidence_score: 0.8,
            use_count: 0,
            created_at: now,
            updated_at: now,
            last_used_at: None,
            last_validated_at: Some(now),
            invalidated_at: None,
            evidence: vec![],
            supersedes: vec![],
            contradicted_by: vec![],
            dedupe_key: "k".into(),
        }
    }

    #[test]
    fn invalidated_entries_score_much_lower_than_valid_ones() {
        let now = Utc::now();
        let valid = entry(now);
        let mut invalidated = entry(now);
        invalidated.invalidated_at = Some(now);
        let q = tokenize("pagination");
        assert!(score(&invalidated, &q, now) < score(&valid, &q, now) * 0.2);
    }

    #[test]
    fn matching_query_scores_higher_than_unrelated_query() {
        let now = Utc::now();
        let e = entry(now);
        let matching = score(&e, &tokenize("pagination off by one bug"), now);
        let unrelated = score(&e, &tokenize("completely unrelated topic"), now);
        assert!(matching > unrelated);
    }

    #[test]
    fn pinned_entries_get_a_bonus() {
        let now = Utc::now();
        let mut pinned = entry(now);
        pinned.pinned = true;
        let unpinned = entry(now);
        let q = tokenize("pagination");
        assert!(score(&pinned, &q, now) > score(&unpinned, &q, now));
    }

    #[test]
    fn older_entries_decay_below_fresh_ones() {
        let now = Utc::now();
        let mut old = entry(now);
        old.updated_at = now - chrono::Duration::days(60);
        old.last_validated_at = Some(old.updated_at);
        let fresh = entry(now);
        let q = tokenize("pagination");
        assert!(score(&fresh, &q, now) > score(&old, &q, now));
    }
}
