use std::collections::HashSet;
use std::path::PathBuf;

use cagent_checkpoint::atomic::{read_json, write_json_atomic};
use cagent_core::constants::{
    MEMORY_CONTENT_MAX_CHARS, MEMORY_MAX_EVIDENCE, MEMORY_MAX_RELATIONS, MEMORY_MAX_TAGS,
    MEMORY_STORE_CAP, MEMORY_TITLE_MAX_CHARS,
};
use cagent_core::{AgentError, Evidence, MemoryEntry};
use chrono::Utc;

use crate::dedupe::dedupe_key;
use crate::scoring::{score, tokenize};

const POSITIVE_MARKERS: &[&str] = &["always", "enable", "should", "must", "recommended", "prefer", "required"];
const NEGATIVE_MARKERS: &[&str] = &["never", "disable", "shouldn't", "mustn't", "avoid", "don't", "not recommended"];
const STOPWORDS: &[&str] = &["the", "a", "an", "to", "of", "in", "on", "for", "and", "is", "it"];

/// Per-workspace long-term memory store backed by a single JSON file,
/// written atomically the same way checkpoints are.
pub struct MemoryStore {
    path: PathBuf,
    entries: Vec<MemoryEntry>,
}

impl MemoryStore {
    pub fn load(path: PathBuf) -> Result<Self, AgentError> {
        let entries = if path.exists() {
            read_json(&path)?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn save(&self) -> Result<(), AgentError> {
        write_json_atomic(&self.path, &self.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn all(&self) -> &[MemoryEntry] {
        &self.entries
    }

    /// Add `candidate`, or merge it into an existing entry with the same
    /// dedupe key (same workspace, type, normalized title, and content).
    /// Merging blends the success/confidence scores toward the new
    /// observation rather than overwriting, so one bad run doesn't erase
    /// a pattern's history. When `candidate.supersedes` names other
    /// entries, those are invalidated and linked back via `contradicted_by`.
    pub fn add_or_merge(&mut self, mut candidate: MemoryEntry) -> String {
        cap_fields(&mut candidate);
        candidate.dedupe_key = dedupe_key(&candidate.workspace, candidate.kind, &candidate.title, &candidate.content);

        let id = if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.dedupe_key == candidate.dedupe_key)
        {
            existing.content = candidate.content;
            existing.success_score = (existing.success_score * 0.65) + (candidate.success_score * 0.35);
            existing.confidence_score = (existing.confidence_score * 0.60) + (candidate.confidence_score * 0.40);
            existing.pinned = existing.pinned || candidate.pinned;

            let evidence_added = !candidate.evidence.is_empty();
            existing.evidence.extend(candidate.evidence);
            dedupe_evidence(&mut existing.evidence);
            existing.evidence.truncate(MEMORY_MAX_EVIDENCE);

            for tag in candidate.tags {
                if !existing.tags.contains(&tag) {
                    existing.tags.push(tag);
                }
            }
            existing.tags.truncate(MEMORY_MAX_TAGS);

            for rel in candidate.supersedes {
                if !existing.supersedes.contains(&rel) {
                    existing.supersedes.push(rel);
                }
            }
            existing.supersedes.truncate(MEMORY_MAX_RELATIONS);
            for rel in candidate.contradicted_by {
                if !existing.contradicted_by.contains(&rel) {
                    existing.contradicted_by.push(rel);
                }
            }
            existing.contradicted_by.truncate(MEMORY_MAX_RELATIONS);

            if candidate.last_validated_at.is_some() || evidence_added {
                existing.last_validated_at = candidate.last_validated_at.or(Some(Utc::now()));
            }
            existing.updated_at = Utc::now();
            existing.id.clone()
        } else {
            let id = candidate.id.clone();
            self.entries.push(candidate);
            self.evict_if_over_capacity();
            id
        };

        self.apply_supersedes_cascade(&id);
        id
    }

    /// Mark every entry named in `id`'s `supersedes` relation as
    /// invalidated and link this entry into their `contradicted_by`.
    fn apply_supersedes_cascade(&mut self, id: &str) {
        let Some(superseded) = self.entries.iter().find(|e| e.id == id).map(|e| e.supersedes.clone()) else {
            return;
        };
        for target in superseded {
            if target == id {
                continue;
            }
            self.invalidate(&target, Some(id.to_string()));
        }
    }

    pub fn mark_used(&mut self, id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.use_count += 1;
            entry.last_used_at = Some(Utc::now());
        }
    }

    pub fn mark_validated(&mut self, id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.last_validated_at = Some(Utc::now());
        }
    }

    pub fn invalidate(&mut self, id: &str, contradicted_by: Option<String>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.invalidated_at = Some(Utc::now());
            if let Some(other) = contradicted_by {
                if !entry.contradicted_by.contains(&other) {
                    entry.contradicted_by.push(other);
                }
            }
        }
    }

    /// Pairwise conflicts within `selected`: entries whose title shares at
    /// least 2 non-stopword tokens and whose polarity (marker-word based)
    /// disagrees, e.g. one says "always enable strict mode" and the other
    /// "never enable strict mode".
    pub fn detect_conflicts<'a>(&self, selected: &[&'a MemoryEntry]) -> Vec<MemoryConflict<'a>> {
        let mut conflicts = Vec::new();
        for i in 0..selected.len() {
            for j in (i + 1)..selected.len() {
                let a = selected[i];
                let b = selected[j];
                let pol_a = polarity(a);
                let pol_b = polarity(b);
                if pol_a == 0 || pol_b == 0 || pol_a.signum() == pol_b.signum() {
                    continue;
                }
                if shared_title_tokens(&a.title, &b.title) >= 2 {
                    conflicts.push(MemoryConflict { a, b });
                }
            }
        }
        conflicts
    }

    /// `retrieve` plus the conflict diagnostics the caller needs to decide
    /// whether to gate the next mutation: how many conflicts were found
    /// among the selected entries, whether that requires a read-style
    /// action before mutating, and a human-readable warning for the first
    /// one (the engine only needs one to name in its block reason).
    pub fn retrieve_with_diagnostics(
        &self,
        workspace: &str,
        query: &str,
        limit: usize,
    ) -> (Vec<&MemoryEntry>, RetrievalDiagnostics) {
        let selected = self.retrieve(workspace, query, limit);
        let conflicts = self.detect_conflicts(&selected);
        let warning = conflicts.first().map(|c| {
            format!(
                "\"{}\" and \"{}\" disagree; verify which applies before mutating.",
                c.a.title, c.b.title
            )
        });
        let diagnostics = RetrievalDiagnostics {
            conflict_count: conflicts.len(),
            requires_verification_before_mutation: !conflicts.is_empty(),
            warning,
        };
        (selected, diagnostics)
    }

    /// Score and rank entries relevant to `query` within `workspace`,
    /// dropping anything below its type's minimum confidence unless it
    /// is pinned, along with non-pinned `dry_run`-tagged entries.
    pub fn retrieve(&self, workspace: &str, query: &str, limit: usize) -> Vec<&MemoryEntry> {
        let now = Utc::now();
        let tokens = tokenize(query);
        let mut scored: Vec<(f64, &MemoryEntry)> = self
            .entries
            .iter()
            .filter(|e| e.workspace == workspace && e.invalidated_at.is_none())
            .filter(|e| e.pinned || e.confidence_score >= e.kind.min_confidence())
            .filter(|e| e.pinned || !e.tags.iter().any(|t| t == "dry_run"))
            .map(|e| (score(e, &tokens, now), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(limit).map(|(_, e)| e).collect()
    }

    pub fn evict_if_over_capacity(&mut self) {
        if self.entries.len() <= MEMORY_STORE_CAP {
            return;
        }
        let now = Utc::now();
        self.entries.sort_by(|a, b| {
            let score_a = if a.pinned { f64::MAX } else { score(a, &[], now) };
            let score_b = if b.pinned { f64::MAX } else { score(b, &[], now) };
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });
        tracing::debug!(evicted = self.entries.len() - MEMORY_STORE_CAP, "memory store over capacity, evicting");
        self.entries.truncate(MEMORY_STORE_CAP);
    }
}

/// Two entries whose retrieved titles disagree in polarity on (roughly)
/// the same topic. The caller surfaces this rather than picking a winner.
pub struct MemoryConflict<'a> {
    pub a: &'a MemoryEntry,
    pub b: &'a MemoryEntry,
}

/// What a retrieval pass found about the selected context, reported as
/// data rather than folded straight into a single warning string so a
/// caller (or a test) can inspect how many conflicts were found and not
/// just whether one exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalDiagnostics {
    pub conflict_count: usize,
    pub requires_verification_before_mutation: bool,
    pub warning: Option<String>,
}

/// Drop evidence entries that repeat the same `(type, source, summary)`
/// triple, keeping the first (oldest) occurrence.
fn dedupe_evidence(evidence: &mut Vec<Evidence>) {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    evidence.retain(|e| seen.insert((e.kind.clone(), e.source.clone(), e.summary.clone())));
}

/// +1 for a net-positive marker count, -1 for net-negative, 0 if tied or
/// no markers found at all.
fn polarity(entry: &MemoryEntry) -> i32 {
    let haystack = format!("{} {}", entry.title, entry.content).to_lowercase();
    let positive = POSITIVE_MARKERS.iter().filter(|m| haystack.contains(*m)).count() as i32;
    let negative = NEGATIVE_MARKERS.iter().filter(|m| haystack.contains(*m)).count() as i32;
    (positive - negative).signum()
}

fn shared_title_tokens(a: &str, b: &str) -> usize {
    let tokenize_title = |s: &str| -> HashSet<String> {
        s.to_lowercase()
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| w.len() > 2 && !STOPWORDS.contains(&w.as_str()))
            .collect()
    };
    tokenize_title(a).intersection(&tokenize_title(b)).count()
}

/// Enforce the per-entry field caps from the data model so a single
/// oversized memory can never dominate the store or a retrieval packet.
pub fn cap_fields(entry: &mut MemoryEntry) {
    entry.title.truncate(MEMORY_TITLE_MAX_CHARS);
    entry.content.truncate(MEMORY_CONTENT_MAX_CHARS);
    entry.tags.truncate(MEMORY_MAX_TAGS);
    entry.evidence.truncate(MEMORY_MAX_EVIDENCE);
    entry.supersedes.truncate(MEMORY_MAX_RELATIONS);
    entry.contradicted_by.truncate(MEMORY_MAX_RELATIONS);
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagent_core::MemoryType;

    fn sample(title: &str, content: &str) -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: ulid::Ulid::new().to_string(),
            workspace: "/tmp/work".into(),
            kind: MemoryType::FixPattern,
            title: title.into(),
            content: content.into(),
            tags: vec![],
            pinned: false,
            success_score: 0.9,
            confidence_score: 0.9,
            use_count: 0,
            created_at: now,
            updated_at: now,
            last_used_at: None,
            last_validated_at: Some(now),
            invalidated_at: None,
            evidence: vec![],
            supersedes: vec![],
            contradicted_by: vec![],
            dedupe_key: String::new(),
        }
    }

    #[test]
    fn add_then_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.json");
        let mut store = MemoryStore::load(path.clone()).unwrap();
        store.add_or_merge(sample("retry storm", "use exponential backoff"));
        store.save().unwrap();

        let reloaded = MemoryStore::load(path).unwrap();
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn adding_same_title_type_and_content_merges_instead_of_duplicating() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        store.add_or_merge(sample("retry storm", "use exponential backoff"));
        store.add_or_merge(sample("retry storm", "use exponential backoff"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn adding_same_title_with_different_content_creates_a_distinct_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        store.add_or_merge(sample("retry storm", "v1"));
        store.add_or_merge(sample("retry storm", "v2"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn supersedes_invalidates_the_named_entry_and_links_contradicted_by() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        let mut old = sample("old convention", "use tabs");
        old.id = "old-id".into();
        store.add_or_merge(old);

        let mut newer = sample("new convention", "use spaces");
        newer.id = "new-id".into();
        newer.supersedes = vec!["old-id".into()];
        store.add_or_merge(newer);

        let old_entry = store.all().iter().find(|e| e.id == "old-id").unwrap();
        assert!(old_entry.invalidated_at.is_some());
        assert!(old_entry.contradicted_by.contains(&"new-id".to_string()));
    }

    #[test]
    fn retrieve_excludes_non_pinned_dry_run_tagged_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        let mut candidate = sample("retry storm fix", "exponential backoff on 429");
        candidate.tags = vec!["dry_run".into()];
        store.add_or_merge(candidate);
        assert!(store.retrieve("/tmp/work", "retry storm", 5).is_empty());
    }

    #[test]
    fn retrieve_filters_by_workspace_and_ranks_by_relevance() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        let mut other_ws = sample("unrelated in other workspace", "content");
        other_ws.workspace = "/tmp/other".into();
        store.add_or_merge(other_ws);
        store.add_or_merge(sample("retry storm fix", "exponential backoff on 429"));

        let hits = store.retrieve("/tmp/work", "retry storm", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "retry storm fix");
    }

    #[test]
    fn detect_conflicts_flags_opposite_polarity_over_shared_topic() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        let mut a = sample("always enable strict mode", "it prevents a class of bugs");
        a.id = "a".into();
        let mut b = sample("never enable strict mode", "it breaks legacy callers");
        b.id = "b".into();
        store.add_or_merge(a.clone());
        store.add_or_merge(b.clone());

        let selected: Vec<&MemoryEntry> = store.all().iter().collect();
        let conflicts = store.detect_conflicts(&selected);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn detect_conflicts_ignores_entries_on_unrelated_topics() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        store.add_or_merge(sample("always enable strict mode", "prevents bugs"));
        store.add_or_merge(sample("never commit secrets", "rotate the key"));

        let selected: Vec<&MemoryEntry> = store.all().iter().collect();
        assert!(store.detect_conflicts(&selected).is_empty());
    }

    #[test]
    fn retrieve_with_diagnostics_reports_one_conflict_and_its_warning() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        store.add_or_merge(sample("always enable strict mode", "it prevents a class of bugs"));
        store.add_or_merge(sample("never enable strict mode", "it breaks legacy callers"));

        let (selected, diagnostics) = store.retrieve_with_diagnostics("/tmp/work", "strict mode", 8);
        assert_eq!(selected.len(), 2);
        assert_eq!(diagnostics.conflict_count, 1);
        assert!(diagnostics.requires_verification_before_mutation);
        assert!(diagnostics.warning.unwrap().contains("disagree"));
    }

    #[test]
    fn retrieve_with_diagnostics_reports_no_conflict_when_entries_agree() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        store.add_or_merge(sample("retry storm fix", "use exponential backoff"));

        let (_, diagnostics) = store.retrieve_with_diagnostics("/tmp/work", "retry storm", 8);
        assert_eq!(diagnostics.conflict_count, 0);
        assert!(!diagnostics.requires_verification_before_mutation);
        assert!(diagnostics.warning.is_none());
    }

    #[test]
    fn invalidated_entries_are_excluded_from_retrieval() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json")).unwrap();
        let id = store.add_or_merge(sample("retry storm", "backoff"));
        store.invalidate(&id, None);
        assert!(store.retrieve("/tmp/work", "retry storm", 5).is_empty());
    }
}
