//! Read-only views over a record listing.
//!
//! Nothing here touches the store; callers pass in whatever listing they
//! already hold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{ClassificationRecord, FailureKind, RecordStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first.
    #[default]
    Descending,
    Ascending,
}

/// Criteria for the records listing. Empty criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFilter {
    /// Case-insensitive substring of id, category or animal tag.
    #[serde(default)]
    pub text: Option<String>,
    /// Exact category, compared case-insensitively.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub order: SortOrder,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn matches(&self, record: &ClassificationRecord) -> bool {
        let text_ok = match self.text.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => matches_text(record, &text.to_lowercase()),
            _ => true,
        };
        let category_ok = match self.category.as_deref().map(str::trim) {
            Some(category) if !category.is_empty() => record
                .category()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(category)),
            _ => true,
        };
        let status_ok = self.status.map_or(true, |s| record.status() == s);
        text_ok && category_ok && status_ok
    }

    /// Matching records, sorted by creation time.
    pub fn apply<'a, I>(&self, records: I) -> Vec<ClassificationRecord>
    where
        I: IntoIterator<Item = &'a ClassificationRecord>,
    {
        let mut matched: Vec<ClassificationRecord> = records
            .into_iter()
            .filter(|r| self.matches(r))
            .cloned()
            .collect();
        sort_records(&mut matched, self.order);
        matched
    }
}

fn matches_text(record: &ClassificationRecord, needle: &str) -> bool {
    let contains = |haystack: &str| haystack.to_lowercase().contains(needle);
    contains(record.id())
        || record.category().is_some_and(contains)
        || record.animal_tag.as_deref().is_some_and(contains)
}

/// Ties on `created_at` fall back to the id so the order is stable.
pub fn sort_records(records: &mut [ClassificationRecord], order: SortOrder) {
    records.sort_by(|a, b| {
        let ascending = a
            .created_at()
            .cmp(&b.created_at())
            .then_with(|| a.id().cmp(b.id()));
        match order {
            SortOrder::Ascending => ascending,
            SortOrder::Descending => ascending.reverse(),
        }
    });
}

/// Records whose id, category or animal tag contains `text`, newest first.
pub fn search(records: &[ClassificationRecord], text: &str) -> Vec<ClassificationRecord> {
    RecordFilter::new().text(text).apply(records)
}

/// Records matching both predicates when given, newest first.
pub fn filter(
    records: &[ClassificationRecord],
    category: Option<&str>,
    status: Option<RecordStatus>,
) -> Vec<ClassificationRecord> {
    RecordFilter {
        category: category.map(str::to_string),
        status,
        ..Default::default()
    }
    .apply(records)
}

/// Whether a record is flagged for the operator: rejected by the remote,
/// or failed at least `threshold` times.
pub fn needs_attention(record: &ClassificationRecord, threshold: u32) -> bool {
    record.status() == RecordStatus::SyncFailed
        && (record.failure_kind() == Some(FailureKind::Rejected)
            || record.needs_attention(threshold))
}

/// Totals for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSummary {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    /// Committed but not yet synced: pending, syncing and failed.
    pub unsynced: usize,
    pub synced: usize,
    pub drafts: usize,
    pub needs_attention: usize,
}

impl RecordSummary {
    pub fn count(&self, status: RecordStatus) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }
}

pub fn summarize(records: &[ClassificationRecord], attention_threshold: u32) -> RecordSummary {
    let mut summary = RecordSummary {
        total: records.len(),
        by_status: RecordStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect(),
        ..Default::default()
    };

    for record in records {
        *summary.by_status.entry(record.status().as_str()).or_default() += 1;
        match record.status() {
            RecordStatus::Draft => summary.drafts += 1,
            RecordStatus::Synced => summary.synced += 1,
            RecordStatus::PendingSync | RecordStatus::Syncing | RecordStatus::SyncFailed => {
                summary.unsynced += 1
            }
        }
        if needs_attention(record, attention_threshold) {
            summary.needs_attention += 1;
        }
    }

    summary
}
