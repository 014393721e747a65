use std::collections::VecDeque;

use crate::model::{CheckinOutcome, FeedbackKind};

/// 一条签到记录（供操作页展示）。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub key: String,
    pub kind: FeedbackKind,
    pub message: String,
    pub at_ms: u64,
}

/// 最近签到记录（定长，超出时丢弃最旧）及计数。
pub struct CheckinHistory {
    max_len: usize,
    entries: VecDeque<HistoryEntry>,
    success_count: u32,
    failure_count: u32,
}

impl CheckinHistory {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            entries: VecDeque::with_capacity(max_len),
            success_count: 0,
            failure_count: 0,
        }
    }

    pub fn record(&mut self, key: &str, outcome: &CheckinOutcome, at_ms: u64) {
        let kind = outcome.kind();
        match kind {
            FeedbackKind::Success => self.success_count = self.success_count.saturating_add(1),
            FeedbackKind::Failure => self.failure_count = self.failure_count.saturating_add(1),
        }
        if self.max_len == 0 {
            return;
        }
        if self.entries.len() >= self.max_len {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry {
            key: key.to_string(),
            kind,
            message: outcome.message(),
            at_ms,
        });
    }

    /// 最新的记录在前。
    pub fn recent(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn success_count(&self) -> u32 {
        self.success_count
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FailureReason;

    #[test]
    fn keeps_newest_entries_and_counts_all() {
        let mut history = CheckinHistory::new(2);
        history.record("A", &CheckinOutcome::Success("ok".to_string()), 1);
        history.record("B", &CheckinOutcome::Failure(FailureReason::Timeout), 2);
        history.record("C", &CheckinOutcome::Success("ok".to_string()), 3);
        let keys: Vec<&str> = history.recent().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["C", "B"]);
        assert_eq!(history.success_count(), 2);
        assert_eq!(history.failure_count(), 1);
    }
}
