use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::task::QUESTION_COUNT;

/// Field names inside a bill record.
pub mod fields {
    pub const ANSWERED_COUNT: &str = "answered_count";
    pub const LINKS_TOTAL: &str = "links_total";
    pub const LINKS_VALIDATED: &str = "links_validated";
    pub const LINKS_FAILED: &str = "links_failed";
    pub const DRAFT_STATUS: &str = "draft_status";
    /// Id of the task allowed to publish the draft task.
    pub const DRAFT_TRIGGER: &str = "draft_trigger";
    pub const ARTICLE: &str = "article";
    pub const FAILURE: &str = "failure";
    pub const ANSWER_PREFIX: &str = "answer:";
    pub const LINK_PREFIX: &str = "link:";
    /// Generated answer text kept until its links are registered.
    pub const CANDIDATE_PREFIX: &str = "candidate:";

    pub fn answer(index: u8) -> String {
        format!("{}{}", ANSWER_PREFIX, index)
    }

    pub fn candidate(index: u8) -> String {
        format!("{}{}", CANDIDATE_PREFIX, index)
    }

    pub fn link(url: &str) -> String {
        format!("{}{}", LINK_PREFIX, url)
    }
}

pub fn bill_key(bill_id: &str) -> String {
    format!("bill:{}", bill_id)
}

/// Draft lifecycle. Only `not_ready -> queued -> complete` and
/// `{not_ready, queued} -> failed` ever happen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    #[default]
    NotReady,
    Queued,
    Complete,
    Failed,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::NotReady => "not_ready",
            DraftStatus::Queued => "queued",
            DraftStatus::Complete => "complete",
            DraftStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DraftStatus::Complete | DraftStatus::Failed)
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DraftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_ready" => Ok(DraftStatus::NotReady),
            "queued" => Ok(DraftStatus::Queued),
            "complete" => Ok(DraftStatus::Complete),
            "failed" => Ok(DraftStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Pending,
    Valid,
    Invalid,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Pending => "pending",
            LinkStatus::Valid => "valid",
            LinkStatus::Invalid => "invalid",
        }
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LinkStatus::Pending),
            "valid" => Ok(LinkStatus::Valid),
            "invalid" => Ok(LinkStatus::Invalid),
            other => Err(other.to_string()),
        }
    }
}

/// Decoded view of one bill's record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BillProgress {
    pub bill_id: String,
    pub answers: BTreeMap<u8, String>,
    pub answered_count: i64,
    pub links: BTreeMap<String, LinkStatus>,
    /// Absent until the last answer lands and the link count is sealed.
    pub links_total: Option<i64>,
    pub links_validated: i64,
    pub links_failed: i64,
    pub draft_status: DraftStatus,
    /// Task that claimed the draft trigger, once the gate has passed.
    pub draft_trigger: Option<String>,
    /// Serialized article once the draft completes.
    pub article: Option<String>,
    pub failure: Option<String>,
}

fn malformed(key: &str, field: &str, value: &str) -> StoreError {
    StoreError::Malformed {
        key: key.to_string(),
        field: field.to_string(),
        value: value.to_string(),
    }
}

impl BillProgress {
    pub fn from_fields(bill_id: &str, raw: HashMap<String, String>) -> Result<Self, StoreError> {
        let key = bill_key(bill_id);
        let mut progress = BillProgress {
            bill_id: bill_id.to_string(),
            ..Default::default()
        };

        let counter = |field: &str, value: &str| -> Result<i64, StoreError> {
            value.parse().map_err(|_| malformed(&key, field, value))
        };

        for (field, value) in raw {
            if let Some(index) = field.strip_prefix(fields::ANSWER_PREFIX) {
                let index: u8 = index.parse().map_err(|_| malformed(&key, &field, &value))?;
                progress.answers.insert(index, value);
            } else if let Some(url) = field.strip_prefix(fields::LINK_PREFIX) {
                let status = value
                    .parse::<LinkStatus>()
                    .map_err(|_| malformed(&key, &field, &value))?;
                progress.links.insert(url.to_string(), status);
            } else {
                match field.as_str() {
                    fields::ANSWERED_COUNT => progress.answered_count = counter(&field, &value)?,
                    fields::LINKS_TOTAL => progress.links_total = Some(counter(&field, &value)?),
                    fields::LINKS_VALIDATED => progress.links_validated = counter(&field, &value)?,
                    fields::LINKS_FAILED => progress.links_failed = counter(&field, &value)?,
                    fields::DRAFT_STATUS => {
                        progress.draft_status = value
                            .parse()
                            .map_err(|_| malformed(&key, &field, &value))?
                    }
                    fields::DRAFT_TRIGGER => progress.draft_trigger = Some(value),
                    fields::ARTICLE => progress.article = Some(value),
                    fields::FAILURE => progress.failure = Some(value),
                    _ => {}
                }
            }
        }

        Ok(progress)
    }

    pub fn links_resolved(&self) -> i64 {
        self.links_validated + self.links_failed
    }

    /// The gate: all answers counted, link total sealed, every link resolved.
    pub fn is_ready(&self) -> bool {
        self.answered_count == QUESTION_COUNT as i64
            && self
                .links_total
                .is_some_and(|total| self.links_resolved() == total)
    }

    pub fn valid_links(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|(_, status)| **status == LinkStatus::Valid)
            .map(|(url, _)| url.as_str())
    }

    pub fn pending_links(&self) -> impl Iterator<Item = &str> {
        self.links
            .iter()
            .filter(|(_, status)| **status == LinkStatus::Pending)
            .map(|(url, _)| url.as_str())
    }

    /// Short stage label for progress lines, e.g. `Answering 4/7`.
    pub fn stage(&self) -> String {
        match self.draft_status {
            DraftStatus::Complete => "Complete".to_string(),
            DraftStatus::Failed => "Failed".to_string(),
            DraftStatus::Queued => "Writing article".to_string(),
            DraftStatus::NotReady => match self.links_total {
                Some(total) if self.answered_count == QUESTION_COUNT as i64 => {
                    format!("Checking links {}/{}", self.links_resolved(), total)
                }
                _ => format!("Answering {}/{}", self.answered_count, QUESTION_COUNT),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_decode_record() {
        let progress = BillProgress::from_fields(
            "H.R.1",
            raw(&[
                ("answer:1", "first"),
                ("answer:2", "second"),
                ("answered_count", "2"),
                ("link:https://a.example", "valid"),
                ("link:https://b.example", "pending"),
                ("links_validated", "1"),
                ("draft_status", "not_ready"),
            ]),
        )
        .unwrap();

        assert_eq!(progress.answers.len(), 2);
        assert_eq!(progress.answered_count, 2);
        assert_eq!(progress.links_total, None);
        assert_eq!(progress.valid_links().collect::<Vec<_>>(), vec!["https://a.example"]);
        assert_eq!(progress.pending_links().count(), 1);
        assert_eq!(progress.stage(), "Answering 2/7");
        assert!(!progress.is_ready());
    }

    #[test]
    fn test_decode_rejects_bad_status() {
        let err = BillProgress::from_fields("H.R.1", raw(&[("draft_status", "done")])).unwrap_err();
        assert!(matches!(err, StoreError::Malformed { .. }));
    }

    #[test]
    fn test_gate_requires_sealed_total() {
        let mut progress = BillProgress {
            answered_count: 7,
            ..Default::default()
        };
        assert!(!progress.is_ready());

        progress.links_total = Some(0);
        assert!(progress.is_ready());

        progress.links_total = Some(2);
        progress.links_validated = 1;
        assert!(!progress.is_ready());
        assert_eq!(progress.stage(), "Checking links 1/2");

        progress.links_failed = 1;
        assert!(progress.is_ready());
    }

    #[test]
    fn test_draft_status_round_trip() {
        for status in [
            DraftStatus::NotReady,
            DraftStatus::Queued,
            DraftStatus::Complete,
            DraftStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<DraftStatus>().unwrap(), status);
        }
        assert!(DraftStatus::Failed.is_terminal());
        assert!(!DraftStatus::Queued.is_terminal());
    }
}
