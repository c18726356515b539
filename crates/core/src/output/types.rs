use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::links::count_markdown_links;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A finished article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub bill_id: String,
    pub bill_title: String,
    #[serde(default)]
    pub sponsor_bioguide_id: Option<String>,
    #[serde(default)]
    pub bill_committee_ids: Vec<String>,
    pub article_content: String,
}

impl Article {
    /// Heading and metadata block that open the markdown rendering.
    pub fn markdown_header(&self) -> String {
        format!(
            "# {}\n\n**Bill ID**: {}\n\n**Sponsor**: {}\n\n**Committees**: {}\n\n---\n\n",
            self.bill_title,
            self.bill_id,
            self.sponsor_bioguide_id.as_deref().unwrap_or("Unknown"),
            self.bill_committee_ids.join(", ")
        )
    }

    pub fn word_count(&self) -> usize {
        self.article_content.split_whitespace().count()
    }

    pub fn link_count(&self) -> usize {
        count_markdown_links(&self.article_content)
    }
}

/// Aggregate figures for one run, written as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub bills_processed: usize,
    pub total_bills: usize,
    /// Percentage of target bills with an article.
    pub completion_rate: f64,
    pub total_time_seconds: f64,
    pub average_time_per_bill: f64,
    pub total_words: usize,
    pub total_links: usize,
    #[serde(default)]
    pub incomplete_bills: Vec<String>,
    #[serde(default)]
    pub failed_bills: Vec<String>,
    #[serde(default)]
    pub timed_out: bool,
}

impl RunSummary {
    pub fn from_articles(articles: &[Article], total_bills: usize, elapsed: Duration) -> Self {
        let processed = articles.len();
        let total_time_seconds = elapsed.as_secs_f64();
        Self {
            bills_processed: processed,
            total_bills,
            completion_rate: if total_bills == 0 {
                0.0
            } else {
                processed as f64 / total_bills as f64 * 100.0
            },
            total_time_seconds,
            average_time_per_bill: if processed == 0 {
                0.0
            } else {
                total_time_seconds / processed as f64
            },
            total_words: articles.iter().map(Article::word_count).sum(),
            total_links: articles.iter().map(Article::link_count).sum(),
            incomplete_bills: Vec::new(),
            failed_bills: Vec::new(),
            timed_out: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(content: &str) -> Article {
        Article {
            bill_id: "H.R.1".into(),
            bill_title: "Lower Energy Costs Act".into(),
            sponsor_bioguide_id: Some("S001176".into()),
            bill_committee_ids: vec!["hsii00".into()],
            article_content: content.into(),
        }
    }

    #[test]
    fn test_summary_figures() {
        let articles = vec![
            article("one two [three](https://a.example)"),
            article("four five"),
        ];
        let summary = RunSummary::from_articles(&articles, 4, Duration::from_secs(10));

        assert_eq!(summary.bills_processed, 2);
        assert_eq!(summary.completion_rate, 50.0);
        assert_eq!(summary.average_time_per_bill, 5.0);
        assert_eq!(summary.total_words, 5);
        assert_eq!(summary.total_links, 1);
    }

    #[test]
    fn test_empty_run() {
        let summary = RunSummary::from_articles(&[], 0, Duration::ZERO);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.average_time_per_bill, 0.0);
    }
}
