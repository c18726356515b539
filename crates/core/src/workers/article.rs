//! Assembles the article once the readiness gate has passed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::legislative::{BillResource, LegislativeError, LegislativeSource};
use crate::links::retain_links;
use crate::output::Article;
use crate::pool::{HandlerError, TaskContext, TaskHandler};
use crate::progress::{BillProgress, DraftStatus, LinkStatus, ProgressTracker};
use crate::task::{topics, Outgoing, Task, TaskKind, TaskPayload, QUESTIONS};

use super::{parse_bill, BillMetadata};

pub struct ArticleHandler {
    tracker: ProgressTracker,
    source: Arc<dyn LegislativeSource>,
}

impl ArticleHandler {
    pub fn new(tracker: ProgressTracker, source: Arc<dyn LegislativeSource>) -> Self {
        Self { tracker, source }
    }

    async fn metadata(&self, task: &Task) -> Result<BillMetadata, HandlerError> {
        let bill = parse_bill(task)?;
        let record = self.source.fetch(&bill, BillResource::Bill).await?;
        let committees = match self.source.fetch(&bill, BillResource::Committees).await {
            Ok(value) => Some(value),
            Err(LegislativeError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(BillMetadata::from_documents(&record, committees.as_ref()))
    }

    /// Mark the bill failed and report the broken invariant.
    async fn violated(&self, bill_id: &str, reason: String) -> HandlerError {
        error!(bill_id, "Draft invariant violated: {}", reason);
        if let Err(e) = self.tracker.fail_bill(bill_id, &reason).await {
            error!(bill_id, "Could not mark bill failed: {}", e);
        }
        HandlerError::InvariantViolation(reason)
    }

    fn completed_event(bill_id: &str, article_json: &str) -> Outgoing {
        Outgoing {
            topic: topics::COMPLETED_ARTICLES,
            key: bill_id.to_string(),
            payload: article_json.to_string(),
        }
    }
}

/// Compose the article from the seven answers in question order. Links the
/// checker marked valid are kept; every other link is stripped.
pub fn compose_article(
    bill_id: &str,
    meta: &BillMetadata,
    progress: &BillProgress,
) -> Result<Article, String> {
    let missing: Vec<String> = QUESTIONS
        .iter()
        .filter(|q| !progress.answers.contains_key(&q.index))
        .map(|q| q.index.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(format!("answers missing for questions {}", missing.join(", ")));
    }

    let mut article = Article {
        bill_id: bill_id.to_string(),
        bill_title: meta.title.clone().unwrap_or_else(|| bill_id.to_string()),
        sponsor_bioguide_id: meta.sponsor_bioguide_id.clone(),
        bill_committee_ids: meta.committee_ids.clone(),
        article_content: String::new(),
    };

    let mut content = article.markdown_header();
    let is_valid = |url: &str| progress.links.get(url) == Some(&LinkStatus::Valid);
    for question in QUESTIONS.iter() {
        let answer = progress
            .answers
            .get(&question.index)
            .map(String::as_str)
            .unwrap_or_default();
        content.push_str(&format!(
            "## {}\n\n{}\n\n",
            question.heading,
            retain_links(answer.trim(), is_valid)
        ));
    }
    content.truncate(content.trim_end().len());
    content.push('\n');

    article.article_content = content;
    Ok(article)
}

#[async_trait]
impl TaskHandler for ArticleHandler {
    fn kind(&self) -> TaskKind {
        TaskKind::Draft
    }

    async fn handle(&self, task: &Task, ctx: &TaskContext) -> Result<Vec<Outgoing>, HandlerError> {
        if task.payload != TaskPayload::Draft {
            return Err(HandlerError::Malformed("not a draft task".to_string()));
        }
        let bill_id = task.bill_id.as_str();
        let progress = self.tracker.load(bill_id).await?;

        match progress.draft_status {
            DraftStatus::Queued => {}
            DraftStatus::Complete => {
                debug!(bill_id, "Article already complete");
                let replay = ctx.attempt > 0 || ctx.delivery_count > 1;
                return Ok(match (&progress.article, replay) {
                    (Some(article), true) => vec![Self::completed_event(bill_id, article)],
                    _ => Vec::new(),
                });
            }
            DraftStatus::Failed => {
                debug!(bill_id, "Bill already failed, dropping draft task");
                return Ok(Vec::new());
            }
            DraftStatus::NotReady => {
                return Err(self
                    .violated(bill_id, "draft task for a bill that never passed the gate".to_string())
                    .await);
            }
        }

        if !progress.is_ready() {
            return Err(self
                .violated(
                    bill_id,
                    format!("draft queued but gate not satisfied ({})", progress.stage()),
                )
                .await);
        }

        let meta = self.metadata(task).await?;
        let article = match compose_article(bill_id, &meta, &progress) {
            Ok(article) => article,
            Err(reason) => return Err(self.violated(bill_id, reason).await),
        };

        let article_json = serde_json::to_string(&article)?;
        let completed = self.tracker.complete_draft(bill_id, &article_json).await?;

        // A concurrent duplicate may have stored its copy first.
        let stored = if completed {
            info!(
                bill_id,
                words = article.word_count(),
                links = article.link_count(),
                "Article complete"
            );
            article_json
        } else {
            self.tracker
                .load(bill_id)
                .await?
                .article
                .unwrap_or(article_json)
        };

        Ok(vec![Self::completed_event(bill_id, &stored)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStateStore;
    use crate::task::QUESTION_COUNT;
    use crate::testing::fixtures;

    const CTX: TaskContext = TaskContext {
        attempt: 0,
        max_attempts: 3,
        delivery_count: 1,
    };

    const GOOD: &str = "https://www.congress.gov/bill/118th-congress/house-bill/1";
    const DEAD: &str = "https://www.congress.gov/nowhere";

    async fn ready_bill(tracker: &ProgressTracker) {
        tracker.reset("H.R.1").await.unwrap();
        tracker.register_link("H.R.1", GOOD).await.unwrap();
        tracker.register_link("H.R.1", DEAD).await.unwrap();
        for index in 1..=QUESTION_COUNT {
            let text = if index == 1 {
                format!("The [bill]({}) passed. See [this]({}) and {}.", GOOD, DEAD, DEAD)
            } else {
                format!("Answer {}.", index)
            };
            tracker.record_answer("H.R.1", index, &text).await.unwrap();
        }
        tracker.seal_links("H.R.1").await.unwrap();
        tracker.record_link_result("H.R.1", GOOD, true).await.unwrap();
        tracker.record_link_result("H.R.1", DEAD, false).await.unwrap();
        assert_eq!(
            tracker.try_queue_draft("H.R.1", "t-1").await.unwrap(),
            crate::progress::DraftClaim::Won
        );
    }

    fn handler(tracker: &ProgressTracker) -> ArticleHandler {
        ArticleHandler::new(tracker.clone(), Arc::new(fixtures::legislative_source()))
    }

    #[tokio::test]
    async fn test_article_keeps_only_valid_links() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        ready_bill(&tracker).await;

        let out = handler(&tracker)
            .handle(&Task::draft("H.R.1"), &CTX)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].topic, topics::COMPLETED_ARTICLES);

        let article: Article = serde_json::from_str(&out[0].payload).unwrap();
        assert!(article.article_content.contains(GOOD));
        assert!(!article.article_content.contains(DEAD));
        assert!(article.article_content.contains("See this and."));
        assert_eq!(article.bill_title, fixtures::BILL_TITLE);
        assert_eq!(article.sponsor_bioguide_id.as_deref(), Some(fixtures::SPONSOR_BIOGUIDE_ID));
        assert_eq!(article.bill_committee_ids, vec!["hsii00", "hsif00"]);

        let headings: Vec<_> = article
            .article_content
            .lines()
            .filter(|l| l.starts_with("## "))
            .collect();
        assert_eq!(headings.len(), 7);
        assert_eq!(headings[0], "## What the bill does");

        let header = format!(
            "# {}\n\n**Bill ID**: H.R.1\n\n**Sponsor**: {}\n\n**Committees**: hsii00, hsif00\n\n---\n\n## ",
            fixtures::BILL_TITLE,
            fixtures::SPONSOR_BIOGUIDE_ID
        );
        assert!(article.article_content.starts_with(&header));
        assert_eq!(crate::output::render_markdown(&article), article.article_content);

        let progress = tracker.load("H.R.1").await.unwrap();
        assert_eq!(progress.draft_status, DraftStatus::Complete);
    }

    #[tokio::test]
    async fn test_duplicate_draft_task_is_harmless() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        ready_bill(&tracker).await;
        let handler = handler(&tracker);

        handler.handle(&Task::draft("H.R.1"), &CTX).await.unwrap();
        let again = handler.handle(&Task::draft("H.R.1"), &CTX).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_missing_answer_is_invariant_violation() {
        let tracker = ProgressTracker::new(Arc::new(InMemoryStateStore::new()));
        tracker.reset("H.R.1").await.unwrap();
        // force the status past the gate without answers
        tracker
            .store()
            .set("bill:H.R.1", "draft_status", "queued")
            .await
            .unwrap();

        let err = handler(&tracker)
            .handle(&Task::draft("H.R.1"), &CTX)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::InvariantViolation(_)));

        let progress = tracker.load("H.R.1").await.unwrap();
        assert_eq!(progress.draft_status, DraftStatus::Failed);
        assert!(progress.failure.is_some());
    }

    #[test]
    fn test_compose_reports_missing_answers() {
        let progress = BillProgress {
            bill_id: "S.24".into(),
            ..Default::default()
        };
        let err = compose_article("S.24", &BillMetadata::default(), &progress).unwrap_err();
        assert!(err.contains("1, 2, 3, 4, 5, 6, 7"));
    }
}
