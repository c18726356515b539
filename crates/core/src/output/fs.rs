//! Filesystem output: `articles.json`, `summary.json` and one markdown file
//! per article under `articles/`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::info;

use crate::task::BillId;

use super::types::{Article, OutputError, RunSummary};
use super::OutputCollector;

pub struct FsOutputCollector {
    dir: PathBuf,
}

impl FsOutputCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn markdown_name(bill_id: &str) -> String {
        match bill_id.parse::<BillId>() {
            Ok(id) => format!("{}.md", id.file_stem()),
            Err(_) => format!("{}.md", bill_id.replace(['.', '/', '\\'], "_")),
        }
    }
}

/// Markdown rendering of one article. Content that already opens with the
/// article's header is written as is.
pub fn render_markdown(article: &Article) -> String {
    let header = article.markdown_header();
    let content = article.article_content.trim_end();
    if content.starts_with(&header) {
        format!("{}\n", content)
    } else {
        format!("{}{}\n", header, content)
    }
}

#[async_trait]
impl OutputCollector for FsOutputCollector {
    async fn write(&self, articles: &[Article], summary: &RunSummary) -> Result<(), OutputError> {
        let md_dir = self.dir.join("articles");
        fs::create_dir_all(&md_dir).await?;

        fs::write(
            self.dir.join("articles.json"),
            serde_json::to_string_pretty(articles)?,
        )
        .await?;
        fs::write(
            self.dir.join("summary.json"),
            serde_json::to_string_pretty(summary)?,
        )
        .await?;

        for article in articles {
            fs::write(
                md_dir.join(Self::markdown_name(&article.bill_id)),
                render_markdown(article),
            )
            .await?;
        }

        info!(
            dir = %self.dir.display(),
            articles = articles.len(),
            "Run output written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn article() -> Article {
        Article {
            bill_id: "S.RES.412".into(),
            bill_title: "A resolution designating a week".into(),
            sponsor_bioguide_id: None,
            bill_committee_ids: vec!["ssju00".into(), "ssga00".into()],
            article_content: "Body text.\n\n".into(),
        }
    }

    #[test]
    fn test_render_markdown() {
        let md = render_markdown(&article());
        assert!(md.starts_with("# A resolution designating a week\n\n**Bill ID**: S.RES.412\n\n"));
        assert!(md.contains("**Sponsor**: Unknown\n\n"));
        assert!(md.contains("**Committees**: ssju00, ssga00\n\n---\n\nBody text.\n"));
    }

    #[test]
    fn test_render_markdown_keeps_composed_header_once() {
        let mut article = article();
        article.article_content = format!("{}## Overview\n\nBody text.\n", article.markdown_header());

        let md = render_markdown(&article);
        assert_eq!(md.matches("**Bill ID**").count(), 1);
        assert!(md.starts_with("# A resolution designating a week\n\n**Bill ID**: S.RES.412\n\n"));
        assert!(md.ends_with("---\n\n## Overview\n\nBody text.\n"));
    }

    #[tokio::test]
    async fn test_write_outputs() {
        let temp_dir = tempfile::tempdir().unwrap();
        let collector = FsOutputCollector::new(temp_dir.path().join("out"));
        let articles = vec![article()];
        let summary = RunSummary::from_articles(&articles, 1, Duration::from_secs(3));

        collector.write(&articles, &summary).await.unwrap();

        let out = temp_dir.path().join("out");
        let written: Vec<Article> =
            serde_json::from_str(&std::fs::read_to_string(out.join("articles.json")).unwrap()).unwrap();
        assert_eq!(written, articles);

        let summary_json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary_json["bills_processed"], 1);
        assert_eq!(summary_json["completion_rate"], 100.0);

        assert!(out.join("articles").join("S_RES_412.md").exists());
    }
}
