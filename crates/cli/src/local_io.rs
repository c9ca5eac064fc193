//! File-backed data source and sink.
//!
//! Concrete mailbox and document-store integrations live behind the
//! capability traits; for local use the collect stage reads items from a
//! JSONL file and the publish stage writes markdown pages into a directory.

use async_trait::async_trait;
use deskhand_core::error::IntegrationError;
use deskhand_core::interfaces::{
    ExternalDataSource, ExternalSink, PageDraft, SourceItem, TimeRange,
};
use std::path::PathBuf;
use tracing::warn;

/// Reads `SourceItem` records from a JSONL file, one per line.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ExternalDataSource for FileSource {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        range: &TimeRange,
    ) -> Result<Vec<SourceItem>, IntegrationError> {
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| IntegrationError::SearchFailed(format!("{}: {e}", self.path.display())))?;

        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|t| !t.contains(':')) // skip operator-style tokens
            .collect();

        let mut items: Vec<SourceItem> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<SourceItem>(line) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed source item");
                    None
                }
            })
            .filter(|item| {
                item.received_at >= range.since
                    && range.until.is_none_or(|until| item.received_at <= until)
            })
            .filter(|item| {
                let haystack = format!("{} {}", item.title, item.body).to_lowercase();
                terms.is_empty() || terms.iter().any(|t| haystack.contains(t))
            })
            .collect();

        items.sort_by_key(|i| i.received_at);
        items.truncate(limit);
        Ok(items)
    }
}

/// Writes pages as markdown files into a directory.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn slug(title: &str) -> String {
        let slug: String = title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        slug.trim_matches('-').replace("--", "-")
    }
}

#[async_trait]
impl ExternalSink for DirectorySink {
    async fn create_page(&self, draft: &PageDraft) -> Result<String, IntegrationError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| IntegrationError::PublishFailed(e.to_string()))?;

        let page_id = format!(
            "{}-{}",
            Self::slug(&draft.title),
            chrono::Utc::now().format("%Y%m%d%H%M%S")
        );
        let path = self.dir.join(format!("{page_id}.md"));

        let mut body = format!("# {}\n\n", draft.title);
        if !draft.tags.is_empty() {
            body.push_str(&format!("tags: {}\n\n", draft.tags.join(", ")));
        }
        body.push_str(&draft.content);
        body.push('\n');

        std::fs::write(&path, body)
            .map_err(|e| IntegrationError::PublishFailed(e.to_string()))?;
        Ok(page_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::io::Write;

    fn write_items(items: &[SourceItem]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        for item in items {
            writeln!(tmp, "{}", serde_json::to_string(item).unwrap()).unwrap();
        }
        tmp
    }

    fn item(title: &str, body: &str, days_ago: i64) -> SourceItem {
        SourceItem {
            id: title.into(),
            title: title.into(),
            body: body.into(),
            received_at: Utc::now() - Duration::days(days_ago),
        }
    }

    #[tokio::test]
    async fn search_filters_by_terms_and_window() {
        let tmp = write_items(&[
            item("Acme invoice", "invoice for March", 2),
            item("Acme invoice old", "invoice for January", 40),
            item("Lunch plans", "tacos on Friday", 1),
        ]);
        let source = FileSource::new(tmp.path().to_path_buf());

        let items = source
            .search("invoice newer_than:7d", 10, &TimeRange::last_days(7))
            .await
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Acme invoice");
    }

    #[tokio::test]
    async fn search_respects_limit_and_order() {
        let tmp = write_items(&[
            item("report c", "weekly report", 1),
            item("report a", "weekly report", 5),
            item("report b", "weekly report", 3),
        ]);
        let source = FileSource::new(tmp.path().to_path_buf());

        let items = source
            .search("report", 2, &TimeRange::last_days(30))
            .await
            .unwrap();

        assert_eq!(items.len(), 2);
        // Oldest first within the window.
        assert_eq!(items[0].title, "report a");
        assert_eq!(items[1].title, "report b");
    }

    #[tokio::test]
    async fn missing_source_file_is_an_error() {
        let source = FileSource::new(PathBuf::from("/tmp/deskhand_no_such_items.jsonl"));
        let err = source
            .search("anything", 10, &TimeRange::last_days(7))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::SearchFailed(_)));
    }

    #[tokio::test]
    async fn sink_writes_markdown_page() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(dir.path().to_path_buf());

        let page_id = sink
            .create_page(&PageDraft {
                title: "Digest: acme invoices".into(),
                content: "Two invoices arrived.".into(),
                parent_id: None,
                tags: vec!["digest".into()],
            })
            .await
            .unwrap();

        let path = dir.path().join(format!("{page_id}.md"));
        let written = std::fs::read_to_string(path).unwrap();
        assert!(written.contains("# Digest: acme invoices"));
        assert!(written.contains("tags: digest"));
        assert!(written.contains("Two invoices arrived."));
    }
}
