//! Context Gatherer (L13): assembles the relevant-files context handed to
//! strategies, scored by keyword overlap against the task description.
//!
//! Pluggable behind [`ContextGatherer`] so a future embedding-based
//! retriever can replace the heuristic without touching strategies.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, warn};

/// One relevant file handed to a strategy.
#[derive(Debug, Clone)]
pub struct RelevantFile {
    pub path: String,
    pub content: String,
}

/// The bounded context assembled for a single task execution.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutionContext {
    pub files: Vec<RelevantFile>,
}

/// Source of relevant-file context for a strategy. Implementations may
/// scan the working tree (the default), query an embedding index, or
/// return a fixed fixture (tests).
#[async_trait]
pub trait ContextGatherer: Send + Sync {
    async fn gather(&self, title: &str, description: &str) -> Result<TaskExecutionContext>;
}

/// Keyword-overlap relevance scorer over glob-expanded source roots.
pub struct KeywordContextGatherer {
    project_root: PathBuf,
    source_globs: Vec<String>,
    max_files: usize,
    excerpt_bytes: usize,
}

impl KeywordContextGatherer {
    pub fn new(project_root: impl Into<PathBuf>, source_globs: Vec<String>, max_files: usize) -> Self {
        Self {
            project_root: project_root.into(),
            source_globs,
            max_files,
            excerpt_bytes: 4096,
        }
    }

    fn candidate_files(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for pattern in &self.source_globs {
            let full_pattern = self.project_root.join(pattern);
            let full_pattern = full_pattern.to_string_lossy().into_owned();
            let entries = match glob::glob(&full_pattern) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(pattern = %full_pattern, error = %e, "gatherer: invalid glob pattern");
                    continue;
                }
            };
            for entry in entries.flatten() {
                if entry.is_file() && seen.insert(entry.clone()) {
                    out.push(entry);
                }
            }
        }
        out
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

fn score(keywords: &HashSet<String>, path: &Path, excerpt: &str) -> usize {
    let path_tokens = tokenize(&path.to_string_lossy());
    let content_tokens = tokenize(excerpt);
    let path_hits = keywords.intersection(&path_tokens).count() * 3;
    let content_hits = keywords.intersection(&content_tokens).count();
    path_hits + content_hits
}

#[async_trait]
impl ContextGatherer for KeywordContextGatherer {
    async fn gather(&self, title: &str, description: &str) -> Result<TaskExecutionContext> {
        let keywords = tokenize(&format!("{title} {description}"));
        let candidates = self.candidate_files();
        debug!(candidates = candidates.len(), "gatherer: scanning candidate files");

        let mut scored: Vec<(usize, PathBuf, String)> = Vec::new();
        for path in candidates {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "gatherer: skipping unreadable file");
                    continue;
                }
            };
            let excerpt: String = content.chars().take(self.excerpt_bytes).collect();
            let s = score(&keywords, &path, &excerpt);
            if s > 0 {
                scored.push((s, path, content));
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.max_files);

        let files = scored
            .into_iter()
            .map(|(_, path, content)| {
                let relative = path
                    .strip_prefix(&self.project_root)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                RelevantFile { path: relative, content }
            })
            .collect();

        Ok(TaskExecutionContext { files })
    }
}

/// A gatherer that always returns an empty context, used when no project
/// root is configured (e.g. tasks with no working tree) and by tests.
pub struct EmptyContextGatherer;

#[async_trait]
impl ContextGatherer for EmptyContextGatherer {
    async fn gather(&self, _title: &str, _description: &str) -> Result<TaskExecutionContext> {
        Ok(TaskExecutionContext::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn scores_files_by_keyword_overlap() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("auth.rs"), "fn login() { /* oauth handshake */ }").unwrap();
        fs::write(dir.path().join("unrelated.rs"), "fn noop() {}").unwrap();

        let gatherer = KeywordContextGatherer::new(dir.path(), vec!["**/*.rs".to_string()], 5);
        let ctx = gatherer.gather("Fix OAuth login bug", "users cannot log in via oauth").await.unwrap();

        assert_eq!(ctx.files.len(), 1);
        assert_eq!(ctx.files[0].path, "auth.rs");
    }

    #[tokio::test]
    async fn caps_at_max_files() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            fs::write(dir.path().join(format!("file{i}.rs")), "login oauth token").unwrap();
        }
        let gatherer = KeywordContextGatherer::new(dir.path(), vec!["**/*.rs".to_string()], 2);
        let ctx = gatherer.gather("login", "oauth token handling").await.unwrap();
        assert_eq!(ctx.files.len(), 2);
    }

    #[tokio::test]
    async fn empty_gatherer_returns_no_files() {
        let ctx = EmptyContextGatherer.gather("anything", "anything").await.unwrap();
        assert!(ctx.files.is_empty());
    }
}
