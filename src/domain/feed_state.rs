use std::collections::HashSet;

use serde::Serialize;

use crate::domain::{Article, ArticleId};
use crate::errors::ErrorKind;

/// Accumulated feed plus load state. Owned by a single `FeedLoader`.
#[derive(Debug)]
pub struct FeedState {
    articles: Vec<Article>,
    seen: HashSet<ArticleId>,
    loading: bool,
    initial_loading: bool,
    error: Option<ErrorKind>,
    consecutive_failures: u32,
}

/// Owned, read-only copy of the feed for the rendering side.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSnapshot {
    pub articles: Vec<Article>,
    pub loading: bool,
    pub initial_loading: bool,
    pub error: Option<ErrorKind>,
    pub consecutive_failures: u32,
}

impl FeedState {
    pub fn new() -> Self {
        Self {
            articles: Vec::new(),
            seen: HashSet::new(),
            loading: false,
            initial_loading: true,
            error: None,
            consecutive_failures: 0,
        }
    }

    /// Append articles whose id is not already present, keeping batch order.
    /// Returns how many were appended.
    pub fn merge(&mut self, batch: Vec<Article>) -> usize {
        let before = self.articles.len();
        for article in batch {
            if self.seen.insert(article.id.clone()) {
                self.articles.push(article);
            }
        }
        self.articles.len() - before
    }

    pub fn begin_load(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self, kind: ErrorKind) {
        self.consecutive_failures += 1;
        self.error = Some(kind);
    }

    /// Runs once per load, whatever the outcome.
    pub fn finish_load(&mut self) {
        self.loading = false;
        self.initial_loading = false;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_initial_loading(&self) -> bool {
        self.initial_loading
    }

    pub fn error(&self) -> Option<&ErrorKind> {
        self.error.as_ref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            articles: self.articles.clone(),
            loading: self.loading,
            initial_loading: self.initial_loading,
            error: self.error.clone(),
            consecutive_failures: self.consecutive_failures,
        }
    }
}

impl Default for FeedState {
    fn default() -> Self {
        Self::new()
    }
}
