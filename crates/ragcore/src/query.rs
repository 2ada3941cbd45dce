//! Query record and source citation types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A retrieved fragment cited in a [`QueryRecord`] answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub doc_id: String,
    pub score: f64,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Sort sources by descending score, breaking ties by ascending doc id
/// (lexicographic), so results are deterministic across identical queries.
pub fn sort_sources(sources: &mut [Source]) {
    sources.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}

/// A completed query, persisted for `/query/history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub area_ids: Vec<String>,
    #[serde(default)]
    pub include_personal: bool,
    #[serde(default)]
    pub provider_id: Option<String>,
    pub answer: String,
    pub sources: Vec<Source>,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str, score: f64) -> Source {
        Source {
            doc_id: id.into(),
            score,
            text: String::new(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn sorts_by_descending_score() {
        let mut sources = vec![source("a", 0.1), source("b", 0.9), source("c", 0.5)];
        sort_sources(&mut sources);
        let ids: Vec<_> = sources.iter().map(|s| s.doc_id.clone()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn ties_break_by_doc_id_lexicographically() {
        let mut sources = vec![source("z", 0.5), source("a", 0.5), source("m", 0.5)];
        sort_sources(&mut sources);
        let ids: Vec<_> = sources.iter().map(|s| s.doc_id.clone()).collect();
        assert_eq!(ids, vec!["a", "m", "z"]);
    }
}
