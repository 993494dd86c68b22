//! Result shapes shared by text, semantic, and natural-language search (§4.10:
//! "return results shaped identically to text search").

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f32>,
    pub source: JsonValue,
    #[serde(default)]
    pub similarity_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

impl From<planning_core::SearchResponse> for SearchResults {
    fn from(response: planning_core::SearchResponse) -> Self {
        Self {
            hits: response
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.id,
                    score: hit.score,
                    source: hit.source,
                    similarity_score: None,
                })
                .collect(),
            total: response.total,
            page: 1,
            page_size: 0,
        }
    }
}
