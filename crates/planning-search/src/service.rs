//! The Search Service (§4.10, C10): compiles requests into ES query bodies,
//! runs semantic/natural-language search via the Embedding Service and NLP
//! Query Parser, and serves aggregations/trends/location stats.

use std::sync::Arc;

use planning_capabilities::{parse_query, QueryIntent};
use planning_core::{EsGateway, KnnQuery, Result, SearchRequest};
use planning_embeddings::EmbeddingService;
use serde_json::json;

use crate::aggregations::aggregation_tree;
use crate::query::{compile, compile_filters, SearchFilters, SearchQuery};
use crate::results::SearchResults;
use crate::trends::{league_table_aggregation, parse_league_table, parse_monthly_trend, LeagueEntry, MonthlyBucket, TrendsType};

const MIN_KNN_CANDIDATES: usize = 100;
const KNN_CANDIDATE_MULTIPLIER: usize = 10;

/// Intents the NLP Query Parser can assign that call for an embedding-based
/// similarity search rather than a literal term match.
fn is_semantic_intent(intent: QueryIntent) -> bool {
    matches!(intent, QueryIntent::Explore | QueryIntent::Analyze)
}

pub struct SearchService {
    es: Arc<dyn EsGateway>,
    embeddings: Arc<EmbeddingService>,
}

impl SearchService {
    #[must_use]
    pub fn new(es: Arc<dyn EsGateway>, embeddings: Arc<EmbeddingService>) -> Self {
        Self { es, embeddings }
    }

    /// `Search(request)` (§4.10): compiles the request and runs it verbatim.
    pub async fn search(&self, request: &SearchQuery) -> Result<SearchResults> {
        let compiled = compile(request);
        let response = self.es.search(compiled).await?;
        let mut results = SearchResults::from(response);
        results.page = request.page.max(1);
        results.page_size = request.page_size.min(100).max(1);
        Ok(results)
    }

    /// `SemanticSearch(query, k, filters?)` (§4.10).
    pub async fn semantic_search(&self, query_text: &str, k: usize, filters: &SearchFilters) -> Result<SearchResults> {
        let embedding = self.embeddings.generate_text_embedding(query_text).await?;
        let filter_clauses = compile_filters(filters);
        let filter = if filter_clauses.is_empty() { None } else { Some(json!({ "bool": { "filter": filter_clauses } })) };

        let knn = KnnQuery {
            field: "description_embedding".to_string(),
            vector: embedding.embedding,
            k,
            num_candidates: (KNN_CANDIDATE_MULTIPLIER * k).max(MIN_KNN_CANDIDATES),
            filter,
        };

        let response = self.es.knn_search(knn).await?;
        let mut results = SearchResults::from(response);
        for hit in &mut results.hits {
            hit.similarity_score = hit.score.map(f64::from);
        }
        Ok(results)
    }

    /// `NaturalLanguageSearch(query, k, filters?)` (§4.10): routes to semantic
    /// search when the parsed intent calls for it and embeddings are available,
    /// otherwise runs the NLP parser's compiled ES query directly.
    pub async fn natural_language_search(&self, query_text: &str, k: usize, filters: &SearchFilters) -> Result<SearchResults> {
        let parsed = parse_query(query_text);

        if is_semantic_intent(parsed.intent) {
            return self.semantic_search(query_text, k, filters).await;
        }

        let response = self
            .es
            .search(SearchRequest {
                query: Some(parsed.elasticsearch_query),
                size: k as u64,
                ..Default::default()
            })
            .await?;
        Ok(SearchResults::from(response))
    }

    /// `Aggregations(filters?)` (§4.10): the pre-declared aggregation tree,
    /// optionally scoped to `filters`.
    pub async fn aggregations(&self, filters: Option<&SearchFilters>) -> Result<serde_json::Value> {
        let query = filters.map(|f| {
            json!({ "bool": { "filter": compile_filters(f) } })
        });
        self.es.aggregations(aggregation_tree(), query).await
    }

    /// `TrendsDashboard(type, period, scope?)` (§4.10): current-period league
    /// table compared against the same bucket's previous-period volume.
    pub async fn trends_dashboard(&self, trends_type: TrendsType, current_period_query: serde_json::Value, previous_period_query: serde_json::Value, top_n: usize) -> Result<(Vec<MonthlyBucket>, Vec<LeagueEntry>)> {
        let aggs = league_table_aggregation(trends_type, top_n);

        let current = self.es.aggregations(aggs.clone(), Some(current_period_query)).await?;
        let previous = self.es.aggregations(aggs, Some(previous_period_query)).await?;

        let previous_totals = parse_league_table(&previous, &std::collections::HashMap::new())
            .into_iter()
            .map(|entry| (entry.name, entry.total))
            .collect();

        let monthly_trend = parse_monthly_trend(&current);
        let league_table = parse_league_table(&current, &previous_totals);
        Ok((monthly_trend, league_table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explore_keyword_routes_semantic() {
        let parsed = parse_query("explore developments near the river");
        assert!(is_semantic_intent(parsed.intent));
    }

    #[test]
    fn status_keyword_routes_literal() {
        let parsed = parse_query("approved applications in Camden");
        assert!(!is_semantic_intent(parsed.intent));
    }
}
