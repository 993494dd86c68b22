//! Index mapping for the `planning_applications` index (§6.1).

use serde_json::{json, Value as JsonValue};

pub const DEFAULT_INDEX_NAME: &str = "planning_applications";

/// Builds the index mapping body used by `ensure_index`: keyword fields for
/// exact-match filters, English-analyzed text for free-text search, dense
/// vectors (D=1536, cosine, indexed) for kNN, and a geo_point for radius
/// queries (§6.1).
#[must_use]
pub fn planning_applications_mapping(embedding_dimensions: usize) -> JsonValue {
    let dense_vector = |dims: usize| {
        json!({
            "type": "dense_vector",
            "dims": dims,
            "index": true,
            "similarity": "cosine"
        })
    };

    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "properties": {
                "application_id": { "type": "keyword" },
                "reference": { "type": "keyword" },
                "authority": { "type": "keyword" },
                "status": { "type": "keyword" },
                "decision": { "type": "keyword" },
                "development_type": { "type": "keyword" },
                "application_type": { "type": "keyword" },
                "ward": { "type": "keyword" },
                "postcode": { "type": "keyword" },
                "embedding_model": { "type": "keyword" },
                "embedding_priority": { "type": "keyword" },

                "description": { "type": "text", "analyzer": "english" },
                "proposal": { "type": "text", "analyzer": "english" },
                "ai_summary": { "type": "text", "analyzer": "english" },
                "ai_rationale": { "type": "text", "analyzer": "english" },

                "submission_date": { "type": "date" },
                "validation_date": { "type": "date" },
                "decision_date": { "type": "date" },
                "decided_date": { "type": "date" },
                "target_decision_date": { "type": "date" },
                "embedding_generated_at": { "type": "date" },
                "ai_processed_at": { "type": "date" },
                "created_at": { "type": "date" },
                "updated_at": { "type": "date" },

                "location": { "type": "geo_point" },

                "opportunity_score": { "type": "integer" },
                "approval_probability": { "type": "float" },
                "project_value": { "type": "float" },
                "floor_area": { "type": "float" },
                "n_documents": { "type": "integer" },
                "n_statutory_days": { "type": "integer" },
                "decision_days": { "type": "integer" },

                "description_embedding": dense_vector(embedding_dimensions),
                "full_content_embedding": dense_vector(embedding_dimensions),
                "summary_embedding": dense_vector(embedding_dimensions),
                "location_embedding": dense_vector(embedding_dimensions)
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapping_sets_requested_vector_dimensions() {
        let mapping = planning_applications_mapping(1536);
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["description_embedding"]["dims"], json!(1536));
        assert_eq!(props["description_embedding"]["similarity"], json!("cosine"));
    }

    #[test]
    fn mapping_declares_all_four_vector_fields() {
        let mapping = planning_applications_mapping(1536);
        let props = &mapping["mappings"]["properties"];
        for field in [
            "description_embedding",
            "full_content_embedding",
            "summary_embedding",
            "location_embedding",
        ] {
            assert_eq!(props[field]["type"], json!("dense_vector"), "{field} missing");
        }
    }

    #[test]
    fn mapping_declares_geo_point_location() {
        let mapping = planning_applications_mapping(1536);
        assert_eq!(
            mapping["mappings"]["properties"]["location"]["type"],
            json!("geo_point")
        );
    }
}
