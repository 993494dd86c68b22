//! The concrete Elasticsearch Gateway (§4.1, C1): a single chokepoint for all
//! index access, built on the official `elasticsearch` client.

mod gateway;
mod mapping;

pub use gateway::ElasticsearchGateway;
pub use mapping::{planning_applications_mapping, DEFAULT_INDEX_NAME};
