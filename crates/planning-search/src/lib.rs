//! The Search Service (§4.10, C10): ES query compilation, semantic and
//! natural-language search, aggregations, trends, and location statistics.

pub mod aggregations;
pub mod location;
pub mod query;
pub mod results;
pub mod service;
pub mod trends;

pub use location::{resolve_center, LocationStatsService, NamedCenter};
pub use query::{compile, SearchFilters, SearchQuery, SortBy, SortOrder};
pub use results::{SearchHit, SearchResults};
pub use service::SearchService;
pub use trends::{LeagueEntry, MonthlyBucket, Overview, TrendsDashboard, TrendsType};
