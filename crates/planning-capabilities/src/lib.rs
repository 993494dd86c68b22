//! The five AI Capabilities (§4.5, C5) consumed by the AI Orchestrator: the
//! Opportunity Scorer, Document Summarizer, NLP Query Parser, Market
//! Intelligence engine, and the applicant/agent Enricher.

pub mod enrichment;
pub mod market_intelligence;
pub mod nlp_query;
pub mod opportunity;
pub mod summarizer;

pub use enrichment::{detect_portal_type, validate_field, Enricher, ExtractionResult, PortalType};
pub use market_intelligence::{AnalysisPeriod, MarketIntelligenceEngine, MarketIntelligenceReport, SegmentMetrics, Trend, TrendDirection};
pub use nlp_query::{parse_query, ParsedQuery, QueryIntent};
pub use opportunity::{OpportunityResult, OpportunityScorer};
pub use summarizer::{DocumentSummarizer, Sentiment, SummaryLength, SummaryResult, SummaryType};
