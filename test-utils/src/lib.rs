//! Shared test doubles and fixtures used across every Planning Explorer crate's
//! test suite (§A.4): in-memory `EsGateway`/`LlmClient` fakes, a
//! `PlanningApplication` builder, and a `wiremock`-based portal stub.

pub mod fake_es;
pub mod fake_llm;
pub mod fixtures;
pub mod portal_stub;

pub use fake_es::FakeEsGateway;
pub use fake_llm::FakeLlmClient;
pub use fixtures::{sample_application, ApplicationFixtureExt};
pub use portal_stub::{idox_details_page, stub_portal_page};
