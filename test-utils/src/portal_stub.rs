//! A `wiremock`-based HTTP stub for enrichment tests (§4.5.5, C5), so tests
//! exercising `Enricher` never reach a real council portal.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Starts a mock server and stubs a single GET route returning `body` with
/// `200 OK`. Returns the server so the caller can build a URL against it and
/// keep it alive for the duration of the test.
pub async fn stub_portal_page(path_and_query: &str, body: &str) -> MockServer {
    let server = MockServer::start().await;
    let (route_path, _) = path_and_query.split_once('?').unwrap_or((path_and_query, ""));
    Mock::given(method("GET"))
        .and(path(route_path))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

/// An Idox PublicAccess-style `<th>`/`<td>` details page with the seven
/// extraction fields §4.5.5 names, for exercising [`crate::fake_llm`]-free
/// extraction paths.
#[must_use]
pub fn idox_details_page() -> String {
    r"<html><body><table>
        <tr><th>Applicant Name</th><td>Jane Smith</td></tr>
        <tr><th>Agent Name</th><td>Acme Planning Consultants</td></tr>
        <tr><th>Ward</th><td>Town and Pier</td></tr>
        <tr><th>Decided Date</th><td>12.03.2024</td></tr>
        <tr><th>Number of Documents</th><td>7</td></tr>
        <tr><th>Statutory Days</th><td>56</td></tr>
    </table></body></html>"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stubbed_page_is_reachable_over_http() {
        let server = stub_portal_page("/online-applications/details.do", &idox_details_page()).await;
        let url = format!("{}/online-applications/details.do?activeTab=details", server.uri());
        let body = reqwest::get(&url).await.unwrap().text().await.unwrap();
        assert!(body.contains("Jane Smith"));
    }
}
