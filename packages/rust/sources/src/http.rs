//! Shared HTTP plumbing: client construction and failure classification.
//!
//! Every adapter funnels reqwest errors and HTTP statuses through
//! [`classify_send_error`] and [`check_status`], so the retry layer sees a
//! [`FailureKind`](companyinfo_shared::FailureKind) instead of a message.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;

use companyinfo_shared::{CompanyInfoError, HttpConfig, Result};

/// Build the client used for the tabular sources.
pub fn build_client(config: &HttpConfig) -> Result<Client> {
    client_builder(&config.user_agent, config.timeout(), config.accept_invalid_certs)
        .build()
        .map_err(|e| CompanyInfoError::Network(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn client_builder(
    user_agent: &str,
    timeout: Duration,
    accept_invalid_certs: bool,
) -> reqwest::ClientBuilder {
    Client::builder()
        .user_agent(user_agent)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
}

/// Map a transport-level reqwest error onto the error taxonomy.
pub fn classify_send_error(url: &str, err: reqwest::Error) -> CompanyInfoError {
    if err.is_timeout() {
        CompanyInfoError::Timeout(format!("{url}: {err}"))
    } else if err.is_connect() || err.is_request() || err.is_body() || err.is_decode() {
        CompanyInfoError::Transient(format!("{url}: {err}"))
    } else {
        CompanyInfoError::Network(format!("{url}: {err}"))
    }
}

/// Reject non-success statuses with the matching failure class.
///
/// 429 and 503 signal overload, other 5xx are transient, everything else is terminal.
pub fn check_status(url: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    let message = format!("{url}: HTTP {status}");
    Err(match status {
        StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
            CompanyInfoError::Overloaded(message)
        }
        s if s.is_server_error() => CompanyInfoError::Transient(message),
        _ => CompanyInfoError::Network(message),
    })
}

/// GET `url` and decode the body, falling back to `default_charset` when the
/// response does not declare one.
pub async fn fetch_text(client: &Client, url: &str, default_charset: &str) -> Result<String> {
    debug!(%url, "fetching");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_send_error(url, e))?;

    check_status(url, response.status())?;

    response
        .text_with_charset(default_charset)
        .await
        .map_err(|e| classify_send_error(url, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use companyinfo_shared::FailureKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn status_classes() {
        assert!(check_status("u", StatusCode::OK).is_ok());

        let kind = |s| check_status("u", s).unwrap_err().failure_kind();
        assert_eq!(kind(StatusCode::TOO_MANY_REQUESTS), FailureKind::Overloaded);
        assert_eq!(kind(StatusCode::SERVICE_UNAVAILABLE), FailureKind::Overloaded);
        assert_eq!(kind(StatusCode::BAD_GATEWAY), FailureKind::Transient);
        assert_eq!(kind(StatusCode::NOT_FOUND), FailureKind::Terminal);
        assert_eq!(kind(StatusCode::FORBIDDEN), FailureKind::Terminal);
    }

    #[tokio::test]
    async fn fetch_text_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<p>台積電</p>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let client = build_client(&HttpConfig::default()).unwrap();
        let body = fetch_text(&client, &format!("{}/page", server.uri()), "utf-8")
            .await
            .unwrap();
        assert_eq!(body, "<p>台積電</p>");
    }

    #[tokio::test]
    async fn fetch_text_maps_overload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = build_client(&HttpConfig::default()).unwrap();
        let err = fetch_text(&client, &server.uri(), "utf-8").await.unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Overloaded);
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = build_client(&HttpConfig::default()).unwrap();
        let err = fetch_text(&client, &format!("http://127.0.0.1:{port}/"), "utf-8")
            .await
            .unwrap_err();
        assert!(err.failure_kind().is_retryable());
    }
}
