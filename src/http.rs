use crate::error::{Error, Result};
use reqwest::{Client, StatusCode, header};
use tracing::debug;

/// Thin reqwest wrapper. Failures are reported once; nothing is retried.
///
/// No request timeout is set: chat responses are read as a stream and may run
/// for as long as the provider keeps sending. Timeouts are whatever the
/// provider or the network enforces.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self { client })
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        debug!(url, "GET");
        let resp = self.send(self.client.get(url)).await?;
        resp.text().await.map_err(|e| Error::http(e.to_string()))
    }

    /// POST and hand back the successful response unread, for callers that
    /// consume the body as a byte stream.
    pub async fn post_json_response(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        debug!(url, bytes = body.len(), "POST");
        let mut req = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.to_string());
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        self.send(req).await
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = req.send().await.map_err(|e| Error::http(e.to_string()))?;
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    let url = resp.url().to_string();

    match status {
        StatusCode::OK | StatusCode::CREATED | StatusCode::ACCEPTED => Ok(resp),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = resp
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            Err(Error::RateLimit {
                platform: extract_domain(&url),
                retry_after_secs: retry_after,
            })
        }
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(Error::api_with_status(
                extract_domain(&url),
                body,
                status.as_u16(),
            ))
        }
    }
}

fn extract_domain(url: &str) -> String {
    url.split("//")
        .nth(1)
        .and_then(|s| s.split('/').next())
        .unwrap_or("unknown")
        .to_string()
}
