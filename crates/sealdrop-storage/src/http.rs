//! Thin JSON client for the share server API.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use sealdrop_core::{SealdropError, SealdropResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Clone)]
pub(crate) struct ApiClient {
    base: String,
    client: Client,
}

impl ApiClient {
    pub(crate) fn new(base: &str, timeout: Duration) -> SealdropResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SealdropError::Configuration(format!("building HTTP client: {e}")))?;
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// POST a JSON body and decode a JSON reply.
    pub(crate) async fn post_json<B, T>(&self, path: &str, body: &B, what: &str) -> SealdropResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport(what, e))?;
        let resp = ensure_success(resp, what).await?;
        resp.json::<T>().await.map_err(|e| transport(what, e))
    }

    /// POST a JSON body, ignoring the reply body.
    pub(crate) async fn post_unit<B>(&self, path: &str, body: &B, what: &str) -> SealdropResult<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport(what, e))?;
        ensure_success(resp, what).await.map(|_| ())
    }

    /// GET a JSON document. 404 and 410 (expired) map to `NotFound`.
    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> SealdropResult<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| transport(what, e))?;
        match resp.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Err(SealdropError::NotFound(format!(
                "{what}: {}",
                resp.status()
            ))),
            _ => {
                let resp = ensure_success(resp, what).await?;
                resp.json::<T>().await.map_err(|e| transport(what, e))
            }
        }
    }
}

pub(crate) fn transport(what: &str, err: reqwest::Error) -> SealdropError {
    // reqwest includes the URL in its Display; presigned query strings stay out of errors
    SealdropError::Transport(format!("{what}: {}", err.without_url()))
}

pub(crate) async fn ensure_success(resp: Response, what: &str) -> SealdropResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(SealdropError::Transport(format!("{what} failed {status} {text}")))
}

/// Host part of a URL, for logging presigned URLs without their signature.
pub(crate) fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "<invalid url>".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_strips_signature() {
        assert_eq!(
            host_of("https://acct.r2.cloudflarestorage.com/b/files/x.enc?X-Amz-Signature=abc"),
            "acct.r2.cloudflarestorage.com"
        );
        assert_eq!(host_of("not a url"), "<invalid url>");
    }

    #[test]
    fn test_url_join() {
        let api = ApiClient::new("http://localhost:3000/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/api/r2/initiate"), "http://localhost:3000/api/r2/initiate");
    }
}
