use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::time::Duration;

use crate::error::ApiError;
use crate::request::{HttpRequest, HttpResponse};

/// Performs a single HTTP exchange. Non-success statuses are returned as
/// responses, only transport failures are errors.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, url: &str, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

pub struct ReqwestTransport {
    http_client: HttpClient,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, url: &str, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self.http_client.request(request.method.clone(), url);
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(HttpResponse { status, body })
    }
}
