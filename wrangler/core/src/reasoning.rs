//! Client side of the external reasoning service.
//!
//! The service turns a schema plus a natural-language instruction into SQL, a chart suggestion
//! and optionally structured stages. Everything behind [`ReasoningService`] is opaque; the
//! [`HttpReasoningService`] talks to it over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use tracing::{debug, error, instrument};
use wrangler_schemas::{ErrorBody, TransformRequest, TransformResponse};

/// Default request timeout of [`HttpReasoningService`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum ReasoningError {
    #[error("Reasoning service failed ({status}): {message}")]
    #[diagnostic(
        code(wrangler::reasoning::service_error),
        help("The service rejected the request. Check the API key and the prompt")
    )]
    Service { status: u16, message: String },

    #[error("Failed to reach reasoning service at '{url}'")]
    #[diagnostic(
        code(wrangler::reasoning::http_error),
        help("Check that the service is running and WRANGLER_SERVICE_URL points to it")
    )]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response body from reasoning service")]
    #[diagnostic(code(wrangler::reasoning::decode_error))]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can answer a transformation request
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformResponse, ReasoningError>;
}

/// [`ReasoningService`] reached with `POST <base_url>/api/transform`
#[derive(Debug, Clone)]
pub struct HttpReasoningService {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpReasoningService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/api/transform", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningService {
    #[instrument(skip_all, fields(url = %self.endpoint(), prompt_len = request.user_prompt.len()))]
    async fn transform(
        &self,
        request: &TransformRequest,
    ) -> Result<TransformResponse, ReasoningError> {
        let url = self.endpoint();
        let http_error = |source| ReasoningError::Http {
            url: url.clone(),
            source,
        };

        debug!("Sending transformation request");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(http_error)?;

        let status = response.status();
        let body = response.text().await.map_err(http_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|body| body.error)
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("Unknown error")
                        .to_string()
                });

            error!("Transformation failed (status code: {status}): {message}");

            return Err(ReasoningError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let response = serde_json::from_str::<TransformResponse>(&body)
            .map_err(|source| ReasoningError::Decode { source })?;

        debug!(
            "Received transformation with {} structured stages",
            response
                .transformation_stages
                .as_ref()
                .map(Vec::len)
                .unwrap_or_default()
        );

        Ok(response)
    }
}
