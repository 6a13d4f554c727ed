mod assets;
mod rules;

pub use assets::HttpAssetStore;
pub use rules::HttpRuleStore;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};

use crate::error::UpstreamError;
use crate::identity::CallerIdentity;
use crate::rules::{RuleKind, RuleSet};

/// Holds the source text of every snippet.
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn get_snippet(&self, id: u64) -> Result<String, UpstreamError>;

    async fn save_snippet(&self, id: u64, content: &str) -> Result<(), UpstreamError>;
}

/// Holds each user's lint, format and analysis rules.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn rules(&self, kind: RuleKind, caller: &CallerIdentity) -> Result<RuleSet, UpstreamError>;
}

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("snippet-runner/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Unable to build configured HTTP client, using defaults: {e}");
            reqwest::Client::new()
        })
}

/// Maps non-success statuses to [`UpstreamError`], keeping the body as the message.
pub(crate) async fn check_status(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::BAD_REQUEST => UpstreamError::BadRequest(body),
        StatusCode::NOT_FOUND => UpstreamError::NotFound(body),
        other => UpstreamError::Status {
            status: other.as_u16(),
            body,
        },
    })
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
