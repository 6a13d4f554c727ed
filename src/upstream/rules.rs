use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::identity::CallerIdentity;
use crate::rules::{RuleKind, RuleSet};

use super::{RuleStore, check_status, http_client, trim_base};

pub struct HttpRuleStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRuleStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: trim_base(base_url),
            client: http_client(),
        }
    }
}

#[async_trait]
impl RuleStore for HttpRuleStore {
    async fn rules(&self, kind: RuleKind, caller: &CallerIdentity) -> Result<RuleSet, UpstreamError> {
        let url = format!("{}/rules/get/user/{}", self.base_url, kind.store_segment());
        log::debug!("Fetching {kind} rules from {url}");

        let response = self
            .client
            .post(url)
            .bearer_auth(caller.token())
            .send()
            .await?;
        let rules: RuleSet = check_status(response).await?.json().await?;

        log::debug!("Got {} {kind} rules", rules.len());
        Ok(rules)
    }
}
