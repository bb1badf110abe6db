use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;

use crate::config::{PolicyConfig, UpstreamConfig};

/// The decision name evaluated for every request.
const DECISION: &str = "allowed";

#[derive(Debug, Error)]
pub enum AuthorizerError {
    #[error("invalid authorizer address: {0}")]
    Address(#[from] url::ParseError),
    #[error("authorizer request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("authorizer returned no {DECISION:?} decision")]
    MissingDecision,
}

/// External policy decision point. Pure delegation boundary: callers pass a
/// subject, a policy path, and resource context, and get back allow/deny.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn is_allowed(
        &self,
        identity: &str,
        policy_path: &str,
        resource: Value,
    ) -> Result<bool, AuthorizerError>;
}

/// REST client for the remote authorizer.
pub struct RemoteAuthorizer {
    http: reqwest::Client,
    decision_url: Url,
    api_key: String,
    tenant_id: String,
    instance_name: String,
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    #[serde(default)]
    decisions: Vec<Decision>,
}

#[derive(Debug, Deserialize)]
struct Decision {
    decision: String,
    is: bool,
}

impl RemoteAuthorizer {
    pub fn new(
        config: &UpstreamConfig,
        policy: &PolicyConfig,
        http: reqwest::Client,
    ) -> Result<Self, AuthorizerError> {
        let mut decision_url = Url::parse(&config.address)?;
        decision_url.set_path("/api/v2/authz/is");

        Ok(Self {
            http,
            decision_url,
            api_key: config.api_key.clone(),
            tenant_id: config.tenant_id.clone(),
            instance_name: policy.instance_name.clone(),
        })
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    async fn is_allowed(
        &self,
        identity: &str,
        policy_path: &str,
        resource: Value,
    ) -> Result<bool, AuthorizerError> {
        let body = json!({
            "identity_context": {
                "type": "IDENTITY_TYPE_SUB",
                "identity": identity,
            },
            "policy_context": {
                "path": policy_path,
                "decisions": [DECISION],
            },
            "policy_instance": {
                "name": self.instance_name,
            },
            "resource_context": resource,
        });

        let mut req = self.http.post(self.decision_url.clone()).json(&body);
        if !self.api_key.is_empty() {
            req = req.header("authorization", format!("basic {}", self.api_key));
        }
        if !self.tenant_id.is_empty() {
            req = req.header("x-tenant-id", &self.tenant_id);
        }

        let resp: DecisionResponse = req.send().await?.error_for_status()?.json().await?;

        resp.decisions
            .iter()
            .find(|d| d.decision == DECISION)
            .map(|d| d.is)
            .ok_or(AuthorizerError::MissingDecision)
    }
}
