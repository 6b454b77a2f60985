//! HTTP client for the external approval service

use async_trait::async_trait;
use mindful_api::{ApprovalDecision, ApprovalRequest};
use mindful_host_api::{ApprovalService, HostError, HostResult};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Posts approval requests as JSON and reads back an [`ApprovalDecision`]
pub struct HttpApprovalService {
    client: Client,
    endpoint: String,
}

impl HttpApprovalService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> HostResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| HostError::ApprovalFailed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ApprovalService for HttpApprovalService {
    async fn decide(&self, request: &ApprovalRequest) -> HostResult<ApprovalDecision> {
        debug!(endpoint = %self.endpoint, item = %request.display_name, "Requesting approval");

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HostError::ApprovalFailed(e.to_string()))?;

        let decision: ApprovalDecision = response
            .json()
            .await
            .map_err(|e| HostError::ApprovalFailed(format!("invalid response: {}", e)))?;

        info!(
            item = %request.display_name,
            approve = decision.approve,
            minutes = ?decision.minutes,
            "Approval decision received"
        );
        Ok(decision)
    }
}
