//! Security alert endpoints.

use crate::api_client::RestClient;
use crate::key::{path_segment, ResourceKey};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use vidashield_cache::{Clock, FetchRead, FetchResult, RequestOptions};

/// Collection path; acknowledging or resolving invalidates cached reads under it.
pub const ALERTS_PATH: &str = "/api/alerts";

pub const DEFAULT_RECENT_LIMIT: u32 = 5;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    New,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertsPage {
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct AlertsEnvelope {
    alerts: Vec<Alert>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AlertEnvelope {
    alert: Alert,
}

/// Listing filters. `page` and `limit` are always sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilters {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub severity: Option<AlertSeverity>,
    pub status: Option<AlertStatus>,
}

impl AlertFilters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn severity(mut self, severity: AlertSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn status(mut self, status: AlertStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(ALERTS_PATH)
            .param("page", self.page.unwrap_or(DEFAULT_PAGE).max(1))
            .param("limit", self.limit.unwrap_or(DEFAULT_LIMIT).max(1))
            .param_opt("severity", self.severity.map(|s| s.as_str()))
            .param_opt("status", self.status.map(|s| s.as_str()))
    }
}

pub struct AlertsApi<'a, C> {
    client: &'a RestClient<C>,
}

impl<'a, C: Clock> AlertsApi<'a, C> {
    pub fn new(client: &'a RestClient<C>) -> Self {
        Self { client }
    }

    pub async fn list(
        &self,
        filters: &AlertFilters,
        options: RequestOptions<AlertsPage>,
    ) -> FetchResult<FetchRead<AlertsPage>> {
        self.client
            .get_json(&filters.resource_key(), options)
            .await
    }

    /// Latest alerts, newest first; `limit` defaults to 5.
    pub async fn recent(
        &self,
        limit: Option<u32>,
        options: RequestOptions<Vec<Alert>>,
    ) -> FetchResult<FetchRead<Vec<Alert>>> {
        let key = ResourceKey::new(format!("{ALERTS_PATH}/recent"))
            .param("limit", limit.unwrap_or(DEFAULT_RECENT_LIMIT));
        let read = self
            .client
            .get_json(&key, options.map_fallback(|alerts| AlertsEnvelope { alerts }))
            .await?;
        Ok(read.map(|envelope| envelope.alerts))
    }

    pub async fn acknowledge(&self, alert_id: &str) -> FetchResult<Alert> {
        self.transition(alert_id, "acknowledge").await
    }

    pub async fn resolve(&self, alert_id: &str) -> FetchResult<Alert> {
        self.transition(alert_id, "resolve").await
    }

    async fn transition(&self, alert_id: &str, action: &str) -> FetchResult<Alert> {
        let path = format!("{ALERTS_PATH}/{}/{action}", path_segment(alert_id)?);
        let envelope: AlertEnvelope = self
            .client
            .send_json::<_, ()>(Method::PATCH, &path, None, ALERTS_PATH)
            .await?;
        Ok(envelope.alert)
    }
}
