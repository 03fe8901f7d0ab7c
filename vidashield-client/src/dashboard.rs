//! Dashboard endpoints.
//!
//! The backend wraps every payload in a single-field envelope; the service
//! unwraps it so callers only see the inner type.

use crate::api_client::RestClient;
use crate::key::ResourceKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use vidashield_cache::{Clock, FetchRead, FetchResult, RequestOptions};

pub const DEFAULT_METRICS_DAYS: u32 = 7;
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertId {
    Number(i64),
    Text(String),
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(id) => write!(f, "{id}"),
            Self::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentAlert {
    pub id: AlertId,
    #[serde(rename = "tipo")]
    pub kind: String,
    #[serde(rename = "mensagem")]
    pub message: String,
    #[serde(rename = "tempo")]
    pub time: String,
}

/// Blocked attempts arrive either as one total or as a per-day series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BlockedAttempts {
    Total(u64),
    Daily(Vec<u64>),
}

impl BlockedAttempts {
    pub fn total(&self) -> u64 {
        match self {
            Self::Total(total) => *total,
            Self::Daily(days) => days.iter().sum(),
        }
    }
}

impl Default for BlockedAttempts {
    fn default() -> Self {
        Self::Total(0)
    }
}

/// Headline numbers for the landing page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardOverview {
    #[serde(rename = "total_usuarios")]
    pub total_users: u64,
    #[serde(rename = "logins_hoje")]
    pub logins_today: u64,
    #[serde(rename = "alertas_criticos")]
    pub critical_alerts: u64,
    #[serde(rename = "acessos_semana", default)]
    pub weekly_accesses: Vec<u64>,
    #[serde(rename = "tentativas_bloqueadas", default)]
    pub blocked_attempts: BlockedAttempts,
    #[serde(rename = "alertas_recentes", default)]
    pub recent_alerts: Vec<RecentAlert>,
    #[serde(rename = "labels_dias", default)]
    pub day_labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub blocked_attempts: u64,
    pub successful_logins: u64,
    pub new_devices: u64,
    #[serde(default)]
    pub suspicious_ips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: String,
    pub user: String,
    pub action: String,
    pub timestamp: String,
    #[serde(default)]
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFile {
    pub url: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    pub data: ExportFile,
    #[serde(default)]
    pub msg: String,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportFormat {
    #[default]
    Csv,
    Pdf,
    Json,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Pdf => "pdf",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct MetricsEnvelope<T> {
    metrics: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActivityEnvelope<T> {
    activity: T,
}

pub struct DashboardApi<'a, C> {
    client: &'a RestClient<C>,
}

impl<'a, C: Clock> DashboardApi<'a, C> {
    pub fn new(client: &'a RestClient<C>) -> Self {
        Self { client }
    }

    pub async fn overview(
        &self,
        options: RequestOptions<DashboardOverview>,
    ) -> FetchResult<FetchRead<DashboardOverview>> {
        let read = self
            .client
            .get_json(
                &ResourceKey::new("/api/dashboard"),
                options.map_fallback(|data| DataEnvelope { data }),
            )
            .await?;
        Ok(read.map(|envelope| envelope.data))
    }

    pub async fn security_metrics(
        &self,
        days: Option<u32>,
        options: RequestOptions<SecurityMetrics>,
    ) -> FetchResult<FetchRead<SecurityMetrics>> {
        let key = ResourceKey::new("/api/dashboard/security-metrics")
            .param("days", days.unwrap_or(DEFAULT_METRICS_DAYS));
        let read = self
            .client
            .get_json(&key, options.map_fallback(|metrics| MetricsEnvelope { metrics }))
            .await?;
        Ok(read.map(|envelope| envelope.metrics))
    }

    pub async fn recent_activity(
        &self,
        limit: Option<u32>,
        options: RequestOptions<Vec<ActivityEntry>>,
    ) -> FetchResult<FetchRead<Vec<ActivityEntry>>> {
        let key = ResourceKey::new("/api/dashboard/activity")
            .param("limit", limit.unwrap_or(DEFAULT_ACTIVITY_LIMIT));
        let read = self
            .client
            .get_json(&key, options.map_fallback(|activity| ActivityEnvelope { activity }))
            .await?;
        Ok(read.map(|envelope| envelope.activity))
    }

    /// Ask the backend to render a report.
    ///
    /// Each call produces a new file, so the cache is always bypassed;
    /// concurrent identical exports still share one request.
    pub async fn export_report(
        &self,
        report_id: &str,
        format: ReportFormat,
    ) -> FetchResult<ExportResponse> {
        let key = ResourceKey::new(format!("/api/reports/export/{report_id}"))
            .param("format", format);
        let read = self
            .client
            .get_json(&key, RequestOptions::new().skip_cache())
            .await?;
        Ok(read.into_value())
    }
}
