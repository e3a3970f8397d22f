use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for linkwatch
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub checker: CheckerConfig,
    pub creation: CreationConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
}

/// Link checking behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CheckerConfig {
    /// Number of links checked in parallel
    #[serde(rename = "worker-count")]
    pub worker_count: usize,

    /// Minimum time between the end of one check and the start of the next
    /// against the same host (milliseconds)
    #[serde(rename = "host-cooldown-ms")]
    pub host_cooldown_ms: u64,

    /// Time allowed to establish a connection (milliseconds)
    #[serde(rename = "connect-timeout-ms", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Time allowed until response headers arrive (milliseconds)
    #[serde(rename = "response-timeout-ms", default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Time allowed to read the response body (milliseconds)
    #[serde(rename = "download-timeout-ms", default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
}

impl CheckerConfig {
    pub fn host_cooldown(&self) -> Duration {
        Duration::from_millis(self.host_cooldown_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_response_timeout_ms() -> u64 {
    30_000
}

fn default_download_timeout_ms() -> u64 {
    60_000
}

/// Run creation behavior
#[derive(Debug, Clone, Deserialize)]
pub struct CreationConfig {
    /// Number of datasets processed in parallel
    #[serde(rename = "worker-count")]
    pub worker_count: usize,

    /// Number of records sampled per dataset
    #[serde(rename = "sample-size")]
    pub sample_size: usize,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the checker
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the checker
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the checker
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for checker-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Catalog source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Path to the JSON catalog export
    pub path: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the markdown batch report
    #[serde(rename = "report-path")]
    pub report_path: String,
}
