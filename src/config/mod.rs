use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::models::job::DeliveryTarget;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the job queue
    pub redis_url: String,

    /// Redis key prefix of the job queue
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Artifact bucket name
    pub s3_bucket: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    #[serde(default = "default_region")]
    pub s3_region: String,

    /// Custom S3-compatible endpoint (MinIO, R2). Path-style addressing is used when set.
    pub s3_endpoint: Option<String>,

    /// Directory holding `fonts/` and `templates/`
    #[serde(default = "default_assets_dir")]
    pub assets_dir: String,

    /// Upper bound of one long-poll receive
    #[serde(default = "default_receive_wait")]
    pub receive_wait_secs: u64,

    /// Lease of a received message before it becomes visible again
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,

    /// Deliveries of one message before it is moved to the dead-letter list
    #[serde(default = "default_max_receive_count")]
    pub max_receive_count: u32,

    /// Pause between two items of one job
    #[serde(default = "default_item_pause")]
    pub item_pause_ms: u64,

    #[serde(default = "default_io_timeout")]
    pub storage_timeout_secs: u64,

    #[serde(default = "default_io_timeout")]
    pub ftp_timeout_secs: u64,

    #[serde(default = "default_presign_expiry")]
    pub presign_expiry_secs: u32,

    /// Prometheus listener address (e.g. "0.0.0.0:9100"); disabled when unset
    pub metrics_addr: Option<String>,

    pub gold_ftp_host: Option<String>,
    #[serde(default = "default_ftp_port")]
    pub gold_ftp_port: u16,
    #[serde(default)]
    pub gold_ftp_user: String,
    #[serde(default)]
    pub gold_ftp_password: String,
    #[serde(default = "default_remote_dir")]
    pub gold_ftp_remote_dir: String,

    pub rcabinet_ftp_host: Option<String>,
    #[serde(default = "default_ftp_port")]
    pub rcabinet_ftp_port: u16,
    #[serde(default)]
    pub rcabinet_ftp_user: String,
    #[serde(default)]
    pub rcabinet_ftp_password: String,
    #[serde(default = "default_remote_dir")]
    pub rcabinet_ftp_remote_dir: String,
}

fn default_queue_name() -> String {
    "promo_jobs".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_assets_dir() -> String {
    "assets".to_string()
}

fn default_receive_wait() -> u64 {
    5
}

fn default_visibility_timeout() -> u64 {
    300
}

fn default_max_receive_count() -> u32 {
    5
}

fn default_item_pause() -> u64 {
    50
}

fn default_io_timeout() -> u64 {
    30
}

fn default_presign_expiry() -> u32 {
    3600
}

fn default_ftp_port() -> u16 {
    21
}

fn default_remote_dir() -> String {
    "/".to_string()
}

/// Connection profile of one delivery target.
#[derive(Clone, PartialEq, Eq)]
pub struct FtpProfile {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub remote_dir: String,
}

impl fmt::Debug for FtpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("remote_dir", &self.remote_dir)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// FTP profile of a target, `None` when its host is not configured.
    pub fn delivery_profile(&self, target: DeliveryTarget) -> Option<FtpProfile> {
        let (host, port, user, password, remote_dir) = match target {
            DeliveryTarget::Gold => (
                &self.gold_ftp_host,
                self.gold_ftp_port,
                &self.gold_ftp_user,
                &self.gold_ftp_password,
                &self.gold_ftp_remote_dir,
            ),
            DeliveryTarget::Rcabinet => (
                &self.rcabinet_ftp_host,
                self.rcabinet_ftp_port,
                &self.rcabinet_ftp_user,
                &self.rcabinet_ftp_password,
                &self.rcabinet_ftp_remote_dir,
            ),
        };

        host.as_ref().filter(|h| !h.is_empty()).map(|host| FtpProfile {
            host: host.clone(),
            port,
            user: user.clone(),
            password: password.clone(),
            remote_dir: remote_dir.clone(),
        })
    }

    pub fn receive_wait(&self) -> Duration {
        Duration::from_secs(self.receive_wait_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn item_pause(&self) -> Duration {
        Duration::from_millis(self.item_pause_ms)
    }
}
