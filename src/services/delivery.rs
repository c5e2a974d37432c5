use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::File;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use suppaftp::{FtpError, FtpStream, Mode, Status};

use crate::config::{AppConfig, FtpProfile};
use crate::models::job::DeliveryTarget;

/// Per-file outcome of one transfer session.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub uploaded: Vec<String>,
    /// `(filename, error)` for every file that did not make it.
    pub failures: Vec<(String, String)>,
}

/// Pushes local files to a named delivery target.
#[async_trait]
pub trait FileTransfer: Send + Sync {
    fn is_configured(&self, target: DeliveryTarget) -> bool;

    /// Upload every file under its base name into the target's remote directory.
    ///
    /// Session-level failures (connect, login, directory) are errors; a file
    /// that fails on its own is recorded in the report and the rest continue.
    async fn push(
        &self,
        target: DeliveryTarget,
        files: Vec<PathBuf>,
    ) -> Result<TransferReport, DeliveryError>;
}

/// Passive-mode FTP uploads, one session per push.
pub struct FtpTransfer {
    profiles: HashMap<DeliveryTarget, FtpProfile>,
    timeout: Duration,
}

impl FtpTransfer {
    pub fn new(profiles: HashMap<DeliveryTarget, FtpProfile>, timeout: Duration) -> Self {
        Self { profiles, timeout }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let profiles = DeliveryTarget::ALL
            .into_iter()
            .filter_map(|target| config.delivery_profile(target).map(|p| (target, p)))
            .collect();
        Self::new(profiles, Duration::from_secs(config.ftp_timeout_secs))
    }
}

#[async_trait]
impl FileTransfer for FtpTransfer {
    fn is_configured(&self, target: DeliveryTarget) -> bool {
        self.profiles.contains_key(&target)
    }

    async fn push(
        &self,
        target: DeliveryTarget,
        files: Vec<PathBuf>,
    ) -> Result<TransferReport, DeliveryError> {
        let profile = self
            .profiles
            .get(&target)
            .cloned()
            .ok_or_else(|| DeliveryError::Config(format!("no FTP profile for {target}")))?;
        let timeout = self.timeout;

        tracing::info!(
            target = %target,
            host = %profile.host,
            files = files.len(),
            "Starting FTP session"
        );

        tokio::task::spawn_blocking(move || upload_all(&profile, timeout, &files)).await?
    }
}

fn is_unavailable(err: &FtpError) -> bool {
    matches!(err, FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable)
}

/// Read and write timeouts so no socket call blocks past `timeout`.
fn set_timeouts(stream: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

fn connect(profile: &FtpProfile, timeout: Duration) -> Result<FtpStream, DeliveryError> {
    let addr = (profile.host.as_str(), profile.port)
        .to_socket_addrs()
        .map_err(|e| DeliveryError::Connect(format!("{}: {e}", profile.host)))?
        .next()
        .ok_or_else(|| DeliveryError::Connect(format!("{}: no address", profile.host)))?;

    // bounded before the welcome banner is read
    let control = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| DeliveryError::Connect(format!("{addr}: {e}")))?;
    set_timeouts(&control, timeout)?;

    // passive data connections get the same bounds as the control stream
    let mut ftp = FtpStream::connect_with_stream(control)
        .map_err(|e| DeliveryError::Connect(format!("{addr}: {e}")))?
        .passive_stream_builder(move |data_addr: SocketAddr| {
            let stream = TcpStream::connect_timeout(&data_addr, timeout)
                .map_err(FtpError::ConnectionError)?;
            set_timeouts(&stream, timeout).map_err(FtpError::ConnectionError)?;
            Ok(stream)
        });

    ftp.login(profile.user.as_str(), profile.password.as_str())
        .map_err(|e| DeliveryError::Login(e.to_string()))?;
    ftp.set_mode(Mode::Passive);
    Ok(ftp)
}

/// Enter `remote_dir`, creating missing components one at a time.
fn enter_remote_dir(ftp: &mut FtpStream, remote_dir: &str) -> Result<(), DeliveryError> {
    match ftp.cwd(remote_dir) {
        Ok(()) => return Ok(()),
        Err(err) if is_unavailable(&err) => {}
        Err(err) => return Err(DeliveryError::Directory(format!("{remote_dir}: {err}"))),
    }

    if remote_dir.starts_with('/') {
        ftp.cwd("/")
            .map_err(|e| DeliveryError::Directory(format!("/: {e}")))?;
    }

    for part in remote_dir.split('/').filter(|p| !p.is_empty()) {
        match ftp.mkdir(part) {
            Ok(()) => tracing::debug!(dir = part, "Created remote directory"),
            // already exists
            Err(err) if is_unavailable(&err) => {}
            Err(err) => return Err(DeliveryError::Directory(format!("{part}: {err}"))),
        }
        ftp.cwd(part)
            .map_err(|e| DeliveryError::Directory(format!("{part}: {e}")))?;
    }
    Ok(())
}

fn store_file(ftp: &mut FtpStream, path: &Path, name: &str) -> Result<(), String> {
    let mut file = File::open(path).map_err(|e| e.to_string())?;
    ftp.put_file(name, &mut file).map_err(|e| e.to_string())?;
    Ok(())
}

fn upload_all(
    profile: &FtpProfile,
    timeout: Duration,
    files: &[PathBuf],
) -> Result<TransferReport, DeliveryError> {
    let mut ftp = connect(profile, timeout)?;
    enter_remote_dir(&mut ftp, &profile.remote_dir)?;

    let mut report = TransferReport::default();
    for path in files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match store_file(&mut ftp, path, &name) {
            Ok(()) => {
                tracing::info!(file = %name, "Uploaded");
                report.uploaded.push(name);
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "Upload failed");
                report.failures.push((name, e));
            }
        }
    }

    if let Err(e) = ftp.quit() {
        tracing::debug!(error = %e, "FTP quit failed");
    }
    Ok(report)
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("FTP connect failed: {0}")]
    Connect(String),

    #[error("FTP login failed: {0}")]
    Login(String),

    #[error("FTP remote directory error: {0}")]
    Directory(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Delivery configuration error: {0}")]
    Config(String),
}
