// SFTP 服务 - 封装 russh-sftp 客户端
// 每次上传/下载使用独立的 SSH 连接，不复用控制连接

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::ssh::client::SshClient;
use crate::ssh::config::SshConfig;
use crate::ssh::error::SshError;
use crate::ssh::host_key::HostKeyPolicy;
use crate::ssh::session::SshSession;

/// 传输方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// 一次传输的结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferReport {
    pub direction: TransferDirection,
    pub local_path: String,
    pub remote_path: String,
    /// 传输字节数
    pub bytes: u64,
    /// 完成时间
    pub finished_at: DateTime<Local>,
}

/// 当前打开的传输连接计数
#[derive(Clone, Debug, Default)]
pub struct TransferTracker {
    active: Arc<AtomicUsize>,
}

impl TransferTracker {
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> TransferGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        TransferGuard {
            active: self.active.clone(),
        }
    }
}

/// 连接存活期间持有，释放时计数减一
struct TransferGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// SFTP 服务
/// 持有一条独立的传输连接和其上的 SFTP 子通道
pub struct SftpService {
    session: SshSession,
    sftp: SftpSession,
    _guard: TransferGuard,
}

impl SftpService {
    /// 建立独立连接并打开 SFTP 子系统
    pub async fn connect(
        config: &SshConfig,
        policy: HostKeyPolicy,
        tracker: &TransferTracker,
    ) -> Result<Self, SshError> {
        info!("[SFTP] Opening transfer connection to {}", config.address());

        let session = SshClient::new(config, policy).connect().await?;
        let guard = tracker.acquire();

        let sftp = match session.open_sftp().await {
            Ok(sftp) => sftp,
            Err(e) => {
                // 子通道失败时也要断开传输连接
                if let Err(close_err) = session.close().await {
                    warn!("[SFTP] Failed to close transfer connection: {}", close_err);
                }
                return Err(e);
            }
        };

        debug!("[SFTP] SFTP subsystem ready on {}", session.host());
        Ok(Self {
            session,
            sftp,
            _guard: guard,
        })
    }

    /// 上传本地文件到远程路径
    pub async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, SshError> {
        let mut local_file = tokio::fs::File::open(local_path).await.map_err(|e| {
            SshError::Transfer(format!("Failed to open local file {:?}: {}", local_path, e))
        })?;

        let mut remote_file = self
            .sftp
            .open_with_flags(
                remote_path,
                OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE,
            )
            .await
            .map_err(|e| {
                SshError::Transfer(format!("Failed to open remote file {}: {}", remote_path, e))
            })?;

        let bytes = tokio::io::copy(&mut local_file, &mut remote_file)
            .await
            .map_err(|e| SshError::Transfer(format!("Upload to {} failed: {}", remote_path, e)))?;
        remote_file
            .shutdown()
            .await
            .map_err(|e| SshError::Transfer(format!("Failed to finish {}: {}", remote_path, e)))?;

        Ok(bytes)
    }

    /// 下载远程文件到本地路径
    pub async fn download(&self, remote_path: &str, local_path: &Path) -> Result<u64, SshError> {
        // 先打开远程文件，失败时不在本地留下空文件
        let mut remote_file = self.sftp.open(remote_path).await.map_err(|e| {
            SshError::Transfer(format!("Failed to open remote file {}: {}", remote_path, e))
        })?;

        let mut local_file = tokio::fs::File::create(local_path).await.map_err(|e| {
            SshError::Transfer(format!(
                "Failed to create local file {:?}: {}",
                local_path, e
            ))
        })?;

        let bytes = tokio::io::copy(&mut remote_file, &mut local_file)
            .await
            .map_err(|e| {
                SshError::Transfer(format!("Download from {} failed: {}", remote_path, e))
            })?;
        local_file
            .flush()
            .await
            .map_err(|e| SshError::Transfer(format!("Failed to flush {:?}: {}", local_path, e)))?;

        Ok(bytes)
    }

    /// 关闭 SFTP 子通道和传输连接
    pub async fn close(self) {
        if let Err(e) = self.sftp.close().await {
            warn!("[SFTP] Failed to close sftp channel: {}", e);
        }
        if let Err(e) = self.session.close().await {
            warn!("[SFTP] Failed to close transfer connection: {}", e);
        }
        info!(
            "[SFTP] Transfer connection {}@{} closed",
            self.session.username(),
            self.session.host()
        );
    }
}

/// 执行一次传输：连接、复制、无论结果如何都关闭连接
pub async fn transfer_once(
    config: &SshConfig,
    policy: HostKeyPolicy,
    tracker: &TransferTracker,
    direction: TransferDirection,
    local_path: &Path,
    remote_path: &str,
) -> Result<TransferReport, SshError> {
    // 上传前先确认本地路径是普通文件，否则远程文件会在读取失败前被截断
    if direction == TransferDirection::Upload {
        match tokio::fs::metadata(local_path).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => {
                return Err(SshError::Transfer(format!(
                    "Local path {:?} is not a regular file",
                    local_path
                )))
            }
            Err(e) => {
                return Err(SshError::Transfer(format!(
                    "Local file {:?} is not readable: {}",
                    local_path, e
                )))
            }
        }
    }

    let service = SftpService::connect(config, policy, tracker).await?;

    let result = match direction {
        TransferDirection::Upload => service.upload(local_path, remote_path).await,
        TransferDirection::Download => service.download(remote_path, local_path).await,
    };

    service.close().await;

    let bytes = result?;
    info!(
        "[SFTP] {:?} finished: {:?} <-> {} ({} bytes)",
        direction, local_path, remote_path, bytes
    );

    Ok(TransferReport {
        direction,
        local_path: local_path.display().to_string(),
        remote_path: remote_path.to_string(),
        bytes,
        finished_at: Local::now(),
    })
}
