// 单主机 SSH 连接管理器
//
// 持有一条控制连接（一次性命令 + 至多一个交互式会话），上传/下载另开独立连接。
// 对外接口是同步的：每个实例持有自己的 Tokio 运行时，所有操作在其上 block_on。

use std::path::Path;

use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use super::client::SshClient;
use super::config::SshConfig;
use super::error::{ErrorKind, SshError};
use super::host_key::HostKeyPolicy;
use super::session::{CommandOutcome, CommandOutput, PtyRequest, SshSession, TerminalChannel};
use crate::services::sftp::{transfer_once, TransferDirection, TransferReport, TransferTracker};

/// 最近一次连接失败的记录
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// SSH 连接管理器
pub struct ConnectionManager {
    /// 连接配置（构造后不变）
    config: SshConfig,
    /// 主机密钥校验策略
    policy: HostKeyPolicy,
    /// Tokio 运行时，用于执行所有 SSH 异步任务
    runtime: Runtime,
    /// 控制连接，Some 即 connected
    session: Option<SshSession>,
    /// 交互式会话通道，Some 即 sessionOpen（只在 session 存在时设置）
    terminal: Option<TerminalChannel>,
    /// 最近一次连接失败
    connect_error: Option<ConnectFailure>,
    /// 传输连接计数
    transfers: TransferTracker,
}

impl ConnectionManager {
    /// 创建管理器并立即尝试连接
    /// 连接失败不会返回错误，只记录日志并保持未连接状态
    pub fn new(config: SshConfig) -> Result<Self, SshError> {
        let policy = HostKeyPolicy::from(&config.host_key_checking);
        Self::with_host_key_policy(config, policy)
    }

    /// 使用指定的主机密钥策略创建管理器
    pub fn with_host_key_policy(
        config: SshConfig,
        policy: HostKeyPolicy,
    ) -> Result<Self, SshError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .thread_name("ssh-worker")
            .build()?;

        let mut manager = Self {
            config,
            policy,
            runtime,
            session: None,
            terminal: None,
            connect_error: None,
            transfers: TransferTracker::default(),
        };

        // 失败已记录在 connect_error 和日志里
        let _ = manager.connect();
        Ok(manager)
    }

    /// 建立控制连接
    fn connect(&mut self) -> Result<(), SshError> {
        let client = SshClient::new(&self.config, self.policy.clone());
        match self.runtime.block_on(client.connect()) {
            Ok(session) => {
                self.session = Some(session);
                self.connect_error = None;
                Ok(())
            }
            Err(e) => {
                let address = self.config.address();
                match e.kind() {
                    ErrorKind::AuthenticationFailure => error!(
                        error = ?e,
                        "[SSH] Authentication failed for {}@{}: {}",
                        self.config.username, address, e
                    ),
                    _ => error!(error = ?e, "[SSH] Connection to {} failed: {}", address, e),
                }
                self.connect_error = Some(ConnectFailure {
                    kind: e.kind(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// 关闭当前连接后重新连接
    pub fn reconnect(&mut self) -> Result<(), SshError> {
        info!("[SSH] Reconnecting to {}", self.config.address());
        self.close();
        self.connect()
    }

    /// 控制连接是否已建立
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// 交互式会话是否已打开
    pub fn is_session_open(&self) -> bool {
        self.terminal.is_some()
    }

    /// 最近一次连接失败（成功连接后清空）
    pub fn connect_error(&self) -> Option<&ConnectFailure> {
        self.connect_error.as_ref()
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    pub fn host_key_policy(&self) -> &HostKeyPolicy {
        &self.policy
    }

    /// 当前打开的传输连接数（两次调用之间应始终为 0）
    pub fn active_transfer_connections(&self) -> usize {
        self.transfers.active()
    }

    fn connected_session(&self) -> Result<&SshSession, SshError> {
        self.session.as_ref().ok_or_else(|| {
            info!("[SSH] {}", SshError::NotConnected);
            SshError::NotConnected
        })
    }

    /// 关闭交互式会话和控制连接，可重复调用
    /// 返回控制连接此前是否处于打开状态
    pub fn close(&mut self) -> bool {
        if let Some(terminal) = self.terminal.take() {
            if let Err(e) = self.runtime.block_on(terminal.close()) {
                warn!("[SSH] Failed to close interactive session: {}", e);
            }
        }

        match self.session.take() {
            Some(session) => {
                if let Err(e) = self.runtime.block_on(session.close()) {
                    warn!("[SSH] Failed to disconnect cleanly: {}", e);
                }
                info!("[SSH] ssh client closed.");
                true
            }
            None => false,
        }
    }

    /// 在新的逻辑通道上执行一次性命令，返回完整输出
    /// 阻塞直到远程进程结束
    pub fn command_output(&mut self, command: &str) -> Result<CommandOutput, SshError> {
        let session = self.connected_session()?;
        debug!("[SSH] exec: {}", command);

        let result = self.runtime.block_on(async {
            let channel = session.open_exec().await?;
            channel.exec(command).await
        });

        if let Err(e) = &result {
            error!(error = ?e, "[SSH] Command '{}' failed: {}", command, e);
        }
        result
    }

    /// 执行一次性命令：错误流非空时返回错误流文本，否则返回标准输出
    pub fn command(&mut self, command: &str) -> Result<CommandOutcome, SshError> {
        self.command_output(command).map(|output| output.outcome())
    }

    /// 打开交互式会话
    /// 已打开时不做任何事，返回 Ok(None)；
    /// 初始输出含错误流数据时视为打开失败，通道关闭，返回 RemoteError
    pub fn session_open(&mut self) -> Result<Option<CommandOutcome>, SshError> {
        if self.terminal.is_some() {
            debug!("[SSH] Interactive session already open");
            return Ok(None);
        }

        let drain_mode = self.config.drain;
        let session = self.connected_session()?;

        let result = self.runtime.block_on(async {
            let mut terminal = session.open_terminal(PtyRequest::default()).await?;
            // 空写入，只触发登录横幅和提示符的读取，不额外产生一行提示符
            terminal.write(b"").await?;
            let drained = terminal.drain(drain_mode).await;
            Ok::<_, SshError>((terminal, CommandOutput::from(drained).outcome()))
        });

        match result {
            Ok((terminal, outcome)) if outcome.is_remote_error() => {
                warn!("[SSH] Interactive session reported errors, closing it");
                if let Err(e) = self.runtime.block_on(terminal.close()) {
                    warn!("[SSH] Failed to close interactive session: {}", e);
                }
                Ok(Some(outcome))
            }
            Ok((terminal, outcome)) => {
                self.terminal = Some(terminal);
                info!("[SSH] Interactive session opened");
                Ok(Some(outcome))
            }
            Err(e) => {
                error!(error = ?e, "[SSH] Failed to open interactive session: {}", e);
                Err(e)
            }
        }
    }

    /// 在交互式会话中发送一行命令，并按 DrainMode 读取输出
    /// 输出按时间读取，慢命令的结果可能不完整
    pub fn session_command(&mut self, command: &str) -> Result<CommandOutcome, SshError> {
        let drain_mode = self.config.drain;
        let terminal = self.terminal.as_mut().ok_or_else(|| {
            info!("[SSH] {}", SshError::SessionNotOpen);
            SshError::SessionNotOpen
        })?;

        let line = format!("{}\n", command);
        let drained = self.runtime.block_on(async {
            terminal.write(line.as_bytes()).await?;
            Ok::<_, SshError>(terminal.drain(drain_mode).await)
        });

        match drained {
            Ok(drained) => {
                if drained.closed {
                    warn!("[SSH] Remote shell closed the interactive session");
                }
                Ok(CommandOutput::from(drained).outcome())
            }
            Err(e) => {
                error!(error = ?e, "[SSH] Session command '{}' failed: {}", command, e);
                Err(e)
            }
        }
    }

    /// 关闭交互式会话
    pub fn session_close(&mut self) -> Result<(), SshError> {
        let terminal = self.terminal.take().ok_or_else(|| {
            info!("[SSH] {}", SshError::SessionNotOpen);
            SshError::SessionNotOpen
        })?;

        // 无论关闭是否成功，会话状态都已是关闭
        self.runtime.block_on(terminal.close()).map_err(|e| {
            warn!("[SSH] Failed to close interactive session: {}", e);
            e
        })?;
        info!("[SSH] Interactive session closed");
        Ok(())
    }

    /// 上传本地文件，使用独立的传输连接
    /// 不依赖控制连接状态
    pub fn upload(&self, remote_path: &str, local_path: &Path) -> Result<TransferReport, SshError> {
        self.transfer(TransferDirection::Upload, local_path, remote_path)
    }

    /// 下载远程文件，使用独立的传输连接
    pub fn download(
        &self,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<TransferReport, SshError> {
        self.transfer(TransferDirection::Download, local_path, remote_path)
    }

    fn transfer(
        &self,
        direction: TransferDirection,
        local_path: &Path,
        remote_path: &str,
    ) -> Result<TransferReport, SshError> {
        let result = self.runtime.block_on(transfer_once(
            &self.config,
            self.policy.clone(),
            &self.transfers,
            direction,
            local_path,
            remote_path,
        ));

        if let Err(e) = &result {
            error!(
                error = ?e,
                "[SFTP] {:?} {:?} <-> {} failed: {}",
                direction, local_path, remote_path, e
            );
        }
        result
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}
