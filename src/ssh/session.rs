// SSH 会话管理
// 连接成功后的会话对象：一次性命令通道、交互式终端通道、SFTP 通道都复用同一个传输

use std::fmt;

use async_trait::async_trait;
use russh::client::{Handle, Msg};
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use tracing::debug;

use super::config::DrainMode;
use super::drain::{drain, ChunkSource, Drained, StreamChunk};
use super::error::{ErrorKind, SshError};
use super::handler::SshClientHandler;

/// PTY 请求参数
#[derive(Clone, Debug)]
pub struct PtyRequest {
    /// 终端类型
    pub term: String,
    /// 列数
    pub col_width: u32,
    /// 行数
    pub row_height: u32,
    /// 像素宽度
    pub pix_width: u32,
    /// 像素高度
    pub pix_height: u32,
    /// 终端模式
    pub modes: Vec<(russh::Pty, u32)>,
}

impl Default for PtyRequest {
    fn default() -> Self {
        Self {
            term: "vt100".to_string(),
            col_width: 80,
            row_height: 24,
            pix_width: 0,
            pix_height: 0,
            modes: vec![],
        }
    }
}

/// SSH 会话（连接成功后）
pub struct SshSession {
    /// russh Handle
    handle: Handle<SshClientHandler>,
    /// 服务器主机名
    host: String,
    /// 用户名
    username: String,
}

impl SshSession {
    /// 创建新的会话
    pub fn new(handle: Handle<SshClientHandler>, host: String, username: String) -> Self {
        Self {
            handle,
            host,
            username,
        }
    }

    /// 获取主机名
    pub fn host(&self) -> &str {
        &self.host
    }

    /// 获取用户名
    pub fn username(&self) -> &str {
        &self.username
    }

    /// 检查底层传输是否仍然存活
    pub fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    fn ensure_alive(&self) -> Result<(), SshError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(SshError::Channel(format!(
                "Transport to {} is closed",
                self.host
            )))
        }
    }

    /// 打开终端 Shell 通道
    pub async fn open_terminal(&self, pty: PtyRequest) -> Result<TerminalChannel, SshError> {
        self.ensure_alive()?;

        let channel = self.handle.channel_open_session().await?;

        // 请求 PTY
        channel
            .request_pty(
                false, // want_reply
                &pty.term,
                pty.col_width,
                pty.row_height,
                pty.pix_width,
                pty.pix_height,
                &pty.modes,
            )
            .await?;

        // 请求 Shell
        channel.request_shell(false).await?;

        Ok(TerminalChannel { channel })
    }

    /// 打开执行通道（每个一次性命令使用一个新通道）
    pub async fn open_exec(&self) -> Result<ExecChannel, SshError> {
        self.ensure_alive()?;

        let channel = self.handle.channel_open_session().await?;
        Ok(ExecChannel { channel })
    }

    /// 打开 SFTP 子系统
    pub async fn open_sftp(&self) -> Result<SftpSession, SshError> {
        self.ensure_alive()?;

        let channel = self.handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;

        let sftp = SftpSession::new(channel.into_stream()).await?;
        Ok(sftp)
    }

    /// 关闭会话，发送 SSH disconnect
    pub async fn close(&self) -> Result<(), SshError> {
        if !self.is_alive() {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await?;
        Ok(())
    }
}

impl fmt::Debug for SshSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshSession")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

// 使用 russh::client::Msg 作为消息类型
type RusshChannel = russh::Channel<Msg>;

#[async_trait]
impl ChunkSource for RusshChannel {
    async fn next_chunk(&mut self) -> StreamChunk {
        loop {
            match self.wait().await {
                Some(ChannelMsg::Data { data }) => return StreamChunk::Stdout(data.to_vec()),
                Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                    return StreamChunk::Stderr(data.to_vec())
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return StreamChunk::Closed
                }
                Some(_) => continue,
            }
        }
    }
}

/// 终端通道（交互式 Shell）
pub struct TerminalChannel {
    channel: RusshChannel,
}

impl TerminalChannel {
    /// 写入数据到终端
    pub async fn write(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| SshError::Channel(format!("Failed to send data to channel: {}", e)))
    }

    /// 按 DrainMode 读取当前可用的输出
    pub async fn drain(&mut self, mode: DrainMode) -> Drained {
        drain(&mut self.channel, mode).await
    }

    /// 关闭通道
    pub async fn close(self) -> Result<(), SshError> {
        // 对端可能已经关闭通道，EOF 失败不影响后续 close
        if let Err(e) = self.channel.eof().await {
            debug!("[SSH] EOF on terminal channel failed: {}", e);
        }
        self.channel
            .close()
            .await
            .map_err(|e| SshError::Channel(e.to_string()))
    }
}

/// 执行通道（一次性命令）
pub struct ExecChannel {
    channel: RusshChannel,
}

impl ExecChannel {
    /// 执行命令，阻塞到远程进程结束且输出读完
    pub async fn exec(mut self, command: &str) -> Result<CommandOutput, SshError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::Channel(e.to_string()))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;

        // ExitStatus 可能在 Eof 之后到达，读到 Close 为止
        while let Some(channel_msg) = self.channel.wait().await {
            match channel_msg {
                ChannelMsg::Data { data } => {
                    stdout.extend_from_slice(&data);
                }
                ChannelMsg::ExtendedData { data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = Some(exit_status);
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// 命令输出
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// 标准输出
    pub stdout: Vec<u8>,
    /// 标准错误
    pub stderr: Vec<u8>,
    /// 退出码（服务器未报告时为 None）
    pub exit_code: Option<u32>,
}

impl CommandOutput {
    /// 获取标准输出字符串
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// 获取标准错误字符串
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// 错误流非空即视为远程错误，标准输出被忽略
    pub fn outcome(&self) -> CommandOutcome {
        if self.stderr.is_empty() {
            CommandOutcome::Output(self.stdout_string())
        } else {
            CommandOutcome::RemoteError(self.stderr_string())
        }
    }
}

impl From<Drained> for CommandOutput {
    fn from(drained: Drained) -> Self {
        Self {
            stdout: drained.stdout,
            stderr: drained.stderr,
            exit_code: None,
        }
    }
}

/// 命令或会话操作的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// 标准输出文本
    Output(String),
    /// 错误流文本
    RemoteError(String),
}

impl CommandOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Output(text) | Self::RemoteError(text) => text,
        }
    }

    pub fn is_remote_error(&self) -> bool {
        matches!(self, Self::RemoteError(_))
    }

    /// 远程错误对应的错误分类
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.is_remote_error()
            .then_some(ErrorKind::RemoteExecutionError)
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}
