// SSH 错误类型定义

use thiserror::Error;

/// SSH 错误类型
#[derive(Debug, Error)]
pub enum SshError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO 错误（网络连接等）
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 认证失败
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// SSH 协议错误
    #[error("SSH protocol error: {0}")]
    Protocol(String),

    /// 密钥错误
    #[error("Key error: {0}")]
    Key(String),

    /// 主机密钥被拒绝
    #[error("Host key rejected for {0}")]
    HostKeyRejected(String),

    /// 连接超时
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// 通道错误
    #[error("Channel error: {0}")]
    Channel(String),

    /// 文件传输错误
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// 控制连接未建立
    #[error("ssh client isn't connected.")]
    NotConnected,

    /// 交互式会话未打开
    #[error("session isn't opened.")]
    SessionNotOpen,
}

/// 错误分类
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// 凭据或密钥错误
    AuthenticationFailure,
    /// 网络、超时、协议协商失败
    ConnectionFailure,
    /// 远程命令或会话在错误流上产生输出（由 CommandOutcome 表示，不是 SshError）
    RemoteExecutionError,
    /// 所需状态（connected / sessionOpen）不满足
    StateViolation,
    /// 文件传输失败
    TransferFailure,
}

impl SshError {
    /// 映射到错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            SshError::Auth(_) | SshError::Key(_) => ErrorKind::AuthenticationFailure,
            SshError::Config(_)
            | SshError::Io(_)
            | SshError::Protocol(_)
            | SshError::HostKeyRejected(_)
            | SshError::Timeout(_)
            | SshError::Channel(_) => ErrorKind::ConnectionFailure,
            SshError::Transfer(_) => ErrorKind::TransferFailure,
            SshError::NotConnected | SshError::SessionNotOpen => ErrorKind::StateViolation,
        }
    }

    /// 是否为状态违规（仅提示，不记录到错误日志）
    pub fn is_state_violation(&self) -> bool {
        self.kind() == ErrorKind::StateViolation
    }
}

impl From<russh::Error> for SshError {
    fn from(e: russh::Error) -> Self {
        SshError::Protocol(e.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(e: russh::keys::Error) -> Self {
        SshError::Key(e.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(e: russh_sftp::client::error::Error) -> Self {
        SshError::Transfer(e.to_string())
    }
}
