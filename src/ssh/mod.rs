// SSH 连接模块
//
// 模块结构:
// - config: 连接配置 (SshConfig, AuthMethod, DrainMode, HostKeyChecking)
// - error: 错误类型 (SshError, ErrorKind)
// - host_key: 主机密钥校验策略 (HostKeyPolicy)
// - handler: russh Handler 实现
// - client: SSH 客户端核心（连接与认证）
// - session: SSH 会话 (SshSession, TerminalChannel, ExecChannel)
// - drain: 交互式输出读取
// - manager: 单主机连接管理器 (ConnectionManager)

pub mod client;
pub mod config;
pub mod drain;
pub mod error;
pub mod handler;
pub mod host_key;
pub mod manager;
pub mod session;

// 公开导出
pub use client::SshClient;
pub use config::{AuthMethod, DrainMode, HostKeyChecking, SshConfig};
pub use error::{ErrorKind, SshError};
pub use host_key::{HostKeyInfo, HostKeyPolicy};
pub use manager::{ConnectFailure, ConnectionManager};
pub use session::{CommandOutcome, CommandOutput, PtyRequest, SshSession};
