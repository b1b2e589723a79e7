// sshmanager - 单主机 SSH 客户端封装
//
// 一条控制连接用于一次性命令和交互式会话，文件上传/下载每次使用独立连接。

pub mod logging;
pub mod services;
pub mod ssh;

pub use services::sftp::{TransferDirection, TransferReport};
pub use ssh::{
    AuthMethod, CommandOutcome, CommandOutput, ConnectFailure, ConnectionManager, DrainMode,
    ErrorKind, HostKeyChecking, HostKeyInfo, HostKeyPolicy, SshConfig, SshError,
};
