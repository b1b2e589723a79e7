// SSH 连接配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::SshError;

/// 默认连接超时（毫秒）
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1500;
/// 交互式会话默认等待间隔（毫秒）
pub const DEFAULT_SETTLE_MS: u64 = 1000;

fn default_port() -> u16 {
    22
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// SSH 连接配置
/// 构造后不可变，每个 ConnectionManager 持有一份
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SshConfig {
    /// 目标主机
    pub host: String,
    /// 端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 用户名
    pub username: String,
    /// 密码（use_key = false 时使用）
    #[serde(default)]
    pub password: Option<String>,
    /// 是否使用私钥认证
    #[serde(default, alias = "useKey")]
    pub use_key: bool,
    /// 私钥路径，未设置时连接时解析为 ~/.ssh/id_rsa
    #[serde(default, alias = "keyPath")]
    pub key_path: Option<PathBuf>,
    /// 私钥密码（如果有）
    #[serde(default)]
    pub passphrase: Option<String>,
    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// 交互式输出读取方式
    #[serde(default)]
    pub drain: DrainMode,
    /// 主机密钥校验方式
    #[serde(default)]
    pub host_key_checking: HostKeyChecking,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: None,
            use_key: false,
            key_path: None,
            passphrase: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            drain: DrainMode::default(),
            host_key_checking: HostKeyChecking::default(),
        }
    }
}

/// 认证方式
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// 密码认证
    Password(String),
    /// 公钥认证
    PublicKey {
        /// 私钥文件路径
        key_path: PathBuf,
        /// 私钥密码（如果有）
        passphrase: Option<String>,
    },
}

/// 交互式会话输出的读取方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DrainMode {
    /// 固定等待后读取已到达的数据
    FixedSettle { settle_ms: u64 },
    /// 指数退避轮询，有数据且安静一个步长后返回，或到达截止时间
    Adaptive {
        initial_ms: u64,
        max_step_ms: u64,
        deadline_ms: u64,
    },
}

impl Default for DrainMode {
    fn default() -> Self {
        DrainMode::FixedSettle {
            settle_ms: DEFAULT_SETTLE_MS,
        }
    }
}

/// 主机密钥校验方式（可序列化部分）
/// 回调式校验只能通过 HostKeyPolicy 以代码方式提供
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum HostKeyChecking {
    /// 接受任何主机密钥（不校验）
    #[default]
    AutoAccept,
    /// 与 known_hosts 文件比对，path 为空时使用 ~/.ssh/known_hosts
    KnownHosts {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl SshConfig {
    /// 密码认证配置
    pub fn with_password(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    /// 私钥认证配置，key_path 为 None 时使用默认私钥
    pub fn with_key(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        key_path: Option<PathBuf>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            use_key: true,
            key_path,
            ..Default::default()
        }
    }

    /// 从 JSON 文件加载配置
    pub fn load(path: &Path) -> Result<Self, SshError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SshError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            SshError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// 连接超时
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 地址字符串 host:port
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 解析当前生效的认证方式
    /// 私钥路径在这里才解析（连接时），构造时不校验
    pub fn auth_method(&self) -> Result<AuthMethod, SshError> {
        if !self.use_key {
            return Ok(AuthMethod::Password(
                self.password.clone().unwrap_or_default(),
            ));
        }

        let key_path = match &self.key_path {
            Some(path) => path.clone(),
            None => default_key_path()?,
        };

        if !key_path.exists() {
            return Err(SshError::Key(format!(
                "Private key not found: {}",
                key_path.display()
            )));
        }

        Ok(AuthMethod::PublicKey {
            key_path,
            passphrase: self.passphrase.clone(),
        })
    }

    /// 构建 russh 客户端配置
    pub fn to_russh_config(&self) -> russh::client::Config {
        // 不设置 inactivity_timeout：command 需要能无限期等待远程进程
        russh::client::Config::default()
    }
}

/// 默认私钥路径 ~/.ssh/id_rsa
pub fn default_key_path() -> Result<PathBuf, SshError> {
    dirs::home_dir()
        .map(|home| home.join(".ssh").join("id_rsa"))
        .ok_or_else(|| SshError::Key("Unable to determine home directory".to_string()))
}
