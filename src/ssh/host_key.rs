// 主机密钥校验策略
// AutoAccept 为宽松模式（不校验），KnownHosts 与 known_hosts 文件比对，Callback 由调用方决定

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use russh::keys::PublicKey;
use tracing::{info, warn};

use super::config::HostKeyChecking;

/// 服务器公钥信息（交给回调判断）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostKeyInfo {
    /// 主机地址
    pub host: String,
    /// 端口
    pub port: u16,
    /// 密钥类型（ssh-ed25519, ssh-rsa 等）
    pub key_type: String,
    /// SHA256 指纹
    pub fingerprint: String,
}

impl HostKeyInfo {
    pub fn from_key(host: &str, port: u16, key: &PublicKey) -> Self {
        Self {
            host: host.to_string(),
            port,
            key_type: key.algorithm().to_string(),
            fingerprint: key
                .fingerprint(russh::keys::ssh_key::HashAlg::Sha256)
                .to_string(),
        }
    }
}

/// 回调类型：返回 true 表示信任该主机密钥
pub type HostKeyCallback = Arc<dyn Fn(&HostKeyInfo) -> bool + Send + Sync>;

/// 主机密钥校验策略
#[derive(Clone, Default)]
pub enum HostKeyPolicy {
    /// 接受任何主机密钥
    #[default]
    AutoAccept,
    /// 只接受 known_hosts 中已记录的密钥，None 表示 ~/.ssh/known_hosts
    KnownHosts(Option<PathBuf>),
    /// 交给调用方判断
    Callback(HostKeyCallback),
}

impl fmt::Debug for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoAccept => write!(f, "AutoAccept"),
            Self::KnownHosts(path) => f.debug_tuple("KnownHosts").field(path).finish(),
            Self::Callback(_) => write!(f, "Callback(..)"),
        }
    }
}

impl From<&HostKeyChecking> for HostKeyPolicy {
    fn from(checking: &HostKeyChecking) -> Self {
        match checking {
            HostKeyChecking::AutoAccept => Self::AutoAccept,
            HostKeyChecking::KnownHosts { path } => Self::KnownHosts(path.clone()),
        }
    }
}

impl HostKeyPolicy {
    /// 以闭包构造回调策略
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&HostKeyInfo) -> bool + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    /// 校验服务器公钥
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> bool {
        let key_info = HostKeyInfo::from_key(host, port, key);
        info!(
            "[SSH] Server key for {}:{} ({}): {}",
            host, port, key_info.key_type, key_info.fingerprint
        );

        match self {
            Self::AutoAccept => true,
            Self::KnownHosts(path) => {
                let result = match path {
                    Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
                    None => russh::keys::check_known_hosts(host, port, key),
                };
                match result {
                    Ok(true) => true,
                    Ok(false) => {
                        warn!("[SSH] Host {}:{} not found in known_hosts", host, port);
                        false
                    }
                    Err(e) => {
                        warn!("[SSH] Host key check failed for {}:{}: {}", host, port, e);
                        false
                    }
                }
            }
            Self::Callback(callback) => callback(&key_info),
        }
    }
}
