// SSH 客户端核心实现
// 建立 TCP 连接、SSH 握手、认证，返回 SshSession

use std::path::Path;
use std::sync::Arc;

use russh::client::{AuthResult, Handle};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use super::config::{AuthMethod, SshConfig};
use super::error::SshError;
use super::handler::SshClientHandler;
use super::host_key::HostKeyPolicy;
use super::session::SshSession;

/// SSH 客户端
/// 负责建立 SSH 连接并返回 SshSession
pub struct SshClient<'a> {
    /// 连接配置
    config: &'a SshConfig,
    /// 主机密钥校验策略
    policy: HostKeyPolicy,
}

impl<'a> SshClient<'a> {
    /// 创建新的 SSH 客户端
    pub fn new(config: &'a SshConfig, policy: HostKeyPolicy) -> Self {
        Self { config, policy }
    }

    /// 执行连接（异步）
    /// TCP 连接和 SSH 握手各自受 connect_timeout 限制
    pub async fn connect(&self) -> Result<SshSession, SshError> {
        let config = self.config;
        debug!(
            "[SSH] Target: {}@{}:{}",
            config.username, config.host, config.port
        );

        // 认证方式在连接时解析（包括默认私钥路径）
        let auth = config.auth_method()?;

        let connect_timeout = config.connect_timeout();
        let timeout_err = || SshError::Timeout(config.connect_timeout_ms);

        // TCP 连接
        let addr = config.address();
        info!("[SSH] Connecting to {}...", addr);
        let tcp_stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| timeout_err())?
            .map_err(SshError::Io)?;

        // SSH 握手
        debug!("[SSH] TCP connection established, starting handshake");
        let russh_config = Arc::new(config.to_russh_config());
        let handler = SshClientHandler::new(config.host.clone(), config.port, self.policy.clone());

        let mut handle = timeout(
            connect_timeout,
            russh::client::connect_stream(russh_config, tcp_stream, handler),
        )
        .await
        .map_err(|_| timeout_err())?
        .map_err(|e| match e {
            russh::Error::UnknownKey => SshError::HostKeyRejected(addr.clone()),
            other => SshError::from(other),
        })?;

        // 认证
        info!("[SSH] Authenticating as '{}'...", config.username);
        self.authenticate(&mut handle, &auth).await?;
        info!("[SSH] Connected to {}@{}", config.username, addr);

        Ok(SshSession::new(
            handle,
            config.host.clone(),
            config.username.clone(),
        ))
    }

    /// 执行认证
    async fn authenticate(
        &self,
        handle: &mut Handle<SshClientHandler>,
        auth: &AuthMethod,
    ) -> Result<(), SshError> {
        let username = &self.config.username;

        let auth_result = match auth {
            AuthMethod::Password(password) => {
                debug!("[SSH] Using password authentication");
                handle.authenticate_password(username, password).await?
            }
            AuthMethod::PublicKey {
                key_path,
                passphrase,
            } => {
                debug!("[SSH] Using public key authentication: {:?}", key_path);

                let key = load_private_key(key_path, passphrase.as_deref()).await?;
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let key_with_alg = russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);

                handle.authenticate_publickey(username, key_with_alg).await?
            }
        };

        match auth_result {
            AuthResult::Success => Ok(()),
            AuthResult::Failure {
                remaining_methods,
                partial_success,
            } => {
                if partial_success {
                    return Err(SshError::Auth(
                        "Partial authentication - additional auth required".to_string(),
                    ));
                }
                Err(SshError::Auth(format!(
                    "Authentication rejected for '{}'. Server suggests: {:?}",
                    username, remaining_methods
                )))
            }
        }
    }
}

/// 加载私钥文件
pub async fn load_private_key(
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<russh::keys::PrivateKey, SshError> {
    let key_data = tokio::fs::read(key_path)
        .await
        .map_err(|e| SshError::Key(format!("Failed to read key file {:?}: {}", key_path, e)))?;

    russh::keys::decode_secret_key(&String::from_utf8_lossy(&key_data), passphrase)
        .map_err(|e| SshError::Key(format!("Failed to decode key {:?}: {}", key_path, e)))
}
