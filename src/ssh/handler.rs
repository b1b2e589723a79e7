// SSH 客户端 Handler 实现
// 实现 russh::client::Handler trait

use russh::keys::PublicKey;
use tracing::debug;

use super::host_key::HostKeyPolicy;

/// SSH 客户端 Handler
/// 主机密钥校验交给 HostKeyPolicy
pub struct SshClientHandler {
    /// 服务器主机名
    host: String,
    /// 服务器端口
    port: u16,
    /// 主机密钥校验策略
    policy: HostKeyPolicy,
}

impl SshClientHandler {
    /// 创建新的 Handler
    pub fn new(host: String, port: u16, policy: HostKeyPolicy) -> Self {
        Self { host, port, policy }
    }
}

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    /// 检查服务器公钥
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let accepted = self.policy.verify(&self.host, self.port, server_public_key);
        debug!(
            "[SSH] Host key policy {:?} for {}:{} -> {}",
            self.policy, self.host, self.port, accepted
        );
        Ok(accepted)
    }
}
