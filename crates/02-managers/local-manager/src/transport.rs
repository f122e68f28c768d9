//! 代理接口的访问端点

use async_trait::async_trait;
use dashmap::DashMap;
use manager_common::{ConnectionId, ManagerError, ManagerResult};
use tracing::debug;

/// 代理接口之间的传输通道
///
/// 客户端 LCM 为提供接口代理打开端点并发布给 GCM，
/// 服务端 LCM 取得端点后把所需接口代理接入。命令与事件的编解码不在此处。
#[async_trait]
pub trait ProxyTransport: Send + Sync {
    /// 为提供接口代理打开端点，返回端点字符串
    async fn open_endpoint(
        &self,
        process: &str,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<String>;

    /// 关闭端点
    async fn close_endpoint(&self, endpoint: &str);

    /// 把连接接入端点
    async fn attach(&self, id: ConnectionId, endpoint: &str) -> ManagerResult<()>;

    /// 断开连接与端点
    async fn detach(&self, id: ConnectionId);
}

/// 端点前缀
pub const LOOPBACK_SCHEME: &str = "loopback://";

/// 默认传输：只生成并校验端点字符串，不搬运数据
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    endpoints: DashMap<String, usize>,
    attachments: DashMap<ConnectionId, String>,
}

impl LoopbackTransport {
    /// 创建新的回环传输
    pub fn new() -> Self {
        Self::default()
    }

    /// 已打开的端点数
    pub fn open_endpoints(&self) -> usize {
        self.endpoints.len()
    }

    /// 连接接入的端点
    pub fn attachment(&self, id: ConnectionId) -> Option<String> {
        self.attachments.get(&id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ProxyTransport for LoopbackTransport {
    async fn open_endpoint(
        &self,
        process: &str,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<String> {
        let endpoint = format!("{LOOPBACK_SCHEME}{process}/{component_proxy}/{interface}");
        *self.endpoints.entry(endpoint.clone()).or_insert(0) += 1;
        debug!("打开代理端点: {}", endpoint);
        Ok(endpoint)
    }

    async fn close_endpoint(&self, endpoint: &str) {
        if self.endpoints.remove(endpoint).is_some() {
            debug!("关闭代理端点: {}", endpoint);
        }
    }

    async fn attach(&self, id: ConnectionId, endpoint: &str) -> ManagerResult<()> {
        let Some(path) = endpoint.strip_prefix(LOOPBACK_SCHEME) else {
            return Err(ManagerError::network(format!("不支持的端点: {endpoint}")));
        };
        if path.split('/').filter(|part| !part.is_empty()).count() != 3 {
            return Err(ManagerError::network(format!("端点格式错误: {endpoint}")));
        }
        self.attachments.insert(id, endpoint.to_string());
        debug!("连接 {} 已接入端点 {}", id, endpoint);
        Ok(())
    }

    async fn detach(&self, id: ConnectionId) {
        self.attachments.remove(&id);
    }
}
