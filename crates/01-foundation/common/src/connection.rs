//! 连接相关类型

use serde::{Deserialize, Serialize};
use std::fmt;

/// 连接标识
///
/// 由 GCM 单调分配，从 1 开始，断开后也不会复用。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// 第一个可分配的连接标识
    pub const FIRST: Self = Self(1);

    /// 下一个连接标识，溢出时返回 `None`
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// 已登记，等待 `ConnectConfirm`
    Pending,
    /// 已确认
    Connected,
}

/// 连接一端的接口位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceLocation {
    /// 进程名
    pub process: String,
    /// 组件名
    pub component: String,
    /// 接口名
    pub interface: String,
}

impl InterfaceLocation {
    /// 创建新的接口位置
    pub fn new(
        process: impl Into<String>,
        component: impl Into<String>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            process: process.into(),
            component: component.into(),
            interface: interface.into(),
        }
    }
}

impl fmt::Display for InterfaceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.process, self.component, self.interface)
    }
}

/// 连接的六元组身份：客户端（所需接口）与服务端（提供接口）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionDescription {
    /// 所需/输入接口一端
    pub client: InterfaceLocation,
    /// 提供/输出接口一端
    pub server: InterfaceLocation,
}

impl ConnectionDescription {
    /// 创建新的连接描述
    pub fn new(client: InterfaceLocation, server: InterfaceLocation) -> Self {
        Self { client, server }
    }

    /// 由六个名称创建连接描述
    pub fn from_names(
        client_process: impl Into<String>,
        client_component: impl Into<String>,
        client_interface: impl Into<String>,
        server_process: impl Into<String>,
        server_component: impl Into<String>,
        server_interface: impl Into<String>,
    ) -> Self {
        Self {
            client: InterfaceLocation::new(client_process, client_component, client_interface),
            server: InterfaceLocation::new(server_process, server_component, server_interface),
        }
    }

    /// 是否为跨进程连接
    pub fn is_remote(&self) -> bool {
        self.client.process != self.server.process
    }

    /// 是否涉及指定进程
    pub fn involves_process(&self, process: &str) -> bool {
        self.client.process == process || self.server.process == process
    }

    /// 交换客户端与服务端
    pub fn swapped(&self) -> Self {
        Self {
            client: self.server.clone(),
            server: self.client.clone(),
        }
    }
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.client, self.server)
    }
}

/// `GetListOfConnections` 返回的连接描述符
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    /// 连接标识
    pub id: ConnectionId,
    /// 六元组身份
    pub description: ConnectionDescription,
    /// 发起请求的进程
    pub requester: String,
    /// 创建时间
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_sequence() {
        assert_eq!(ConnectionId::FIRST.0, 1);
        assert_eq!(ConnectionId::FIRST.next(), Some(ConnectionId(2)));
        assert_eq!(ConnectionId(u64::MAX).next(), None);
    }

    #[test]
    fn test_description_helpers() {
        let description =
            ConnectionDescription::from_names("P1", "Source", "Required", "P2", "Sink", "Provided");
        assert!(description.is_remote());
        assert!(description.involves_process("P2"));
        assert!(!description.involves_process("P3"));
        assert_eq!(description.swapped().client.component, "Sink");
        assert_eq!(
            description.to_string(),
            "P1:Source:Required - P2:Sink:Provided"
        );
    }
}
