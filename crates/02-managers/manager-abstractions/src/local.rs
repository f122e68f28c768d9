//! 本地组件管理器的反向调用接口

use async_trait::async_trait;
use manager_common::{
    ConnectionDescription, ConnectionId, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerResult,
};

/// GCM 反向调用 LCM 的接口
///
/// 本地接口对象只归创建它们的 LCM 所有，GCM 只能通过这些调用间接操作。
#[async_trait]
pub trait LocalManagerInterface: Send + Sync {
    /// LCM 所在进程名
    fn process_name(&self) -> &str;

    /// 创建组件代理
    async fn create_component_proxy(&self, component_proxy: &str) -> ManagerResult<()>;

    /// 移除组件代理
    async fn remove_component_proxy(&self, component_proxy: &str) -> ManagerResult<()>;

    /// 按描述在组件代理中创建提供接口代理
    async fn create_interface_provided_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceProvidedDescription,
    ) -> ManagerResult<()>;

    /// 按描述在组件代理中创建所需接口代理
    async fn create_interface_required_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceRequiredDescription,
    ) -> ManagerResult<()>;

    /// 移除提供接口代理
    async fn remove_interface_provided_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 移除所需接口代理
    async fn remove_interface_required_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 获取提供接口描述
    async fn get_interface_provided_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceProvidedDescription>;

    /// 获取所需接口描述
    async fn get_interface_required_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceRequiredDescription>;

    /// 服务端握手：绑定客户端组件代理与本地提供接口，并连接到客户端发布的端点
    async fn connect_server_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()>;

    /// 客户端握手：绑定本地所需接口与服务端组件代理，发布端点并确认连接
    async fn connect_client_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()>;

    /// 解除本进程内与该连接相关的本地绑定
    async fn disconnect_local(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()>;
}
