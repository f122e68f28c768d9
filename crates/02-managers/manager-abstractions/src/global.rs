//! 全局组件管理器接口

use crate::local::LocalManagerInterface;
use async_trait::async_trait;
use manager_common::{
    ComponentKind, ConnectionDescription, ConnectionDescriptor, ConnectionId, ManagerResult,
};
use std::sync::Arc;

/// 全局组件管理器 trait
///
/// 注册表与连接表的唯一所有者。LCM 只能通过这些调用修改它们。
#[async_trait]
pub trait GlobalComponentManager: Send + Sync {
    // ---- 进程 ----

    /// 注册进程（没有反向调用句柄）
    async fn add_process(&self, process: &str) -> ManagerResult<()>;

    /// 注册进程及其反向调用句柄
    ///
    /// 进程已存在但还没有句柄时补上句柄。
    async fn add_process_object(
        &self,
        process: &str,
        handle: Arc<dyn LocalManagerInterface>,
    ) -> ManagerResult<()>;

    /// 移除进程，级联移除其所有组件
    async fn remove_process(&self, process: &str) -> ManagerResult<()>;

    /// 进程是否存在
    async fn find_process(&self, process: &str) -> ManagerResult<bool>;

    // ---- 组件 ----

    /// 注册组件
    async fn add_component(
        &self,
        process: &str,
        component: &str,
        kind: ComponentKind,
    ) -> ManagerResult<()>;

    /// 提交组件注册，通知观察者组件已就绪
    async fn commit_add_component(&self, process: &str, component: &str) -> ManagerResult<()>;

    /// 移除组件
    ///
    /// `cascade` 为 false 时组件仍有接口则失败。
    async fn remove_component(
        &self,
        process: &str,
        component: &str,
        cascade: bool,
    ) -> ManagerResult<()>;

    /// 组件是否存在
    async fn find_component(&self, process: &str, component: &str) -> ManagerResult<bool>;

    // ---- 接口 ----

    /// 注册提供/输出接口
    async fn add_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 注册所需/输入接口
    async fn add_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 移除提供/输出接口，先断开引用它的连接
    async fn remove_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 移除所需/输入接口，先断开引用它的连接
    async fn remove_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()>;

    /// 提供/输出接口是否存在
    async fn find_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool>;

    /// 所需/输入接口是否存在
    async fn find_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool>;

    // ---- 连接 ----

    /// 登记新连接，返回连接标识
    async fn connect(
        &self,
        requester: &str,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId>;

    /// 确认连接，`Pending → Connected`
    async fn connect_confirm(&self, id: ConnectionId) -> ManagerResult<()>;

    /// 请求断开连接（排队，幂等）
    async fn disconnect(&self, id: ConnectionId) -> ManagerResult<()>;

    /// 按六元组查找连接并请求断开
    async fn disconnect_by_description(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<()>;

    /// 已确认连接列表
    async fn get_list_of_connections(&self) -> ManagerResult<Vec<ConnectionDescriptor>>;

    /// 让客户端进程开始握手
    async fn initiate_connect(&self, id: ConnectionId) -> ManagerResult<()>;

    /// 让服务端进程完成握手
    async fn connect_server_side_interface_request(&self, id: ConnectionId) -> ManagerResult<()>;

    // ---- 端点交换 ----

    /// 记录提供接口代理的访问端点（只能设置一次）
    async fn set_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
        endpoint: &str,
    ) -> ManagerResult<()>;

    /// 读取提供接口代理的访问端点
    async fn get_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
    ) -> ManagerResult<String>;

    // ---- 查询 ----

    /// 所有进程名
    async fn get_names_of_processes(&self) -> ManagerResult<Vec<String>>;

    /// 进程内所有组件名
    async fn get_names_of_components(&self, process: &str) -> ManagerResult<Vec<String>>;

    /// 组件的提供/输出接口名
    async fn get_names_of_interfaces_provided_or_output(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>>;

    /// 组件的所需/输入接口名
    async fn get_names_of_interfaces_required_or_input(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>>;
}
