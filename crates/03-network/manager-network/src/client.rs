//! LCM 侧的 GCM 客户端

use async_trait::async_trait;
use manager_abstractions::{GlobalComponentManager, LocalManagerInterface};
use manager_common::{
    ComponentKind, ConnectionDescription, ConnectionDescriptor, ConnectionId, ManagerConfig,
    ManagerError, ManagerResult,
};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::link::{Link, RequestHandler};
use crate::protocol::{GlobalCall, LocalCall, Reply, Request};

/// 通过 TCP 访问远程 GCM
///
/// 同一条链路也承载 GCM 的反向调用，它们被转交给
/// [`GlobalComponentManager::add_process_object`] 注册的本地管理器。
#[derive(Debug)]
pub struct GlobalManagerClient {
    link: Arc<Link>,
    reverse: Arc<ReverseDispatcher>,
}

impl GlobalManagerClient {
    /// 连接到配置中的 GCM 地址
    pub async fn connect(config: &ManagerConfig) -> ManagerResult<Self> {
        Self::connect_to(&config.listen_address(), config).await
    }

    /// 连接到指定地址
    pub async fn connect_to(address: &str, config: &ManagerConfig) -> ManagerResult<Self> {
        let stream = tokio::time::timeout(config.request_timeout(), TcpStream::connect(address))
            .await
            .map_err(|_| ManagerError::timeout(format!("连接 GCM {address} 超时")))?
            .map_err(|e| ManagerError::network(format!("连接 GCM {address} 失败: {e}")))?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("设置 TCP_NODELAY 失败: {}", e);
        }

        let reverse = Arc::new(ReverseDispatcher::default());
        let (link, _task) = Link::spawn(stream, address, config, reverse.clone());
        info!("已连接到 GCM: {}", address);
        Ok(Self { link, reverse })
    }

    /// 链路是否仍然可用
    pub fn is_connected(&self) -> bool {
        !self.link.is_closed()
    }

    /// 关闭链路，GCM 会移除经由它注册的进程
    pub fn close(&self) {
        self.link.close();
    }

    async fn call(&self, call: GlobalCall) -> ManagerResult<Reply> {
        self.link.call(Request::Global(call)).await
    }
}

impl Drop for GlobalManagerClient {
    fn drop(&mut self) {
        self.link.close();
    }
}

/// 把反向调用转交给本地管理器
#[derive(Default)]
struct ReverseDispatcher {
    local: RwLock<Option<Weak<dyn LocalManagerInterface>>>,
}

impl ReverseDispatcher {
    fn attach(&self, handle: &Arc<dyn LocalManagerInterface>) {
        *self.local.write() = Some(Arc::downgrade(handle));
    }

    fn local(&self) -> ManagerResult<Arc<dyn LocalManagerInterface>> {
        self.local
            .read()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or_else(|| ManagerError::invalid_state("本链路上没有注册本地管理器"))
    }
}

impl std::fmt::Debug for ReverseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let process = self.local().ok().map(|local| local.process_name().to_string());
        f.debug_struct("ReverseDispatcher").field("process", &process).finish()
    }
}

#[async_trait]
impl RequestHandler for ReverseDispatcher {
    async fn handle(&self, _link: &Arc<Link>, request: Request) -> ManagerResult<Reply> {
        let call = match request {
            Request::Local(call) => call,
            Request::Global(call) => {
                return Err(ManagerError::invalid_state(format!(
                    "LCM 不处理发往 GCM 的请求: {call:?}"
                )))
            }
        };
        let local = self.local()?;
        let reply = match call {
            LocalCall::CreateComponentProxy { component_proxy } => {
                local.create_component_proxy(&component_proxy).await?;
                Reply::Unit
            }
            LocalCall::RemoveComponentProxy { component_proxy } => {
                local.remove_component_proxy(&component_proxy).await?;
                Reply::Unit
            }
            LocalCall::CreateInterfaceProvidedProxy { component_proxy, description } => {
                local
                    .create_interface_provided_proxy(&component_proxy, &description)
                    .await?;
                Reply::Unit
            }
            LocalCall::CreateInterfaceRequiredProxy { component_proxy, description } => {
                local
                    .create_interface_required_proxy(&component_proxy, &description)
                    .await?;
                Reply::Unit
            }
            LocalCall::RemoveInterfaceProvidedProxy { component_proxy, interface } => {
                local
                    .remove_interface_provided_proxy(&component_proxy, &interface)
                    .await?;
                Reply::Unit
            }
            LocalCall::RemoveInterfaceRequiredProxy { component_proxy, interface } => {
                local
                    .remove_interface_required_proxy(&component_proxy, &interface)
                    .await?;
                Reply::Unit
            }
            LocalCall::GetInterfaceProvidedDescription {
                component,
                interface,
            } => Reply::ProvidedDescription(
                local
                    .get_interface_provided_description(&component, &interface)
                    .await?,
            ),
            LocalCall::GetInterfaceRequiredDescription {
                component,
                interface,
            } => Reply::RequiredDescription(
                local
                    .get_interface_required_description(&component, &interface)
                    .await?,
            ),
            LocalCall::ConnectServerSideInterface { id, description } => {
                local.connect_server_side_interface(id, &description).await?;
                Reply::Unit
            }
            LocalCall::ConnectClientSideInterface { id, description } => {
                local.connect_client_side_interface(id, &description).await?;
                Reply::Unit
            }
            LocalCall::DisconnectLocal { id, description } => {
                local.disconnect_local(id, &description).await?;
                Reply::Unit
            }
        };
        Ok(reply)
    }
}

#[async_trait]
impl GlobalComponentManager for GlobalManagerClient {
    async fn add_process(&self, process: &str) -> ManagerResult<()> {
        self.call(GlobalCall::AddProcess {
            process: process.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn add_process_object(
        &self,
        process: &str,
        handle: Arc<dyn LocalManagerInterface>,
    ) -> ManagerResult<()> {
        self.reverse.attach(&handle);
        self.call(GlobalCall::AddProcessObject {
            process: process.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_process(&self, process: &str) -> ManagerResult<()> {
        self.call(GlobalCall::RemoveProcess {
            process: process.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn find_process(&self, process: &str) -> ManagerResult<bool> {
        self.call(GlobalCall::FindProcess {
            process: process.to_string(),
        })
        .await?
        .into_flag()
    }

    async fn add_component(
        &self,
        process: &str,
        component: &str,
        kind: ComponentKind,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::AddComponent {
            process: process.to_string(),
            component: component.to_string(),
            kind,
        })
        .await?
        .into_unit()
    }

    async fn commit_add_component(&self, process: &str, component: &str) -> ManagerResult<()> {
        self.call(GlobalCall::CommitAddComponent {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_component(
        &self,
        process: &str,
        component: &str,
        cascade: bool,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::RemoveComponent {
            process: process.to_string(),
            component: component.to_string(),
            cascade,
        })
        .await?
        .into_unit()
    }

    async fn find_component(&self, process: &str, component: &str) -> ManagerResult<bool> {
        self.call(GlobalCall::FindComponent {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await?
        .into_flag()
    }

    async fn add_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::AddInterfaceProvided {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn add_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::AddInterfaceRequired {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::RemoveInterfaceProvided {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::RemoveInterfaceRequired {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn find_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool> {
        self.call(GlobalCall::FindInterfaceProvided {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_flag()
    }

    async fn find_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool> {
        self.call(GlobalCall::FindInterfaceRequired {
            process: process.to_string(),
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_flag()
    }

    async fn connect(
        &self,
        requester: &str,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId> {
        self.call(GlobalCall::Connect {
            requester: requester.to_string(),
            description: description.clone(),
        })
        .await?
        .into_connection()
    }

    async fn connect_confirm(&self, id: ConnectionId) -> ManagerResult<()> {
        self.call(GlobalCall::ConnectConfirm { id }).await?.into_unit()
    }

    async fn disconnect(&self, id: ConnectionId) -> ManagerResult<()> {
        self.call(GlobalCall::Disconnect { id }).await?.into_unit()
    }

    async fn disconnect_by_description(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::DisconnectByDescription {
            description: description.clone(),
        })
        .await?
        .into_unit()
    }

    async fn get_list_of_connections(&self) -> ManagerResult<Vec<ConnectionDescriptor>> {
        self.call(GlobalCall::GetListOfConnections)
            .await?
            .into_connections()
    }

    async fn initiate_connect(&self, id: ConnectionId) -> ManagerResult<()> {
        self.call(GlobalCall::InitiateConnect { id }).await?.into_unit()
    }

    async fn connect_server_side_interface_request(&self, id: ConnectionId) -> ManagerResult<()> {
        self.call(GlobalCall::ConnectServerSideInterfaceRequest { id })
            .await?
            .into_unit()
    }

    async fn set_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
        endpoint: &str,
    ) -> ManagerResult<()> {
        self.call(GlobalCall::SetAccessInfo {
            id,
            endpoint: endpoint.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn get_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
    ) -> ManagerResult<String> {
        self.call(GlobalCall::GetAccessInfo { id }).await?.into_endpoint()
    }

    async fn get_names_of_processes(&self) -> ManagerResult<Vec<String>> {
        self.call(GlobalCall::GetNamesOfProcesses).await?.into_names()
    }

    async fn get_names_of_components(&self, process: &str) -> ManagerResult<Vec<String>> {
        self.call(GlobalCall::GetNamesOfComponents {
            process: process.to_string(),
        })
        .await?
        .into_names()
    }

    async fn get_names_of_interfaces_provided_or_output(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>> {
        self.call(GlobalCall::GetNamesOfInterfacesProvided {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await?
        .into_names()
    }

    async fn get_names_of_interfaces_required_or_input(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>> {
        self.call(GlobalCall::GetNamesOfInterfacesRequired {
            process: process.to_string(),
            component: component.to_string(),
        })
        .await?
        .into_names()
    }
}
