//! GCM 侧的远程 LCM 句柄

use async_trait::async_trait;
use manager_abstractions::LocalManagerInterface;
use manager_common::{
    ConnectionDescription, ConnectionId, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerResult,
};
use std::sync::Arc;

use crate::link::Link;
use crate::protocol::{LocalCall, Reply, Request};

/// 通过链路转发反向调用的 LCM 句柄
#[derive(Debug)]
pub struct RemoteLocalManager {
    process: String,
    link: Arc<Link>,
}

impl RemoteLocalManager {
    /// 为进程创建远程句柄
    pub fn new(process: impl Into<String>, link: Arc<Link>) -> Self {
        Self {
            process: process.into(),
            link,
        }
    }

    async fn call(&self, call: LocalCall) -> ManagerResult<Reply> {
        self.link.call(Request::Local(call)).await
    }
}

#[async_trait]
impl LocalManagerInterface for RemoteLocalManager {
    fn process_name(&self) -> &str {
        &self.process
    }

    async fn create_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        self.call(LocalCall::CreateComponentProxy {
            component_proxy: component_proxy.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        self.call(LocalCall::RemoveComponentProxy {
            component_proxy: component_proxy.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn create_interface_provided_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceProvidedDescription,
    ) -> ManagerResult<()> {
        self.call(LocalCall::CreateInterfaceProvidedProxy {
            component_proxy: component_proxy.to_string(),
            description: description.clone(),
        })
        .await?
        .into_unit()
    }

    async fn create_interface_required_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceRequiredDescription,
    ) -> ManagerResult<()> {
        self.call(LocalCall::CreateInterfaceRequiredProxy {
            component_proxy: component_proxy.to_string(),
            description: description.clone(),
        })
        .await?
        .into_unit()
    }

    async fn remove_interface_provided_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(LocalCall::RemoveInterfaceProvidedProxy {
            component_proxy: component_proxy.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn remove_interface_required_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.call(LocalCall::RemoveInterfaceRequiredProxy {
            component_proxy: component_proxy.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_unit()
    }

    async fn get_interface_provided_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceProvidedDescription> {
        self.call(LocalCall::GetInterfaceProvidedDescription {
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_provided_description()
    }

    async fn get_interface_required_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceRequiredDescription> {
        self.call(LocalCall::GetInterfaceRequiredDescription {
            component: component.to_string(),
            interface: interface.to_string(),
        })
        .await?
        .into_required_description()
    }

    async fn connect_server_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.call(LocalCall::ConnectServerSideInterface {
            id,
            description: description.clone(),
        })
        .await?
        .into_unit()
    }

    async fn connect_client_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.call(LocalCall::ConnectClientSideInterface {
            id,
            description: description.clone(),
        })
        .await?
        .into_unit()
    }

    async fn disconnect_local(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.call(LocalCall::DisconnectLocal {
            id,
            description: description.clone(),
        })
        .await?
        .into_unit()
    }
}
