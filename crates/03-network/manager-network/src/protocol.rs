//! 线路协议
//!
//! 一条 TCP 连接上双向复用请求/应答：LCM 调用 GCM ([`GlobalCall`])，
//! GCM 反向调用 LCM ([`LocalCall`])。每个请求带一个由发送方分配的标识，
//! 应答用同一标识匹配。

use manager_common::{
    ComponentKind, ConnectionDescription, ConnectionDescriptor, ConnectionId,
    InterfaceProvidedDescription, InterfaceRequiredDescription, ManagerError, ManagerResult,
    WireError,
};
use serde::{Deserialize, Serialize};

/// 帧
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// 请求
    Request {
        /// 请求标识
        id: u64,
        /// 请求内容
        request: Request,
    },
    /// 应答
    Response {
        /// 对应的请求标识
        id: u64,
        /// 结果
        result: Result<Reply, WireError>,
    },
}

/// 请求，按调用方向区分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "target", content = "call", rename_all = "snake_case")]
pub enum Request {
    /// 发往 GCM
    Global(GlobalCall),
    /// 发往 LCM
    Local(LocalCall),
}

/// LCM 调用 GCM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum GlobalCall {
    AddProcess { process: String },
    AddProcessObject { process: String },
    RemoveProcess { process: String },
    FindProcess { process: String },
    AddComponent { process: String, component: String, kind: ComponentKind },
    CommitAddComponent { process: String, component: String },
    RemoveComponent { process: String, component: String, cascade: bool },
    FindComponent { process: String, component: String },
    AddInterfaceProvided { process: String, component: String, interface: String },
    AddInterfaceRequired { process: String, component: String, interface: String },
    RemoveInterfaceProvided { process: String, component: String, interface: String },
    RemoveInterfaceRequired { process: String, component: String, interface: String },
    FindInterfaceProvided { process: String, component: String, interface: String },
    FindInterfaceRequired { process: String, component: String, interface: String },
    Connect { requester: String, description: ConnectionDescription },
    ConnectConfirm { id: ConnectionId },
    Disconnect { id: ConnectionId },
    DisconnectByDescription { description: ConnectionDescription },
    GetListOfConnections,
    InitiateConnect { id: ConnectionId },
    ConnectServerSideInterfaceRequest { id: ConnectionId },
    SetAccessInfo { id: ConnectionId, endpoint: String },
    GetAccessInfo { id: ConnectionId },
    GetNamesOfProcesses,
    GetNamesOfComponents { process: String },
    GetNamesOfInterfacesProvided { process: String, component: String },
    GetNamesOfInterfacesRequired { process: String, component: String },
}

/// GCM 反向调用 LCM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum LocalCall {
    CreateComponentProxy { component_proxy: String },
    RemoveComponentProxy { component_proxy: String },
    CreateInterfaceProvidedProxy {
        component_proxy: String,
        description: InterfaceProvidedDescription,
    },
    CreateInterfaceRequiredProxy {
        component_proxy: String,
        description: InterfaceRequiredDescription,
    },
    RemoveInterfaceProvidedProxy { component_proxy: String, interface: String },
    RemoveInterfaceRequiredProxy { component_proxy: String, interface: String },
    GetInterfaceProvidedDescription { component: String, interface: String },
    GetInterfaceRequiredDescription { component: String, interface: String },
    ConnectServerSideInterface { id: ConnectionId, description: ConnectionDescription },
    ConnectClientSideInterface { id: ConnectionId, description: ConnectionDescription },
    DisconnectLocal { id: ConnectionId, description: ConnectionDescription },
}

/// 应答内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Reply {
    Unit,
    Flag(bool),
    Connection(ConnectionId),
    Endpoint(String),
    Names(Vec<String>),
    Connections(Vec<ConnectionDescriptor>),
    ProvidedDescription(InterfaceProvidedDescription),
    RequiredDescription(InterfaceRequiredDescription),
}

impl Reply {
    fn unexpected(self, expected: &str) -> ManagerError {
        ManagerError::network(format!("应答类型不符: 期望 {expected}，收到 {self:?}"))
    }

    /// 无返回值
    pub fn into_unit(self) -> ManagerResult<()> {
        match self {
            Self::Unit => Ok(()),
            other => Err(other.unexpected("unit")),
        }
    }

    /// 布尔值
    pub fn into_flag(self) -> ManagerResult<bool> {
        match self {
            Self::Flag(flag) => Ok(flag),
            other => Err(other.unexpected("flag")),
        }
    }

    /// 连接标识
    pub fn into_connection(self) -> ManagerResult<ConnectionId> {
        match self {
            Self::Connection(id) => Ok(id),
            other => Err(other.unexpected("connection")),
        }
    }

    /// 访问端点
    pub fn into_endpoint(self) -> ManagerResult<String> {
        match self {
            Self::Endpoint(endpoint) => Ok(endpoint),
            other => Err(other.unexpected("endpoint")),
        }
    }

    /// 名称列表
    pub fn into_names(self) -> ManagerResult<Vec<String>> {
        match self {
            Self::Names(names) => Ok(names),
            other => Err(other.unexpected("names")),
        }
    }

    /// 连接列表
    pub fn into_connections(self) -> ManagerResult<Vec<ConnectionDescriptor>> {
        match self {
            Self::Connections(connections) => Ok(connections),
            other => Err(other.unexpected("connections")),
        }
    }

    /// 提供接口描述
    pub fn into_provided_description(self) -> ManagerResult<InterfaceProvidedDescription> {
        match self {
            Self::ProvidedDescription(description) => Ok(description),
            other => Err(other.unexpected("provided_description")),
        }
    }

    /// 所需接口描述
    pub fn into_required_description(self) -> ManagerResult<InterfaceRequiredDescription> {
        match self {
            Self::RequiredDescription(description) => Ok(description),
            other => Err(other.unexpected("required_description")),
        }
    }
}
