//! 连接记录与连接表

use manager_common::{
    component_proxy_name, ConnectionDescription, ConnectionDescriptor, ConnectionId,
    ConnectionState, InterfaceLocation, ManagerError, ManagerResult,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::registry::InterfaceRole;

/// 一条逻辑连接
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    id: ConnectionId,
    description: ConnectionDescription,
    requester: String,
    state: ConnectionState,
    endpoint: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    requested_at: Instant,
}

impl ConnectionRecord {
    /// 创建处于 `Pending` 状态的连接记录
    pub fn new(
        id: ConnectionId,
        description: ConnectionDescription,
        requester: impl Into<String>,
    ) -> Self {
        Self {
            id,
            description,
            requester: requester.into(),
            state: ConnectionState::Pending,
            endpoint: None,
            created_at: chrono::Utc::now(),
            requested_at: Instant::now(),
        }
    }

    /// 连接标识
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// 六元组身份
    pub fn description(&self) -> &ConnectionDescription {
        &self.description
    }

    /// 发起请求的进程
    pub fn requester(&self) -> &str {
        &self.requester
    }

    /// 当前状态
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 提供接口代理的访问端点
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// 是否为跨进程连接
    pub fn is_remote(&self) -> bool {
        self.description.is_remote()
    }

    /// 未确认且超过超时时间
    pub fn is_expired(&self, timeout: Duration, now: Instant) -> bool {
        self.state == ConnectionState::Pending && now.duration_since(self.requested_at) > timeout
    }

    /// 转为对外的描述符
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: self.id,
            description: self.description.clone(),
            requester: self.requester.clone(),
            created_at: self.created_at,
        }
    }

    /// 该连接在注册表中登记的所有接口
    ///
    /// 跨进程连接还包括服务端进程中的所需接口代理和客户端进程中的提供接口代理。
    pub fn registry_targets(&self) -> Vec<(InterfaceLocation, InterfaceRole)> {
        registry_targets(&self.description)
    }
}

/// 连接在注册表中登记的所有接口
pub fn registry_targets(
    description: &ConnectionDescription,
) -> Vec<(InterfaceLocation, InterfaceRole)> {
    let mut targets = vec![
        (description.client.clone(), InterfaceRole::Required),
        (description.server.clone(), InterfaceRole::Provided),
    ];
    if description.is_remote() {
        targets.push((required_proxy_location(description), InterfaceRole::Required));
        targets.push((provided_proxy_location(description), InterfaceRole::Provided));
    }
    targets
}

/// 服务端进程中代表客户端所需接口的代理位置
pub fn required_proxy_location(description: &ConnectionDescription) -> InterfaceLocation {
    let client = &description.client;
    InterfaceLocation::new(
        description.server.process.clone(),
        component_proxy_name(&client.process, &client.component),
        client.interface.clone(),
    )
}

/// 客户端进程中代表服务端提供接口的代理位置
pub fn provided_proxy_location(description: &ConnectionDescription) -> InterfaceLocation {
    let server = &description.server;
    InterfaceLocation::new(
        description.client.process.clone(),
        component_proxy_name(&server.process, &server.component),
        server.interface.clone(),
    )
}

/// 连接表
///
/// 连接标识从 1 开始单调递增，断开后也不复用。
#[derive(Debug)]
pub struct ConnectionMap {
    records: BTreeMap<ConnectionId, ConnectionRecord>,
    next_id: ConnectionId,
}

impl ConnectionMap {
    /// 创建空连接表
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            next_id: ConnectionId::FIRST,
        }
    }

    /// 分配下一个连接标识
    pub fn allocate_id(&mut self) -> ManagerResult<ConnectionId> {
        let id = self.next_id;
        self.next_id = id
            .next()
            .ok_or_else(|| ManagerError::internal("连接标识已耗尽"))?;
        Ok(id)
    }

    /// 插入连接记录
    pub fn insert(&mut self, record: ConnectionRecord) -> ManagerResult<()> {
        if self.records.contains_key(&record.id) {
            return Err(ManagerError::internal(format!("连接标识重复: {}", record.id)));
        }
        self.records.insert(record.id, record);
        Ok(())
    }

    /// 查找连接记录
    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.records.get(&id)
    }

    /// 移除连接记录
    pub fn remove(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        self.records.remove(&id)
    }

    /// `Pending → Connected`
    pub fn confirm(&mut self, id: ConnectionId) -> ManagerResult<bool> {
        let record = self.get_mut(id)?;
        let changed = record.state == ConnectionState::Pending;
        record.state = ConnectionState::Connected;
        Ok(changed)
    }

    /// 设置提供接口代理的访问端点（只能设置一次）
    pub fn set_endpoint(&mut self, id: ConnectionId, endpoint: &str) -> ManagerResult<()> {
        let record = self.get_mut(id)?;
        if let Some(existing) = &record.endpoint {
            return Err(ManagerError::already_exists(format!(
                "连接 {id} 的访问端点已设置: {existing}"
            )));
        }
        record.endpoint = Some(endpoint.to_string());
        Ok(())
    }

    /// 读取提供接口代理的访问端点
    pub fn endpoint(&self, id: ConnectionId) -> ManagerResult<String> {
        let record = self
            .get(id)
            .ok_or_else(|| ManagerError::not_found(format!("连接不存在: {id}")))?;
        record
            .endpoint
            .clone()
            .ok_or_else(|| ManagerError::not_found(format!("连接 {id} 的访问端点尚未发布")))
    }

    /// 按名称查找已发布的访问端点
    pub fn endpoint_by_names(
        &self,
        client_process: &str,
        server: &InterfaceLocation,
    ) -> ManagerResult<String> {
        self.records
            .values()
            .filter(|record| {
                record.description.client.process == client_process
                    && record.description.server == *server
            })
            .find_map(|record| record.endpoint.clone())
            .ok_or_else(|| {
                ManagerError::not_found(format!("没有 {client_process} 到 {server} 的访问端点"))
            })
    }

    /// 涉及指定进程的连接
    pub fn involving(&self, process: &str) -> Vec<ConnectionId> {
        self.records
            .values()
            .filter(|record| record.description.involves_process(process))
            .map(|record| record.id)
            .collect()
    }

    /// 指定状态的连接，按标识排序
    pub fn records_in_state(&self, state: ConnectionState) -> Vec<&ConnectionRecord> {
        self.records
            .values()
            .filter(|record| record.state == state)
            .collect()
    }

    /// 已超时的未确认连接
    pub fn expired(&self, timeout: Duration, now: Instant) -> Vec<ConnectionId> {
        self.records
            .values()
            .filter(|record| record.is_expired(timeout, now))
            .map(|record| record.id)
            .collect()
    }

    /// 连接数量
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn get_mut(&mut self, id: ConnectionId) -> ManagerResult<&mut ConnectionRecord> {
        self.records
            .get_mut(&id)
            .ok_or_else(|| ManagerError::not_found(format!("连接不存在: {id}")))
    }
}

impl Default for ConnectionMap {
    fn default() -> Self {
        Self::new()
    }
}
