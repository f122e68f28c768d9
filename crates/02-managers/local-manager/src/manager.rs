//! 本地组件管理器

use async_trait::async_trait;
use manager_abstractions::{GlobalComponentManager, LocalManagerInterface};
use manager_common::{
    component_proxy_name, describe_available, interface_component_required_for,
    is_proxy_component_name, manager_component_client_name, ComponentKind, ComponentState,
    ConnectionDescription, ConnectionId, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerConfig, ManagerError, ManagerResult, GCM_PROCESS_NAME,
    INTERFACE_INTERNAL_PROVIDED, MANAGER_COMPONENT_SERVER_NAME,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::component::{Component, ComponentBehavior};
use crate::interface::{
    check_compatibility, internal_interface_description, manager_client_required_description,
    Binding, InterfaceProvided, InterfaceRequired,
};
use crate::transport::{LoopbackTransport, ProxyTransport};

/// 等待组件状态时的轮询间隔
const STATE_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
enum Transition {
    Create,
    Start,
    Kill,
}

impl Transition {
    fn applies_to(self, state: ComponentState) -> bool {
        match self {
            Self::Create => state.can_create(),
            Self::Start => state.can_start(),
            Self::Kill => state.can_kill(),
        }
    }

    fn target(self) -> ComponentState {
        match self {
            Self::Create => ComponentState::Ready,
            Self::Start => ComponentState::Active,
            Self::Kill => ComponentState::Finished,
        }
    }
}

/// 本地组件管理器
///
/// 每个进程一个。拥有本地组件表，是唯一能修改本地接口对象的实体；
/// 跨进程的登记一律委托给 GCM。
pub struct LocalManager {
    process: String,
    config: ManagerConfig,
    global: Arc<dyn GlobalComponentManager>,
    transport: Arc<dyn ProxyTransport>,
    components: RwLock<BTreeMap<String, Component>>,
    connections: RwLock<BTreeMap<ConnectionId, ConnectionDescription>>,
}

impl LocalManager {
    /// 创建 LCM，需要再调用 [`LocalManager::initialize`] 向 GCM 注册
    pub fn new(
        process: impl Into<String>,
        global: Arc<dyn GlobalComponentManager>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            process: process.into(),
            config,
            global,
            transport: Arc::new(LoopbackTransport::new()),
            components: RwLock::new(BTreeMap::new()),
            connections: RwLock::new(BTreeMap::new()),
        }
    }

    /// 替换代理传输
    pub fn with_transport(mut self, transport: Arc<dyn ProxyTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// 创建并初始化 LCM
    pub async fn create(
        process: impl Into<String>,
        global: Arc<dyn GlobalComponentManager>,
        config: ManagerConfig,
    ) -> ManagerResult<Arc<Self>> {
        let manager = Arc::new(Self::new(process, global, config));
        manager.initialize().await?;
        Ok(manager)
    }

    /// 向 GCM 注册本进程并添加管理器组件
    pub async fn initialize(self: &Arc<Self>) -> ManagerResult<()> {
        let handle: Arc<dyn LocalManagerInterface> =
            Arc::clone(self) as Arc<dyn LocalManagerInterface>;
        self.global.add_process_object(&self.process, handle).await?;

        let client = manager_component_client_name(&self.process);
        self.register_component(Component::with_kind(client, ComponentKind::ManagerClient))
            .await?;
        if self.process == GCM_PROCESS_NAME {
            self.register_component(Component::with_kind(
                MANAGER_COMPONENT_SERVER_NAME,
                ComponentKind::ManagerServer,
            ))
            .await?;
        }
        info!("本地组件管理器已初始化: {}", self.process);
        Ok(())
    }

    /// 进程名
    pub fn process(&self) -> &str {
        &self.process
    }

    /// 配置
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// GCM
    pub fn global(&self) -> &Arc<dyn GlobalComponentManager> {
        &self.global
    }

    // ---- 组件 ----

    /// 添加用户组件
    ///
    /// 先在 GCM 注册组件及其接口，再写入本地组件表，最后绑定到本进程的管理器组件客户端。
    pub async fn add_component(&self, component: Component) -> ManagerResult<()> {
        if component.kind() != ComponentKind::Generic {
            return Err(ManagerError::invalid_state(format!(
                "只能直接添加用户组件: {} ({:?})",
                component.name(),
                component.kind()
            )));
        }
        if is_proxy_component_name(component.name()) {
            return Err(ManagerError::invalid_state(format!(
                "用户组件名称不能使用代理组件的命名: {}",
                component.name()
            )));
        }
        let name = component.name().to_string();
        self.register_component(component).await?;
        if let Err(e) = self.bind_manager_client(&name).await {
            warn!("组件 {} 绑定管理器组件客户端失败，撤销添加: {}", name, e);
            if let Err(undo) = self.remove_component(&name).await {
                warn!("撤销添加组件 {} 失败: {}", name, undo);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn register_component(&self, mut component: Component) -> ManagerResult<()> {
        let name = component.name().to_string();
        let kind = component.kind();
        if self.components.read().contains_key(&name) {
            return Err(ManagerError::already_exists(format!(
                "组件已存在: {}:{name}",
                self.process
            )));
        }
        if kind.is_user() && component.interface_provided(INTERFACE_INTERNAL_PROVIDED).is_err() {
            component.add_interface_provided(InterfaceProvided::new(internal_interface_description(
                INTERFACE_INTERNAL_PROVIDED,
            )))?;
        }

        self.global.add_component(&self.process, &name, kind).await?;
        let (provided, required) = component.unregistered_interfaces();
        let registered = match self.register_names(&name, &provided, &required).await {
            Ok(()) => self.global.commit_add_component(&self.process, &name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            self.forget_component(&name).await;
            return Err(e);
        }
        component.mark_registered(&provided, &required);

        let inserted = {
            let mut components = self.components.write();
            if components.contains_key(&name) {
                false
            } else {
                components.insert(name.clone(), component);
                true
            }
        };
        if !inserted {
            self.forget_component(&name).await;
            return Err(ManagerError::already_exists(format!(
                "组件已存在: {}:{name}",
                self.process
            )));
        }
        info!("组件已添加: {}:{} ({:?})", self.process, name, kind);
        Ok(())
    }

    async fn forget_component(&self, name: &str) {
        if let Err(e) = self.global.remove_component(&self.process, name, true).await {
            warn!("从 GCM 撤销组件 {} 失败: {}", name, e);
        }
    }

    async fn bind_manager_client(&self, component: &str) -> ManagerResult<()> {
        let client = manager_component_client_name(&self.process);
        let interface = interface_component_required_for(component);
        self.add_interface_required(&client, manager_client_required_description(&interface))
            .await?;
        self.connect(&client, &interface, component, INTERFACE_INTERNAL_PROVIDED)
            .await?;
        Ok(())
    }

    /// 移除用户组件
    ///
    /// 先从 GCM 注销（其连接进入断开队列），再从本地组件表移除。
    pub async fn remove_component(&self, name: &str) -> ManagerResult<()> {
        let kind = self.read_component(name, Component::kind)?;
        if kind != ComponentKind::Generic {
            return Err(ManagerError::invalid_state(format!(
                "组件 {name} 由管理器维护 ({kind:?})，不能直接移除"
            )));
        }
        self.global.remove_component(&self.process, name, true).await?;
        self.components.write().remove(name);

        let client = manager_component_client_name(&self.process);
        let interface = interface_component_required_for(name);
        let removed = self
            .components
            .write()
            .get_mut(&client)
            .and_then(|component| component.remove_interface_required(&interface))
            .is_some();
        if removed {
            if let Err(e) = self
                .global
                .remove_interface_required_or_input(&self.process, &client, &interface)
                .await
            {
                warn!("注销管理器组件客户端接口 {} 失败: {}", interface, e);
            }
        }
        info!("组件已移除: {}:{}", self.process, name);
        Ok(())
    }

    /// 移除所有用户组件
    pub async fn remove_all_user_components(&self) -> ManagerResult<()> {
        let names = self.names_of_kind(ComponentKind::Generic);
        let mut first_error = None;
        for name in names {
            if let Err(e) = self.remove_component(&name).await {
                warn!("移除组件 {} 失败: {}", name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// 断开并注销本进程的一切，然后从 GCM 移除本进程
    pub async fn cleanup(&self) -> ManagerResult<()> {
        let result = self.remove_all_user_components().await;

        match self.global.remove_process(&self.process).await {
            Ok(()) => {}
            Err(ManagerError::NotFound { .. }) => debug!("进程 {} 已不在 GCM 中", self.process),
            Err(e) => warn!("从 GCM 移除进程 {} 失败: {}", self.process, e),
        }

        let ids: Vec<ConnectionId> = self.connections.write().keys().copied().collect();
        for id in ids {
            self.transport.detach(id).await;
        }
        let endpoints: Vec<String> = {
            let mut components = self.components.write();
            let endpoints = components
                .values()
                .flat_map(|component| {
                    component
                        .interface_provided_names()
                        .into_iter()
                        .filter_map(|name| {
                            component
                                .interface_provided(&name)
                                .ok()
                                .and_then(|interface| interface.endpoint().map(str::to_string))
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            components.clear();
            endpoints
        };
        for endpoint in endpoints {
            self.transport.close_endpoint(&endpoint).await;
        }
        self.connections.write().clear();
        info!("本地组件管理器已清理: {}", self.process);
        result
    }

    // ---- 接口 ----

    /// 为已存在的组件添加提供接口并在 GCM 注册
    pub async fn add_interface_provided(
        &self,
        component: &str,
        description: InterfaceProvidedDescription,
    ) -> ManagerResult<()> {
        self.write_component(component, |entry| {
            entry.add_interface_provided(InterfaceProvided::new(description))
        })?;
        self.register_interfaces(component).await
    }

    /// 为已存在的组件添加所需接口并在 GCM 注册
    pub async fn add_interface_required(
        &self,
        component: &str,
        description: InterfaceRequiredDescription,
    ) -> ManagerResult<()> {
        self.write_component(component, |entry| {
            entry.add_interface_required(InterfaceRequired::new(description))
        })?;
        self.register_interfaces(component).await
    }

    /// 移除提供接口，仍有所需接口绑定时失败
    pub async fn remove_interface_provided(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let users = self.read_component(component, |entry| {
            entry.interface_provided(interface).map(InterfaceProvided::user_count)
        })??;
        if users > 0 {
            return Err(ManagerError::invalid_state(format!(
                "提供接口 {component}:{interface} 仍有 {users} 个使用者"
            )));
        }
        self.global
            .remove_interface_provided_or_output(&self.process, component, interface)
            .await?;
        self.write_component(component, |entry| {
            entry.remove_interface_provided(interface);
            Ok(())
        })?;
        debug!("提供接口已移除: {}:{}", component, interface);
        Ok(())
    }

    /// 移除所需接口，其连接进入断开队列
    pub async fn remove_interface_required(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.read_component(component, |entry| entry.interface_required(interface).map(|_| ()))??;
        self.global
            .remove_interface_required_or_input(&self.process, component, interface)
            .await?;
        self.write_component(component, |entry| {
            entry.remove_interface_required(interface);
            Ok(())
        })?;
        debug!("所需接口已移除: {}:{}", component, interface);
        Ok(())
    }

    /// 把组件中尚未注册的接口注册到 GCM（幂等，只注册增量）
    pub async fn register_interfaces(&self, component: &str) -> ManagerResult<()> {
        let (provided, required) =
            self.read_component(component, Component::unregistered_interfaces)?;
        if provided.is_empty() && required.is_empty() {
            return Ok(());
        }
        self.register_names(component, &provided, &required).await?;
        if let Some(entry) = self.components.write().get_mut(component) {
            entry.mark_registered(&provided, &required);
        }
        Ok(())
    }

    async fn register_names(
        &self,
        component: &str,
        provided: &[String],
        required: &[String],
    ) -> ManagerResult<()> {
        for interface in provided {
            if !self
                .global
                .find_interface_provided_or_output(&self.process, component, interface)
                .await?
            {
                self.global
                    .add_interface_provided_or_output(&self.process, component, interface)
                    .await?;
            }
        }
        for interface in required {
            if !self
                .global
                .find_interface_required_or_input(&self.process, component, interface)
                .await?
            {
                self.global
                    .add_interface_required_or_input(&self.process, component, interface)
                    .await?;
            }
        }
        Ok(())
    }

    // ---- 连接 ----

    /// 进程内连接
    pub async fn connect(
        &self,
        client_component: &str,
        client_interface: &str,
        server_component: &str,
        server_interface: &str,
    ) -> ManagerResult<ConnectionId> {
        let description = ConnectionDescription::from_names(
            self.process.as_str(),
            client_component,
            client_interface,
            self.process.as_str(),
            server_component,
            server_interface,
        );
        self.connect_local(&description).await
    }

    /// 任意拓扑的连接，本进程必须是客户端或服务端进程之一
    pub async fn connect_remote(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId> {
        let is_client = description.client.process == self.process;
        let is_server = description.server.process == self.process;
        if !is_client && !is_server {
            return Err(ManagerError::invalid_state(format!(
                "进程 {} 既不是客户端也不是服务端进程: {description}",
                self.process
            )));
        }
        if !description.is_remote() {
            return self.connect_local(description).await;
        }

        let local_component = if is_client {
            &description.client.component
        } else {
            &description.server.component
        };
        self.register_interfaces(local_component).await?;

        let id = self.connect_with_retry(description).await?;
        let handshake = if is_client {
            self.client_side_handshake(id, description).await
        } else {
            self.global.initiate_connect(id).await
        };
        if let Err(e) = handshake {
            warn!("连接 {} 握手失败: {}", id, e);
            self.abandon(id).await;
            return Err(e);
        }
        info!("跨进程连接已建立 (连接 {}): {}", id, description);
        Ok(id)
    }

    /// 请求断开连接
    pub async fn disconnect(&self, id: ConnectionId) -> ManagerResult<()> {
        self.global.disconnect(id).await
    }

    /// 按六元组请求断开连接
    pub async fn disconnect_by_description(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.global.disconnect_by_description(description).await
    }

    async fn connect_local(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId> {
        let description = self.resolve_direction(description)?;
        let client = &description.client;
        let server = &description.server;
        self.register_interfaces(&client.component).await?;
        self.register_interfaces(&server.component).await?;

        let id = self.global.connect(&self.process, &description).await?;
        if let Err(e) = self.bind_locally(
            id,
            &client.component,
            &client.interface,
            &server.component,
            &server.interface,
        ) {
            self.abandon(id).await;
            return Err(e);
        }
        if let Err(e) = self.global.connect_confirm(id).await {
            self.unbind(id);
            self.abandon(id).await;
            return Err(e);
        }
        self.connections.write().insert(id, description.clone());
        info!("进程内连接已建立 (连接 {}): {}", id, description);
        Ok(id)
    }

    /// 检查两端组件与接口，客户端与服务端颠倒时交换
    fn resolve_direction(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionDescription> {
        let components = self.components.read();
        let client = self.lookup(&components, &description.client.component)?;
        let server = self.lookup(&components, &description.server.component)?;

        let required = client.interface_required(&description.client.interface);
        let provided = server.interface_provided(&description.server.interface);
        match (required, provided) {
            (Ok(_), Ok(_)) => Ok(description.clone()),
            (required, provided) => {
                let swapped = server.interface_required(&description.server.interface).is_ok()
                    && client.interface_provided(&description.client.interface).is_ok();
                if swapped {
                    let swapped = description.swapped();
                    warn!("连接参数的客户端与服务端顺序颠倒，已自动交换: {}", swapped);
                    return Ok(swapped);
                }
                Err(required.err().or(provided.err()).unwrap_or_else(|| {
                    ManagerError::internal(format!("连接校验失败: {description}"))
                }))
            }
        }
    }

    async fn connect_with_retry(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId> {
        let attempts = self.config.connect_retry_count.max(1);
        let mut attempt = 1;
        loop {
            match self.global.connect(&self.process, description).await {
                Ok(id) => return Ok(id),
                Err(e) if is_retryable(&e) && attempt < attempts => {
                    debug!("连接请求失败（第 {}/{} 次），稍后重试: {}", attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(self.config.connect_retry_interval()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn client_side_handshake(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        let client = &description.client;
        let server = &description.server;
        if client.process != self.process {
            return Err(ManagerError::invalid_state(format!(
                "连接 {id} 的客户端进程不是 {}",
                self.process
            )));
        }
        let server_proxy = component_proxy_name(&server.process, &server.component);

        let result = async {
            self.bind_locally(
                id,
                &client.component,
                &client.interface,
                &server_proxy,
                &server.interface,
            )?;
            let endpoint = self.provided_proxy_endpoint(&server_proxy, &server.interface).await?;
            self.global
                .set_interface_provided_proxy_access_info(id, &endpoint)
                .await?;
            self.global.connect_server_side_interface_request(id).await?;
            self.global.connect_confirm(id).await
        }
        .await;

        match result {
            Ok(()) => {
                self.connections.write().insert(id, description.clone());
                debug!("客户端握手完成 (连接 {})", id);
                Ok(())
            }
            Err(e) => {
                self.unbind(id);
                self.abandon(id).await;
                Err(e)
            }
        }
    }

    async fn server_side_handshake(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        let client = &description.client;
        let server = &description.server;
        if server.process != self.process {
            return Err(ManagerError::invalid_state(format!(
                "连接 {id} 的服务端进程不是 {}",
                self.process
            )));
        }
        let client_proxy = component_proxy_name(&client.process, &client.component);

        let result = async {
            self.bind_locally(
                id,
                &client_proxy,
                &client.interface,
                &server.component,
                &server.interface,
            )?;
            let endpoint = self.fetch_endpoint(id).await?;
            self.transport.attach(id, &endpoint).await
        }
        .await;

        match result {
            Ok(()) => {
                self.connections.write().insert(id, description.clone());
                debug!("服务端握手完成 (连接 {})", id);
                Ok(())
            }
            Err(e) => {
                self.unbind(id);
                self.transport.detach(id).await;
                self.abandon(id).await;
                Err(e)
            }
        }
    }

    /// 共享的提供接口代理只打开一次端点
    async fn provided_proxy_endpoint(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<String> {
        let existing = self.read_component(component_proxy, |entry| {
            entry
                .interface_provided(interface)
                .map(|provided| provided.endpoint().map(str::to_string))
        })??;
        if let Some(endpoint) = existing {
            return Ok(endpoint);
        }

        let endpoint = self
            .transport
            .open_endpoint(&self.process, component_proxy, interface)
            .await?;
        self.write_component(component_proxy, |entry| {
            let provided = entry.interface_provided_mut(interface)?;
            if provided.endpoint().is_none() {
                provided.set_endpoint(endpoint.clone());
            }
            Ok(())
        })?;
        Ok(endpoint)
    }

    /// 有限次轮询 GCM，直到客户端发布端点
    async fn fetch_endpoint(&self, id: ConnectionId) -> ManagerResult<String> {
        let attempts = self.config.endpoint_fetch_attempts.max(1);
        for attempt in 1..=attempts {
            match self.global.get_interface_provided_proxy_access_info(id).await {
                Ok(endpoint) => return Ok(endpoint),
                Err(ManagerError::NotFound { message }) => {
                    debug!(
                        "连接 {} 的端点尚未发布（第 {}/{} 次）: {}",
                        id, attempt, attempts, message
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.endpoint_fetch_interval()).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(ManagerError::timeout(format!(
            "连接 {id} 的访问端点在 {attempts} 次尝试后仍未发布"
        )))
    }

    async fn abandon(&self, id: ConnectionId) {
        if let Err(e) = self.global.disconnect(id).await {
            warn!("撤销连接 {} 失败: {}", id, e);
        }
    }

    /// 在本地把所需接口绑定到提供接口
    fn bind_locally(
        &self,
        id: ConnectionId,
        client_component: &str,
        client_interface: &str,
        server_component: &str,
        server_interface: &str,
    ) -> ManagerResult<()> {
        let mut components = self.components.write();
        let provided = self
            .lookup(&components, server_component)?
            .interface_provided(server_interface)?
            .description()
            .clone();
        let required = self
            .lookup(&components, client_component)?
            .interface_required(client_interface)?;
        if let Some(binding) = required.binding() {
            if binding.component == server_component && binding.interface == server_interface {
                return Err(ManagerError::already_exists(format!(
                    "{client_component}:{client_interface} 已通过连接 {} 绑定到 {server_component}:{server_interface}",
                    binding.id
                )));
            }
            return Err(ManagerError::invalid_state(format!(
                "{client_component}:{client_interface} 已通过连接 {} 绑定到 {}:{}",
                binding.id, binding.component, binding.interface
            )));
        }
        check_compatibility(required.description(), &provided)?;

        Self::lookup_mut(&mut components, client_component)?
            .interface_required_mut(client_interface)?
            .bind(Binding {
                id,
                component: server_component.to_string(),
                interface: server_interface.to_string(),
            });
        Self::lookup_mut(&mut components, server_component)?
            .interface_provided_mut(server_interface)?
            .add_user(id);
        debug!(
            "本地绑定 (连接 {}): {}:{} -> {}:{}",
            id, client_component, client_interface, server_component, server_interface
        );
        Ok(())
    }

    /// 解除连接的全部本地绑定，返回是否有绑定被解除
    fn unbind(&self, id: ConnectionId) -> bool {
        let mut components = self.components.write();
        let mut unbound = false;
        for component in components.values_mut() {
            for required in component.interfaces_required_mut() {
                unbound |= required.take_binding_of(id).is_some();
            }
            for provided in component.interfaces_provided_mut() {
                unbound |= provided.remove_user(id);
            }
        }
        unbound
    }

    // ---- 生命周期 ----

    /// 创建所有组件
    pub async fn create_all(&self) -> ManagerResult<()> {
        self.transition_all(Transition::Create).await
    }

    /// 启动所有组件
    pub async fn start_all(&self) -> ManagerResult<()> {
        self.transition_all(Transition::Start).await
    }

    /// 结束所有组件
    pub async fn kill_all(&self) -> ManagerResult<()> {
        self.transition_all(Transition::Kill).await
    }

    /// 创建所有组件并等待全部就绪
    pub async fn create_all_and_wait(&self, timeout: Duration) -> ManagerResult<()> {
        self.transition_and_wait(Transition::Create, timeout).await
    }

    /// 启动所有组件并等待全部运行
    pub async fn start_all_and_wait(&self, timeout: Duration) -> ManagerResult<()> {
        self.transition_and_wait(Transition::Start, timeout).await
    }

    /// 结束所有组件并等待全部结束
    pub async fn kill_all_and_wait(&self, timeout: Duration) -> ManagerResult<()> {
        self.transition_and_wait(Transition::Kill, timeout).await
    }

    async fn transition_all(&self, transition: Transition) -> ManagerResult<()> {
        let targets: Vec<(String, Option<Arc<dyn ComponentBehavior>>)> = self
            .components
            .read()
            .values()
            .filter(|component| transition.applies_to(component.state()))
            .map(|component| (component.name().to_string(), component.behavior()))
            .collect();

        let mut first_error = None;
        for (name, behavior) in targets {
            let result = match (&behavior, transition) {
                (None, _) => Ok(()),
                (Some(behavior), Transition::Create) => behavior.create(&name).await,
                (Some(behavior), Transition::Start) => behavior.start(&name).await,
                (Some(behavior), Transition::Kill) => behavior.kill(&name).await,
            };
            match result {
                Ok(()) => {
                    if let Some(component) = self.components.write().get_mut(&name) {
                        component.set_state(transition.target());
                    }
                    debug!("组件 {} -> {}", name, transition.target());
                }
                Err(e) => {
                    warn!("组件 {} 执行 {:?} 失败: {}", name, transition, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn transition_and_wait(
        &self,
        transition: Transition,
        timeout: Duration,
    ) -> ManagerResult<()> {
        let target = transition.target();
        let deadline = tokio::time::Instant::now() + timeout;
        tokio::time::timeout(timeout, self.transition_all(transition))
            .await
            .map_err(|_| {
                ManagerError::timeout(format!("{transition:?} 在 {timeout:?} 内未完成"))
            })??;

        loop {
            let lagging = self
                .components
                .read()
                .values()
                .filter(|component| component.state() < target)
                .map(|component| component.name().to_string())
                .collect::<Vec<_>>();
            if lagging.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ManagerError::timeout(format!(
                    "组件未在 {timeout:?} 内进入 {target}: {}",
                    lagging.join(" ")
                )));
            }
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    }

    // ---- 查询 ----

    /// 组件名
    pub fn get_names_of_components(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    /// 组件是否存在
    pub fn find_component(&self, component: &str) -> bool {
        self.components.read().contains_key(component)
    }

    /// 组件类别
    pub fn component_kind(&self, component: &str) -> ManagerResult<ComponentKind> {
        self.read_component(component, Component::kind)
    }

    /// 组件状态
    pub fn component_state(&self, component: &str) -> ManagerResult<ComponentState> {
        self.read_component(component, Component::state)
    }

    /// 组件的提供接口名
    pub fn get_names_of_interfaces_provided(&self, component: &str) -> ManagerResult<Vec<String>> {
        self.read_component(component, Component::interface_provided_names)
    }

    /// 组件的所需接口名
    pub fn get_names_of_interfaces_required(&self, component: &str) -> ManagerResult<Vec<String>> {
        self.read_component(component, Component::interface_required_names)
    }

    /// 提供接口的命令名
    pub fn get_names_of_commands(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<String>> {
        self.read_component(component, |entry| {
            entry.interface_provided(interface).map(InterfaceProvided::command_names)
        })?
    }

    /// 提供接口的事件生成器名
    pub fn get_names_of_event_generators(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<String>> {
        self.read_component(component, |entry| {
            entry
                .interface_provided(interface)
                .map(InterfaceProvided::event_generator_names)
        })?
    }

    /// 所需接口的函数名
    pub fn get_names_of_functions(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<String>> {
        self.read_component(component, |entry| {
            entry.interface_required(interface).map(InterfaceRequired::function_names)
        })?
    }

    /// 所需接口的事件处理器名
    pub fn get_names_of_event_handlers(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<String>> {
        self.read_component(component, |entry| {
            entry
                .interface_required(interface)
                .map(InterfaceRequired::event_handler_names)
        })?
    }

    /// 提供接口的使用者数量
    pub fn interface_user_count(&self, component: &str, interface: &str) -> ManagerResult<usize> {
        self.read_component(component, |entry| {
            entry.interface_provided(interface).map(InterfaceProvided::user_count)
        })?
    }

    /// 所需接口的当前绑定
    pub fn binding_of(&self, component: &str, interface: &str) -> ManagerResult<Option<Binding>> {
        self.read_component(component, |entry| {
            entry
                .interface_required(interface)
                .map(|required| required.binding().cloned())
        })?
    }

    /// 本进程参与的已建立连接
    pub fn get_list_of_connections(&self) -> Vec<(ConnectionId, ConnectionDescription)> {
        self.connections
            .read()
            .iter()
            .map(|(id, description)| (*id, description.clone()))
            .collect()
    }

    // ---- 内部辅助 ----

    fn names_of_kind(&self, kind: ComponentKind) -> Vec<String> {
        self.components
            .read()
            .values()
            .filter(|component| component.kind() == kind)
            .map(|component| component.name().to_string())
            .collect()
    }

    fn lookup<'a>(
        &self,
        components: &'a BTreeMap<String, Component>,
        name: &str,
    ) -> ManagerResult<&'a Component> {
        components.get(name).ok_or_else(|| {
            let names: Vec<String> = components.keys().cloned().collect();
            ManagerError::not_found(format!(
                "进程 {} 中没有组件 {name}；{}",
                self.process,
                describe_available(&names, "该进程没有组件")
            ))
        })
    }

    fn lookup_mut<'a>(
        components: &'a mut BTreeMap<String, Component>,
        name: &str,
    ) -> ManagerResult<&'a mut Component> {
        components
            .get_mut(name)
            .ok_or_else(|| ManagerError::not_found(format!("组件不存在: {name}")))
    }

    fn read_component<T>(
        &self,
        name: &str,
        read: impl FnOnce(&Component) -> T,
    ) -> ManagerResult<T> {
        let components = self.components.read();
        self.lookup(&components, name).map(read)
    }

    fn write_component<T>(
        &self,
        name: &str,
        write: impl FnOnce(&mut Component) -> ManagerResult<T>,
    ) -> ManagerResult<T> {
        let mut components = self.components.write();
        self.lookup(&components, name)?;
        Self::lookup_mut(&mut components, name).and_then(write)
    }

    fn write_proxy<T>(
        &self,
        name: &str,
        write: impl FnOnce(&mut Component) -> ManagerResult<T>,
    ) -> ManagerResult<T> {
        self.write_component(name, |entry| {
            if entry.kind() != ComponentKind::Proxy {
                return Err(ManagerError::invalid_state(format!(
                    "组件 {} 不是代理组件",
                    entry.name()
                )));
            }
            write(entry)
        })
    }
}

fn is_retryable(error: &ManagerError) -> bool {
    matches!(
        error,
        ManagerError::NotFound { .. }
            | ManagerError::Timeout { .. }
            | ManagerError::NetworkFailure { .. }
    )
}

impl std::fmt::Debug for LocalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalManager")
            .field("process", &self.process)
            .field("components", &self.get_names_of_components())
            .field("connections", &self.connections.read().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LocalManagerInterface for LocalManager {
    fn process_name(&self) -> &str {
        &self.process
    }

    async fn create_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        let mut components = self.components.write();
        if components.contains_key(component_proxy) {
            return Err(ManagerError::already_exists(format!(
                "组件代理已存在: {}:{component_proxy}",
                self.process
            )));
        }
        components.insert(
            component_proxy.to_string(),
            Component::with_kind(component_proxy, ComponentKind::Proxy),
        );
        info!("组件代理已创建: {}:{}", self.process, component_proxy);
        Ok(())
    }

    async fn remove_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        let endpoints = self.write_proxy(component_proxy, |entry| {
            Ok(entry
                .interface_provided_names()
                .iter()
                .filter_map(|name| {
                    entry
                        .interface_provided(name)
                        .ok()
                        .and_then(|interface| interface.endpoint().map(str::to_string))
                })
                .collect::<Vec<_>>())
        })?;
        self.components.write().remove(component_proxy);
        for endpoint in endpoints {
            self.transport.close_endpoint(&endpoint).await;
        }
        info!("组件代理已移除: {}:{}", self.process, component_proxy);
        Ok(())
    }

    async fn create_interface_provided_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceProvidedDescription,
    ) -> ManagerResult<()> {
        let mut interface = InterfaceProvided::new(description.clone());
        interface.mark_registered();
        self.write_proxy(component_proxy, |entry| entry.add_interface_provided(interface))?;
        debug!(
            "提供接口代理已创建: {}:{}:{}",
            self.process, component_proxy, description.interface_name
        );
        Ok(())
    }

    async fn create_interface_required_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceRequiredDescription,
    ) -> ManagerResult<()> {
        let mut interface = InterfaceRequired::new(description.clone());
        interface.mark_registered();
        self.write_proxy(component_proxy, |entry| entry.add_interface_required(interface))?;
        debug!(
            "所需接口代理已创建: {}:{}:{}",
            self.process, component_proxy, description.interface_name
        );
        Ok(())
    }

    async fn remove_interface_provided_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let removed = self.write_proxy(component_proxy, |entry| {
            let users = entry.interface_provided(interface)?.user_count();
            if users > 0 {
                return Err(ManagerError::invalid_state(format!(
                    "提供接口代理 {component_proxy}:{interface} 仍有 {users} 个使用者"
                )));
            }
            Ok(entry.remove_interface_provided(interface))
        })?;
        if let Some(endpoint) = removed.as_ref().and_then(InterfaceProvided::endpoint) {
            self.transport.close_endpoint(endpoint).await;
        }
        debug!("提供接口代理已移除: {}:{}", component_proxy, interface);
        Ok(())
    }

    async fn remove_interface_required_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.write_proxy(component_proxy, |entry| {
            entry.interface_required(interface)?;
            entry.remove_interface_required(interface);
            Ok(())
        })?;
        debug!("所需接口代理已移除: {}:{}", component_proxy, interface);
        Ok(())
    }

    async fn get_interface_provided_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceProvidedDescription> {
        self.read_component(component, |entry| {
            entry
                .interface_provided(interface)
                .map(|provided| provided.description().clone())
        })?
    }

    async fn get_interface_required_description(
        &self,
        component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceRequiredDescription> {
        self.read_component(component, |entry| {
            entry
                .interface_required(interface)
                .map(|required| required.description().clone())
        })?
    }

    async fn connect_server_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.server_side_handshake(id, description).await
    }

    async fn connect_client_side_interface(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.client_side_handshake(id, description).await
    }

    async fn disconnect_local(
        &self,
        id: ConnectionId,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        let unbound = self.unbind(id);
        self.transport.detach(id).await;
        self.connections.write().remove(&id);
        if unbound {
            debug!("连接 {} 的本地绑定已解除: {}", id, description);
        } else {
            debug!("连接 {} 在进程 {} 中没有本地绑定", id, self.process);
        }
        Ok(())
    }
}
