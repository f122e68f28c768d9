//! 全局组件管理器

use async_trait::async_trait;
use manager_abstractions::{GlobalComponentManager, LocalManagerInterface, ManagerEvent};
use manager_common::{
    interface_uid, ComponentKind, ConnectionDescription, ConnectionDescriptor, ConnectionId,
    ConnectionState, InterfaceLocation, ManagerConfig, ManagerError, ManagerResult,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::{
    provided_proxy_location, registry_targets, required_proxy_location, ConnectionMap,
    ConnectionRecord,
};
use crate::disconnect::{spawn_reconciler, DisconnectQueues, DisconnectRequest};
use crate::proxy_arena::{ComponentProxyKey, InterfaceProxyKey, ProxyArena};
use crate::registry::{InterfaceRole, Registry};

/// 事件通道容量
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// GCM 运行统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalManagerStatistics {
    /// 成功登记的连接数
    pub connections_requested: u64,
    /// 已确认的连接数
    pub connections_confirmed: u64,
    /// 被接受的断开请求数
    pub disconnects_requested: u64,
    /// 已完成拆除的连接数
    pub disconnects_processed: u64,
    /// 因超时被驱逐的连接数
    pub connections_evicted: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connections_requested: AtomicU64,
    connections_confirmed: AtomicU64,
    disconnects_requested: AtomicU64,
    disconnects_processed: AtomicU64,
    connections_evicted: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> GlobalManagerStatistics {
        GlobalManagerStatistics {
            connections_requested: self.connections_requested.load(Ordering::Relaxed),
            connections_confirmed: self.connections_confirmed.load(Ordering::Relaxed),
            disconnects_requested: self.disconnects_requested.load(Ordering::Relaxed),
            disconnects_processed: self.disconnects_processed.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
        }
    }
}

/// 远程连接准备代理时已完成的步骤，失败时逆序撤销
enum ProxyStep {
    Component {
        handle: Arc<dyn LocalManagerInterface>,
        key: ComponentProxyKey,
    },
    Interface {
        handle: Arc<dyn LocalManagerInterface>,
        key: InterfaceProxyKey,
    },
    Acquired {
        key: InterfaceProxyKey,
    },
}

/// 全局组件管理器
///
/// 注册表与连接表的唯一所有者。锁顺序：连接表 → 注册表 → 代理表，
/// 连接表 → 断开队列；同步锁从不跨越 `.await` 持有。
/// `Disconnect` 只使用断开队列的锁，可以从任何上下文调用，包括反向调用之中。
pub struct GlobalManager {
    config: ManagerConfig,
    registry: RwLock<Registry>,
    connections: tokio::sync::Mutex<ConnectionMap>,
    proxies: Mutex<ProxyArena>,
    disconnects: Mutex<DisconnectQueues>,
    wake: Arc<Notify>,
    events: broadcast::Sender<ManagerEvent>,
    counters: Counters,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GlobalManager {
    /// 创建 GCM，后台协调任务需要另外调用 [`GlobalManager::start`]
    pub fn new(config: ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let retention = config.processed_retention;
        Self {
            config,
            registry: RwLock::new(Registry::new()),
            connections: tokio::sync::Mutex::new(ConnectionMap::new()),
            proxies: Mutex::new(ProxyArena::new()),
            disconnects: Mutex::new(DisconnectQueues::new(retention)),
            wake: Arc::new(Notify::new()),
            events,
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// 配置
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// 启动后台断开协调任务（重复调用无效果）
    pub fn start(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        *worker = Some(spawn_reconciler(
            Arc::downgrade(self),
            Arc::clone(&self.wake),
            self.shutdown.clone(),
            self.config.reconcile_interval(),
        ));
    }

    /// 停止后台任务
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!("断开协调任务异常退出: {}", e);
            }
        }
        info!("全局组件管理器已停止");
    }

    /// 后台任务是否在运行
    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some() && !self.shutdown.is_cancelled()
    }

    /// 订阅管理器事件
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// 运行统计快照
    pub fn statistics(&self) -> GlobalManagerStatistics {
        self.counters.snapshot()
    }

    // ---- 扩展查询 ----

    /// 进程的反向调用句柄
    pub fn get_process_object(&self, process: &str) -> Option<Arc<dyn LocalManagerInterface>> {
        self.registry.read().process_handle(process)
    }

    /// 组件是否为代理组件
    pub fn is_proxy_component(&self, process: &str, component: &str) -> bool {
        self.registry
            .read()
            .component(process, component)
            .is_ok_and(|entry| entry.kind() == ComponentKind::Proxy)
    }

    /// 接口唯一标识 `P:C:I`
    pub fn get_interface_uid(&self, process: &str, component: &str, interface: &str) -> String {
        interface_uid(process, component, interface)
    }

    /// 引用提供/输出接口的连接
    pub fn get_connections_of_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<ConnectionId>> {
        self.registry.read().connections_of(
            &InterfaceLocation::new(process, component, interface),
            InterfaceRole::Provided,
        )
    }

    /// 引用所需/输入接口的连接
    pub fn get_connections_of_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<Vec<ConnectionId>> {
        self.registry.read().connections_of(
            &InterfaceLocation::new(process, component, interface),
            InterfaceRole::Required,
        )
    }

    /// 尚未确认的连接
    pub async fn get_list_of_pending_connections(&self) -> Vec<ConnectionDescriptor> {
        self.connections
            .lock()
            .await
            .records_in_state(ConnectionState::Pending)
            .into_iter()
            .map(ConnectionRecord::descriptor)
            .collect()
    }

    /// 连接当前状态，不在连接表中时返回 `None`
    pub async fn connection_state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.lock().await.get(id).map(ConnectionRecord::state)
    }

    /// 按名称查找已发布的访问端点
    pub async fn get_interface_provided_proxy_access_info_by_names(
        &self,
        client_process: &str,
        server_process: &str,
        server_component: &str,
        server_interface: &str,
    ) -> ManagerResult<String> {
        let server = InterfaceLocation::new(server_process, server_component, server_interface);
        self.connections
            .lock()
            .await
            .endpoint_by_names(client_process, &server)
    }

    /// 等待处理或正在处理的断开请求数
    pub fn outstanding_disconnects(&self) -> usize {
        self.disconnects.lock().outstanding()
    }

    /// 代理组件与接口代理总数
    pub fn proxy_count(&self) -> usize {
        self.proxies.lock().len()
    }

    // ---- 断开协调 ----

    /// 执行一轮维护：驱逐超时连接，拆除所有等待中的连接
    ///
    /// 后台任务按周期调用；测试中也可以直接调用。返回本轮拆除的连接数。
    pub async fn reconcile(&self) -> usize {
        self.evict_expired().await;

        let mut processed = 0;
        loop {
            let batch = self.disconnects.lock().take_waiting();
            if batch.is_empty() {
                break;
            }
            for id in batch {
                self.teardown(id).await;
                self.disconnects.lock().finish(id);
                Counters::bump(&self.counters.disconnects_processed);
                processed += 1;
            }
        }
        processed
    }

    async fn evict_expired(&self) {
        let connections = self.connections.lock().await;
        let expired = connections.expired(self.config.connect_timeout(), Instant::now());
        if expired.is_empty() {
            return;
        }
        let mut queues = self.disconnects.lock();
        for id in expired {
            if queues.enqueue(id) {
                warn!("连接 {} 超时未确认，加入断开队列", id);
                Counters::bump(&self.counters.connections_evicted);
            }
        }
    }

    /// 把一组连接加入断开队列并唤醒后台任务
    fn enqueue_disconnects(&self, ids: impl IntoIterator<Item = ConnectionId>) -> usize {
        let queued = {
            let mut queues = self.disconnects.lock();
            ids.into_iter().filter(|id| queues.enqueue(*id)).count()
        };
        if queued > 0 {
            self.counters
                .disconnects_requested
                .fetch_add(queued as u64, Ordering::Relaxed);
            self.wake.notify_one();
        }
        queued
    }

    /// 拆除单个连接
    ///
    /// 持有连接表锁执行，与正在进行的 `Connect` 串行。
    async fn teardown(&self, id: ConnectionId) {
        let mut connections = self.connections.lock().await;
        let Some(record) = connections.get(id).cloned() else {
            debug!("连接 {} 已不在连接表中，跳过拆除", id);
            return;
        };
        let description = record.description().clone();
        debug!("拆除连接 {}: {}", id, description);

        let (client_handle, server_handle) = {
            let registry = self.registry.read();
            (
                registry.process_handle(&description.client.process),
                registry.process_handle(&description.server.process),
            )
        };

        // 解除本地绑定
        if let Some(handle) = &client_handle {
            if let Err(e) = handle.disconnect_local(id, &description).await {
                warn!("客户端进程解除连接 {} 的本地绑定失败: {}", id, e);
            }
        }
        if description.is_remote() {
            if let Some(handle) = &server_handle {
                if let Err(e) = handle.disconnect_local(id, &description).await {
                    warn!("服务端进程解除连接 {} 的本地绑定失败: {}", id, e);
                }
            }
        }

        self.registry
            .write()
            .unregister_connection(id, &registry_targets(&description));

        if description.is_remote() {
            let required = InterfaceProxyKey::new(
                required_proxy_location(&description),
                InterfaceRole::Required,
            );
            self.release_proxy(server_handle.as_ref(), &required).await;
            let provided = InterfaceProxyKey::new(
                provided_proxy_location(&description),
                InterfaceRole::Provided,
            );
            self.release_proxy(client_handle.as_ref(), &provided).await;
        }

        connections.remove(id);
        drop(connections);

        info!("连接 {} 已断开: {}", id, description);
        let _ = self.events.send(ManagerEvent::ConnectionRemoved { id, description });
    }

    /// 释放接口代理的一个连接，计数归零时销毁代理
    async fn release_proxy(
        &self,
        handle: Option<&Arc<dyn LocalManagerInterface>>,
        key: &InterfaceProxyKey,
    ) {
        let Some(release) = self.proxies.lock().release_interface(key) else {
            // 所在进程或组件已被移除
            return;
        };
        if !release.interface_removed() {
            debug!(
                "接口代理 {} 仍被 {} 个连接使用",
                key.location, release.interface_remaining
            );
            return;
        }

        let location = &key.location;
        if let Some(handle) = handle {
            let result = match key.role {
                InterfaceRole::Provided => {
                    handle
                        .remove_interface_provided_proxy(&location.component, &location.interface)
                        .await
                }
                InterfaceRole::Required => {
                    handle
                        .remove_interface_required_proxy(&location.component, &location.interface)
                        .await
                }
            };
            if let Err(e) = result {
                warn!("移除接口代理失败 {}: {}", location, e);
            }
        }
        if let Err(e) = self.registry.write().remove_interface(location, key.role) {
            warn!("从注册表移除接口代理失败 {}: {}", location, e);
        }

        if release.component_removed() {
            self.remove_proxy_component(handle, &key.component_key()).await;
        }
    }

    async fn remove_proxy_component(
        &self,
        handle: Option<&Arc<dyn LocalManagerInterface>>,
        key: &ComponentProxyKey,
    ) {
        if let Some(handle) = handle {
            if let Err(e) = handle.remove_component_proxy(&key.component).await {
                warn!("移除组件代理失败 {}:{}: {}", key.process, key.component, e);
            }
        }
        match self
            .registry
            .write()
            .remove_component(&key.process, &key.component, true)
        {
            Ok(_) => info!("组件代理已移除: {}:{}", key.process, key.component),
            Err(e) => warn!(
                "从注册表移除组件代理失败 {}:{}: {}",
                key.process, key.component, e
            ),
        }
        let _ = self.events.send(ManagerEvent::ComponentRemoved {
            process: key.process.clone(),
            component: key.component.clone(),
        });
    }

    // ---- 连接建立 ----

    /// 检查两端接口存在，必要时交换客户端与服务端
    fn validate(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionDescription> {
        let registry = self.registry.read();
        let client = registry.interface(&description.client, InterfaceRole::Required);
        let server = registry.interface(&description.server, InterfaceRole::Provided);
        let (client_error, server_error) = match (client, server) {
            (Ok(_), Ok(_)) => return Ok(description.clone()),
            (client, server) => (client.err(), server.err()),
        };

        let swapped = description.swapped();
        if registry
            .interface(&swapped.client, InterfaceRole::Required)
            .is_ok()
            && registry
                .interface(&swapped.server, InterfaceRole::Provided)
                .is_ok()
        {
            warn!("连接参数的客户端与服务端顺序颠倒，已自动交换: {}", swapped);
            return Ok(swapped);
        }

        Err(client_error
            .or(server_error)
            .unwrap_or_else(|| ManagerError::internal("连接校验失败")))
    }

    /// 所需接口已有连接时拒绝
    fn check_not_connected(
        &self,
        connections: &ConnectionMap,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        let existing = self
            .registry
            .read()
            .connections_of(&description.client, InterfaceRole::Required)?;
        let Some(id) = existing.first() else {
            return Ok(());
        };
        match connections.get(*id) {
            Some(record) if record.description().server == description.server => {
                Err(ManagerError::already_exists(format!(
                    "连接已存在 (连接 {id}): {description}"
                )))
            }
            Some(record) => Err(ManagerError::invalid_state(format!(
                "所需接口 {} 已通过连接 {id} 绑定到 {}",
                description.client,
                record.description().server
            ))),
            None => Err(ManagerError::invalid_state(format!(
                "所需接口 {} 仍被正在拆除的连接 {id} 占用",
                description.client
            ))),
        }
    }

    fn process_handle(&self, process: &str) -> ManagerResult<Arc<dyn LocalManagerInterface>> {
        let registry = self.registry.read();
        if !registry.find_process(process) {
            return Err(ManagerError::not_found(format!("进程不存在: {process}")));
        }
        registry.process_handle(process).ok_or_else(|| {
            ManagerError::invalid_state(format!("进程 {process} 没有注册反向调用句柄"))
        })
    }

    /// 为远程连接准备两侧的代理，失败时撤销已完成的步骤
    async fn prepare_proxies(&self, description: &ConnectionDescription) -> ManagerResult<()> {
        let mut steps = Vec::new();
        match self.create_proxies(description, &mut steps).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("为连接 {} 创建代理失败，回滚: {}", description, e);
                self.rollback_proxies(steps).await;
                Err(e)
            }
        }
    }

    async fn create_proxies(
        &self,
        description: &ConnectionDescription,
        steps: &mut Vec<ProxyStep>,
    ) -> ManagerResult<()> {
        let client = &description.client;
        let server = &description.server;
        let client_handle = self.process_handle(&client.process)?;
        let server_handle = self.process_handle(&server.process)?;

        // 服务端进程：客户端组件代理 + 所需接口代理（每个连接单独创建）
        let required_location = required_proxy_location(description);
        self.ensure_component_proxy(&server_handle, &required_location, steps)
            .await?;
        let required_key =
            InterfaceProxyKey::new(required_location.clone(), InterfaceRole::Required);
        if self.proxies.lock().has_interface(&required_key) {
            return Err(ManagerError::already_exists(format!(
                "所需接口代理已存在: {required_location}"
            )));
        }
        let required_description = client_handle
            .get_interface_required_description(&client.component, &client.interface)
            .await?;
        server_handle
            .create_interface_required_proxy(&required_location.component, &required_description)
            .await?;
        steps.push(ProxyStep::Interface {
            handle: Arc::clone(&server_handle),
            key: required_key.clone(),
        });
        self.register_interface_proxy(&required_key)?;

        // 客户端进程：服务端组件代理 + 共享的提供接口代理
        let provided_location = provided_proxy_location(description);
        self.ensure_component_proxy(&client_handle, &provided_location, steps)
            .await?;
        let provided_key =
            InterfaceProxyKey::new(provided_location.clone(), InterfaceRole::Provided);
        let shared = self.proxies.lock().has_interface(&provided_key);
        if shared {
            let users = self.proxies.lock().acquire_interface(&provided_key)?;
            steps.push(ProxyStep::Acquired {
                key: provided_key.clone(),
            });
            debug!("复用提供接口代理 {}，连接数: {}", provided_location, users);
            return Ok(());
        }
        let provided_description = server_handle
            .get_interface_provided_description(&server.component, &server.interface)
            .await?;
        client_handle
            .create_interface_provided_proxy(&provided_location.component, &provided_description)
            .await?;
        steps.push(ProxyStep::Interface {
            handle: Arc::clone(&client_handle),
            key: provided_key.clone(),
        });
        self.register_interface_proxy(&provided_key)?;
        Ok(())
    }

    async fn ensure_component_proxy(
        &self,
        handle: &Arc<dyn LocalManagerInterface>,
        location: &InterfaceLocation,
        steps: &mut Vec<ProxyStep>,
    ) -> ManagerResult<()> {
        let key = ComponentProxyKey {
            process: location.process.clone(),
            component: location.component.clone(),
        };
        if self.proxies.lock().has_component(&key) {
            return Ok(());
        }

        handle.create_component_proxy(&key.component).await?;
        steps.push(ProxyStep::Component {
            handle: Arc::clone(handle),
            key: key.clone(),
        });
        {
            let mut registry = self.registry.write();
            registry.add_component(&key.process, &key.component, ComponentKind::Proxy)?;
            registry.commit_component(&key.process, &key.component)?;
        }
        self.proxies.lock().insert_component(key.clone())?;
        info!("组件代理已创建: {}:{}", key.process, key.component);
        let _ = self.events.send(ManagerEvent::ComponentAdded {
            process: key.process,
            component: key.component,
            kind: ComponentKind::Proxy,
        });
        Ok(())
    }

    fn register_interface_proxy(&self, key: &InterfaceProxyKey) -> ManagerResult<()> {
        self.registry.write().add_interface(&key.location, key.role)?;
        self.proxies.lock().insert_interface(key.clone())?;
        let location = &key.location;
        debug!(
            "接口代理已登记: {} ({})",
            self.get_interface_uid(&location.process, &location.component, &location.interface),
            key.role
        );
        Ok(())
    }

    async fn rollback_proxies(&self, steps: Vec<ProxyStep>) {
        for step in steps.into_iter().rev() {
            match step {
                ProxyStep::Acquired { key } => {
                    self.proxies.lock().release_interface(&key);
                }
                ProxyStep::Interface { handle, key } => {
                    let location = &key.location;
                    {
                        let mut proxies = self.proxies.lock();
                        if proxies.has_interface(&key) {
                            proxies.release_interface(&key);
                        }
                    }
                    // 组件代理由后续的 Component 步骤撤销
                    let _ = self.registry.write().remove_interface(location, key.role);
                    let result = match key.role {
                        InterfaceRole::Provided => {
                            handle
                                .remove_interface_provided_proxy(
                                    &location.component,
                                    &location.interface,
                                )
                                .await
                        }
                        InterfaceRole::Required => {
                            handle
                                .remove_interface_required_proxy(
                                    &location.component,
                                    &location.interface,
                                )
                                .await
                        }
                    };
                    if let Err(e) = result {
                        warn!("回滚接口代理失败 {}: {}", location, e);
                    }
                }
                ProxyStep::Component { handle, key } => {
                    self.proxies
                        .lock()
                        .purge_component(&key.process, &key.component);
                    let _ = self
                        .registry
                        .write()
                        .remove_component(&key.process, &key.component, true);
                    if let Err(e) = handle.remove_component_proxy(&key.component).await {
                        warn!("回滚组件代理失败 {}:{}: {}", key.process, key.component, e);
                    }
                }
            }
        }
    }

    fn enqueue_for_entities(&self, ids: BTreeSet<ConnectionId>, what: &str) {
        if ids.is_empty() {
            return;
        }
        let queued = self.enqueue_disconnects(ids);
        info!("{} 引用的 {} 个连接已加入断开队列", what, queued);
    }
}

impl Drop for GlobalManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for GlobalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalManager")
            .field("processes", &self.registry.read().process_names())
            .field("statistics", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GlobalComponentManager for GlobalManager {
    async fn add_process(&self, process: &str) -> ManagerResult<()> {
        self.registry.write().add_process(process, None)?;
        info!("进程已注册: {}", process);
        let _ = self.events.send(ManagerEvent::ProcessAdded {
            process: process.to_string(),
        });
        Ok(())
    }

    async fn add_process_object(
        &self,
        process: &str,
        handle: Arc<dyn LocalManagerInterface>,
    ) -> ManagerResult<()> {
        if handle.process_name() != process {
            return Err(ManagerError::invalid_state(format!(
                "句柄属于进程 {}，不能注册为 {process}",
                handle.process_name()
            )));
        }
        let existed = self.registry.read().find_process(process);
        self.registry.write().add_process(process, Some(handle))?;
        if existed {
            info!("进程已补充反向调用句柄: {}", process);
        } else {
            info!("进程已注册（含反向调用句柄）: {}", process);
            let _ = self.events.send(ManagerEvent::ProcessAdded {
                process: process.to_string(),
            });
        }
        Ok(())
    }

    async fn remove_process(&self, process: &str) -> ManagerResult<()> {
        let connections = self.connections.lock().await;
        let entry = self.registry.write().remove_process(process)?;
        let purged = self.proxies.lock().purge_process(process);
        let mut related = entry.connection_ids();
        // 其他进程中的接口也可能引用该进程的连接
        related.extend(connections.involving(process));
        self.enqueue_for_entities(related, process);
        drop(connections);

        info!("进程已移除: {}（丢弃代理 {} 个）", process, purged);
        let _ = self.events.send(ManagerEvent::ProcessRemoved {
            process: process.to_string(),
        });
        Ok(())
    }

    async fn find_process(&self, process: &str) -> ManagerResult<bool> {
        Ok(self.registry.read().find_process(process))
    }

    async fn add_component(
        &self,
        process: &str,
        component: &str,
        kind: ComponentKind,
    ) -> ManagerResult<()> {
        self.registry.write().add_component(process, component, kind)?;
        debug!("组件已注册: {}:{} ({:?})", process, component, kind);
        Ok(())
    }

    async fn commit_add_component(&self, process: &str, component: &str) -> ManagerResult<()> {
        let kind = self.registry.write().commit_component(process, component)?;
        info!("组件注册完成: {}:{}", process, component);
        let _ = self.events.send(ManagerEvent::ComponentAdded {
            process: process.to_string(),
            component: component.to_string(),
            kind,
        });
        Ok(())
    }

    async fn remove_component(
        &self,
        process: &str,
        component: &str,
        cascade: bool,
    ) -> ManagerResult<()> {
        let connections = self.connections.lock().await;
        let entry = self
            .registry
            .write()
            .remove_component(process, component, cascade)?;
        if entry.kind() == ComponentKind::Proxy {
            self.proxies.lock().purge_component(process, component);
        }
        self.enqueue_for_entities(entry.connection_ids(), &format!("{process}:{component}"));
        drop(connections);

        info!("组件已移除: {}:{}", process, component);
        let _ = self.events.send(ManagerEvent::ComponentRemoved {
            process: process.to_string(),
            component: component.to_string(),
        });
        Ok(())
    }

    async fn find_component(&self, process: &str, component: &str) -> ManagerResult<bool> {
        Ok(self.registry.read().find_component(process, component))
    }

    async fn add_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let location = InterfaceLocation::new(process, component, interface);
        self.registry
            .write()
            .add_interface(&location, InterfaceRole::Provided)?;
        debug!("提供/输出接口已注册: {}", location);
        Ok(())
    }

    async fn add_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let location = InterfaceLocation::new(process, component, interface);
        self.registry
            .write()
            .add_interface(&location, InterfaceRole::Required)?;
        debug!("所需/输入接口已注册: {}", location);
        Ok(())
    }

    async fn remove_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let location = InterfaceLocation::new(process, component, interface);
        let connections = self.connections.lock().await;
        let ids = self
            .registry
            .write()
            .remove_interface(&location, InterfaceRole::Provided)?;
        self.enqueue_for_entities(ids.into_iter().collect(), &location.to_string());
        drop(connections);
        debug!("提供/输出接口已移除: {}", location);
        Ok(())
    }

    async fn remove_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        let location = InterfaceLocation::new(process, component, interface);
        let connections = self.connections.lock().await;
        let ids = self
            .registry
            .write()
            .remove_interface(&location, InterfaceRole::Required)?;
        self.enqueue_for_entities(ids.into_iter().collect(), &location.to_string());
        drop(connections);
        debug!("所需/输入接口已移除: {}", location);
        Ok(())
    }

    async fn find_interface_provided_or_output(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool> {
        Ok(self.registry.read().find_interface(
            &InterfaceLocation::new(process, component, interface),
            InterfaceRole::Provided,
        ))
    }

    async fn find_interface_required_or_input(
        &self,
        process: &str,
        component: &str,
        interface: &str,
    ) -> ManagerResult<bool> {
        Ok(self.registry.read().find_interface(
            &InterfaceLocation::new(process, component, interface),
            InterfaceRole::Required,
        ))
    }

    async fn connect(
        &self,
        requester: &str,
        description: &ConnectionDescription,
    ) -> ManagerResult<ConnectionId> {
        let mut connections = self.connections.lock().await;

        let description = self.validate(description)?;
        self.check_not_connected(&connections, &description)?;

        if description.is_remote() {
            if requester != description.client.process && requester != description.server.process {
                return Err(ManagerError::invalid_state(format!(
                    "请求进程 {requester} 既不是客户端也不是服务端进程: {description}"
                )));
            }
            self.prepare_proxies(&description).await?;
        }

        let targets = registry_targets(&description);
        let registered = connections.allocate_id().and_then(|id| {
            self.disconnects.lock().note_allocated(id);
            self.registry.write().register_connection(id, &targets)?;
            Ok(id)
        });
        let id = match registered {
            Ok(id) => id,
            Err(e) => {
                if description.is_remote() {
                    self.release_connection_proxies(&description).await;
                }
                return Err(e);
            }
        };

        let record = ConnectionRecord::new(id, description.clone(), requester);
        if let Err(e) = connections.insert(record) {
            self.registry.write().unregister_connection(id, &targets);
            if description.is_remote() {
                self.release_connection_proxies(&description).await;
            }
            return Err(e);
        }
        self.disconnects.lock().note_live(id);
        drop(connections);

        Counters::bump(&self.counters.connections_requested);
        info!("连接已登记 (连接 {}，请求进程 {}): {}", id, requester, description);
        let _ = self.events.send(ManagerEvent::ConnectionAdded { id, description });
        Ok(id)
    }

    async fn connect_confirm(&self, id: ConnectionId) -> ManagerResult<()> {
        let mut connections = self.connections.lock().await;
        if self.disconnects.lock().is_outstanding(id) {
            return Err(ManagerError::invalid_state(format!(
                "连接 {id} 正在断开，不能确认"
            )));
        }
        let changed = connections.confirm(id)?;
        drop(connections);
        if changed {
            Counters::bump(&self.counters.connections_confirmed);
            info!("连接已确认: {}", id);
            let _ = self.events.send(ManagerEvent::ConnectionConfirmed { id });
        }
        Ok(())
    }

    async fn disconnect(&self, id: ConnectionId) -> ManagerResult<()> {
        let request = self.disconnects.lock().request(id);
        match request {
            DisconnectRequest::Queued => {
                Counters::bump(&self.counters.disconnects_requested);
                self.wake.notify_one();
                debug!("连接 {} 已加入断开队列", id);
                Ok(())
            }
            DisconnectRequest::AlreadyQueued => {
                debug!("连接 {} 已在断开队列中", id);
                Ok(())
            }
            DisconnectRequest::AlreadyGone => {
                debug!("连接 {} 已经断开", id);
                Ok(())
            }
            DisconnectRequest::Unknown => {
                Err(ManagerError::not_found(format!("连接不存在: {id}")))
            }
        }
    }

    async fn disconnect_by_description(
        &self,
        description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        let id = self.find_connection_by_description(description);
        match id {
            Some(id) => self.disconnect(id).await,
            None => Err(ManagerError::not_found(format!("没有匹配的连接: {description}"))),
        }
    }

    async fn get_list_of_connections(&self) -> ManagerResult<Vec<ConnectionDescriptor>> {
        Ok(self
            .connections
            .lock()
            .await
            .records_in_state(ConnectionState::Connected)
            .into_iter()
            .map(ConnectionRecord::descriptor)
            .collect())
    }

    async fn initiate_connect(&self, id: ConnectionId) -> ManagerResult<()> {
        let description = self.pending_description(id).await?;
        let handle = self.process_handle(&description.client.process)?;
        debug!("请求客户端进程 {} 开始握手 (连接 {})", description.client.process, id);
        handle.connect_client_side_interface(id, &description).await
    }

    async fn connect_server_side_interface_request(&self, id: ConnectionId) -> ManagerResult<()> {
        let description = self.pending_description(id).await?;
        let handle = self.process_handle(&description.server.process)?;
        debug!("请求服务端进程 {} 完成握手 (连接 {})", description.server.process, id);
        handle.connect_server_side_interface(id, &description).await
    }

    async fn set_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
        endpoint: &str,
    ) -> ManagerResult<()> {
        self.connections.lock().await.set_endpoint(id, endpoint)?;
        debug!("连接 {} 的访问端点已发布: {}", id, endpoint);
        Ok(())
    }

    async fn get_interface_provided_proxy_access_info(
        &self,
        id: ConnectionId,
    ) -> ManagerResult<String> {
        self.connections.lock().await.endpoint(id)
    }

    async fn get_names_of_processes(&self) -> ManagerResult<Vec<String>> {
        Ok(self.registry.read().process_names())
    }

    async fn get_names_of_components(&self, process: &str) -> ManagerResult<Vec<String>> {
        self.registry.read().component_names(process)
    }

    async fn get_names_of_interfaces_provided_or_output(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>> {
        self.registry
            .read()
            .interface_names(process, component, InterfaceRole::Provided)
    }

    async fn get_names_of_interfaces_required_or_input(
        &self,
        process: &str,
        component: &str,
    ) -> ManagerResult<Vec<String>> {
        self.registry
            .read()
            .interface_names(process, component, InterfaceRole::Required)
    }
}

impl GlobalManager {
    /// 按两端接口在注册表中查找连接，两端顺序颠倒时同样匹配
    fn find_connection_by_description(
        &self,
        description: &ConnectionDescription,
    ) -> Option<ConnectionId> {
        let registry = self.registry.read();
        let matching = |description: &ConnectionDescription| {
            let client = registry
                .connections_of(&description.client, InterfaceRole::Required)
                .ok()?;
            let server = registry
                .connections_of(&description.server, InterfaceRole::Provided)
                .ok()?;
            client.into_iter().find(|id| server.contains(id))
        };
        matching(description).or_else(|| matching(&description.swapped()))
    }

    async fn pending_description(&self, id: ConnectionId) -> ManagerResult<ConnectionDescription> {
        let connections = self.connections.lock().await;
        let record = connections
            .get(id)
            .ok_or_else(|| ManagerError::not_found(format!("连接不存在: {id}")))?;
        if !record.is_remote() {
            return Err(ManagerError::invalid_state(format!(
                "连接 {id} 是进程内连接，不需要握手"
            )));
        }
        Ok(record.description().clone())
    }

    /// 登记失败后释放本次连接占用的代理
    async fn release_connection_proxies(&self, description: &ConnectionDescription) {
        let (client_handle, server_handle) = {
            let registry = self.registry.read();
            (
                registry.process_handle(&description.client.process),
                registry.process_handle(&description.server.process),
            )
        };
        let required = InterfaceProxyKey::new(
            required_proxy_location(description),
            InterfaceRole::Required,
        );
        self.release_proxy(server_handle.as_ref(), &required).await;
        let provided = InterfaceProxyKey::new(
            provided_proxy_location(description),
            InterfaceRole::Provided,
        );
        self.release_proxy(client_handle.as_ref(), &provided).await;
    }
}
