//! GCM 集中集成测试：注册表级联、连接/断开协议与代理引用计数
use async_trait::async_trait;
use global_manager::GlobalManager;
use manager_abstractions::{GlobalComponentManager, LocalManagerInterface};
use manager_common::{
    ComponentKind, ConnectionDescription, ConnectionId, ConnectionState,
    InterfaceProvidedDescription, InterfaceRequiredDescription, ManagerConfig, ManagerError,
    ManagerResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once, Weak};
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// 记录 GCM 反向调用的 LCM 替身
struct RecordingLocalManager {
    process: String,
    calls: Mutex<Vec<String>>,
    fail_provided_proxy: AtomicBool,
    /// 反向调用中顺带断开的连接
    nested_disconnect: Mutex<Option<(Weak<GlobalManager>, ConnectionId)>>,
}

impl RecordingLocalManager {
    fn new(process: &str) -> Arc<Self> {
        Arc::new(Self {
            process: process.to_string(),
            calls: Mutex::new(Vec::new()),
            fail_provided_proxy: AtomicBool::new(false),
            nested_disconnect: Mutex::new(None),
        })
    }

    /// 之后的反向调用都会在 GCM 内部再调用一次 `disconnect(id)`
    fn disconnect_during_callbacks(&self, manager: &Arc<GlobalManager>, id: ConnectionId) {
        *self.nested_disconnect.lock() = Some((Arc::downgrade(manager), id));
    }

    async fn run_nested_disconnect(&self) {
        let target = self.nested_disconnect.lock().clone();
        let Some((manager, id)) = target else {
            return;
        };
        let Some(manager) = manager.upgrade() else {
            return;
        };
        let nested = tokio::time::timeout(Duration::from_secs(2), manager.disconnect(id)).await;
        let outcome = match nested {
            Ok(Ok(())) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "blocked",
        };
        self.record(format!("nested_disconnect:{id}:{outcome}"));
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LocalManagerInterface for RecordingLocalManager {
    fn process_name(&self) -> &str {
        &self.process
    }

    async fn create_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        self.record(format!("create_component_proxy:{component_proxy}"));
        Ok(())
    }

    async fn remove_component_proxy(&self, component_proxy: &str) -> ManagerResult<()> {
        self.record(format!("remove_component_proxy:{component_proxy}"));
        Ok(())
    }

    async fn create_interface_provided_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceProvidedDescription,
    ) -> ManagerResult<()> {
        if self.fail_provided_proxy.load(Ordering::SeqCst) {
            return Err(ManagerError::internal("模拟的代理创建失败"));
        }
        self.record(format!(
            "create_interface_provided_proxy:{component_proxy}:{}",
            description.interface_name
        ));
        Ok(())
    }

    async fn create_interface_required_proxy(
        &self,
        component_proxy: &str,
        description: &InterfaceRequiredDescription,
    ) -> ManagerResult<()> {
        self.record(format!(
            "create_interface_required_proxy:{component_proxy}:{}",
            description.interface_name
        ));
        Ok(())
    }

    async fn remove_interface_provided_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.record(format!("remove_interface_provided_proxy:{component_proxy}:{interface}"));
        Ok(())
    }

    async fn remove_interface_required_proxy(
        &self,
        component_proxy: &str,
        interface: &str,
    ) -> ManagerResult<()> {
        self.record(format!("remove_interface_required_proxy:{component_proxy}:{interface}"));
        Ok(())
    }

    async fn get_interface_provided_description(
        &self,
        _component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceProvidedDescription> {
        Ok(InterfaceProvidedDescription::new(interface))
    }

    async fn get_interface_required_description(
        &self,
        _component: &str,
        interface: &str,
    ) -> ManagerResult<InterfaceRequiredDescription> {
        self.run_nested_disconnect().await;
        Ok(InterfaceRequiredDescription::new(interface))
    }

    async fn connect_server_side_interface(
        &self,
        id: ConnectionId,
        _description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.record(format!("connect_server_side_interface:{id}"));
        Ok(())
    }

    async fn connect_client_side_interface(
        &self,
        id: ConnectionId,
        _description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.record(format!("connect_client_side_interface:{id}"));
        Ok(())
    }

    async fn disconnect_local(
        &self,
        id: ConnectionId,
        _description: &ConnectionDescription,
    ) -> ManagerResult<()> {
        self.record(format!("disconnect_local:{id}"));
        self.run_nested_disconnect().await;
        Ok(())
    }
}

async fn add_provider(manager: &GlobalManager, process: &str, component: &str) {
    manager
        .add_component(process, component, ComponentKind::Generic)
        .await
        .unwrap();
    manager
        .add_interface_provided_or_output(process, component, "Provided")
        .await
        .unwrap();
    manager.commit_add_component(process, component).await.unwrap();
}

async fn add_consumer(manager: &GlobalManager, process: &str, component: &str) {
    manager
        .add_component(process, component, ComponentKind::Generic)
        .await
        .unwrap();
    manager
        .add_interface_required_or_input(process, component, "Required")
        .await
        .unwrap();
    manager.commit_add_component(process, component).await.unwrap();
}

/// 进程 P1 中的 Sink/Source
async fn scenario_manager() -> GlobalManager {
    init_logging();
    let manager = GlobalManager::new(ManagerConfig::default());
    manager.add_process("P1").await.unwrap();
    add_provider(&manager, "P1", "Sink").await;
    add_consumer(&manager, "P1", "Source").await;
    manager
}

fn local(client: &str, server: &str) -> ConnectionDescription {
    ConnectionDescription::from_names("P1", client, "Required", "P1", server, "Provided")
}

/// P1 有两个客户端组件，P2 有一个服务端组件，两侧都注册了替身句柄
async fn remote_manager(
    config: ManagerConfig,
) -> (Arc<GlobalManager>, Arc<RecordingLocalManager>, Arc<RecordingLocalManager>) {
    init_logging();
    let manager = Arc::new(GlobalManager::new(config));
    let p1 = RecordingLocalManager::new("P1");
    let p2 = RecordingLocalManager::new("P2");
    manager.add_process_object("P1", p1.clone()).await.unwrap();
    manager.add_process_object("P2", p2.clone()).await.unwrap();
    add_consumer(&manager, "P1", "Source").await;
    add_consumer(&manager, "P1", "Source2").await;
    add_provider(&manager, "P2", "Sink").await;
    (manager, p1, p2)
}

fn remote(client: &str) -> ConnectionDescription {
    ConnectionDescription::from_names("P1", client, "Required", "P2", "Sink", "Provided")
}

async fn wait_until_gone(manager: &GlobalManager, id: ConnectionId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while manager.connection_state(id).await.is_some() {
        assert!(tokio::time::Instant::now() < deadline, "连接 {id} 未在期限内断开");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_connect_confirm_and_list() {
    let manager = scenario_manager().await;
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    assert_eq!(id, ConnectionId(1));

    manager.connect_confirm(id).await.unwrap();
    let connections = manager.get_list_of_connections().await.unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].id, id);
    assert_eq!(connections[0].description, local("Source", "Sink"));
    assert_eq!(connections[0].requester, "P1");
}

#[tokio::test]
async fn test_repeated_connect_is_rejected() {
    let manager = scenario_manager().await;
    manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    let error = manager.connect("P1", &local("Source", "Sink")).await.unwrap_err();
    assert!(matches!(error, ManagerError::AlreadyExists { .. }));
    assert_eq!(
        manager
            .get_connections_of_interface_provided_or_output("P1", "Sink", "Provided")
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_double_disconnect_then_reconcile() {
    let manager = scenario_manager().await;
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    manager.connect_confirm(id).await.unwrap();

    manager.disconnect(id).await.unwrap();
    manager.disconnect(id).await.unwrap();
    manager.reconcile().await;

    assert!(manager.get_list_of_connections().await.unwrap().is_empty());
    assert!(manager
        .get_connections_of_interface_required_or_input("P1", "Source", "Required")
        .unwrap()
        .is_empty());
    assert!(manager
        .get_connections_of_interface_provided_or_output("P1", "Sink", "Provided")
        .unwrap()
        .is_empty());
    assert_eq!(manager.statistics().disconnects_processed, 1);
}

#[tokio::test]
async fn test_connect_to_missing_component_leaves_registry_unchanged() {
    let manager = scenario_manager().await;
    let components = manager.get_names_of_components("P1").await.unwrap();

    let error = manager
        .connect("P1", &local("Source", "Missing"))
        .await
        .unwrap_err();
    assert!(matches!(error, ManagerError::NotFound { .. }));

    assert_eq!(manager.get_names_of_components("P1").await.unwrap(), components);
    assert!(manager
        .get_connections_of_interface_required_or_input("P1", "Source", "Required")
        .unwrap()
        .is_empty());
    assert!(manager.get_list_of_pending_connections().await.is_empty());
    // 失败的请求不消耗连接标识
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    assert_eq!(id, ConnectionId(1));
}

#[tokio::test]
async fn test_remove_process_cascades_to_connections() {
    let manager = scenario_manager().await;
    manager.add_process("P2").await.unwrap();
    add_provider(&manager, "P2", "Sink").await;
    add_consumer(&manager, "P2", "Source").await;

    let id1 = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    manager.connect_confirm(id1).await.unwrap();
    let other =
        ConnectionDescription::from_names("P2", "Source", "Required", "P2", "Sink", "Provided");
    let id2 = manager.connect("P2", &other).await.unwrap();
    manager.connect_confirm(id2).await.unwrap();

    manager.remove_process("P1").await.unwrap();
    assert_eq!(manager.reconcile().await, 1);

    assert!(!manager.find_process("P1").await.unwrap());
    assert!(matches!(
        manager.get_names_of_components("P1").await,
        Err(ManagerError::NotFound { .. })
    ));
    let connections = manager.get_list_of_connections().await.unwrap();
    assert!(connections
        .iter()
        .all(|descriptor| !descriptor.description.involves_process("P1")));
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0].id, id2);
}

#[tokio::test]
async fn test_required_interface_accepts_one_connection() {
    let manager = scenario_manager().await;
    add_provider(&manager, "P1", "Sink2").await;

    manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    let error = manager
        .connect("P1", &local("Source", "Sink2"))
        .await
        .unwrap_err();
    assert!(matches!(error, ManagerError::InvalidState { .. }));
    assert_eq!(
        manager
            .get_connections_of_interface_required_or_input("P1", "Source", "Required")
            .unwrap()
            .len(),
        1
    );
    assert!(manager
        .get_connections_of_interface_provided_or_output("P1", "Sink2", "Provided")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_provided_interface_serves_many_clients() {
    let manager = scenario_manager().await;
    add_consumer(&manager, "P1", "Source2").await;
    add_consumer(&manager, "P1", "Source3").await;

    let mut ids = Vec::new();
    for client in ["Source", "Source2", "Source3"] {
        let id = manager.connect("P1", &local(client, "Sink")).await.unwrap();
        manager.connect_confirm(id).await.unwrap();
        ids.push(id);
    }
    assert_eq!(
        manager
            .get_connections_of_interface_provided_or_output("P1", "Sink", "Provided")
            .unwrap(),
        ids
    );

    manager.disconnect(ids[1]).await.unwrap();
    manager.reconcile().await;
    assert_eq!(
        manager
            .get_connections_of_interface_provided_or_output("P1", "Sink", "Provided")
            .unwrap(),
        vec![ids[0], ids[2]]
    );
    assert_eq!(manager.get_list_of_connections().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_connection_ids_are_never_reused() {
    let manager = scenario_manager().await;
    let mut previous = ConnectionId(0);
    for _ in 0..5 {
        let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
        assert!(id > previous);
        manager.connect_confirm(id).await.unwrap();
        manager.disconnect(id).await.unwrap();
        manager.reconcile().await;
        previous = id;
    }
    assert_eq!(previous, ConnectionId(5));
}

#[tokio::test]
async fn test_concurrent_disconnect_frees_proxies_once() {
    let (manager, p1, p2) = remote_manager(ManagerConfig::default()).await;
    let id = manager.connect("P1", &remote("Source")).await.unwrap();
    manager.connect_confirm(id).await.unwrap();

    let (first, second) = tokio::join!(manager.disconnect(id), manager.disconnect(id));
    first.unwrap();
    second.unwrap();
    assert_eq!(manager.outstanding_disconnects(), 1);

    manager.reconcile().await;
    manager.disconnect(id).await.unwrap();
    manager.reconcile().await;

    assert_eq!(p1.count("remove_interface_provided_proxy:"), 1);
    assert_eq!(p1.count("remove_component_proxy:P2.SinkProxy"), 1);
    assert_eq!(p2.count("remove_interface_required_proxy:"), 1);
    assert_eq!(p2.count("remove_component_proxy:P1.SourceProxy"), 1);
    assert_eq!(p1.count("disconnect_local:"), 1);
    assert_eq!(p2.count("disconnect_local:"), 1);
    assert_eq!(manager.proxy_count(), 0);
    assert_eq!(manager.statistics().disconnects_processed, 1);
}

#[tokio::test]
async fn test_failed_proxy_creation_rolls_back() {
    let (manager, p1, p2) = remote_manager(ManagerConfig::default()).await;
    p1.fail_provided_proxy.store(true, Ordering::SeqCst);

    assert!(manager.connect("P1", &remote("Source")).await.is_err());
    assert_eq!(manager.proxy_count(), 0);
    assert!(!manager.find_component("P2", "P1.SourceProxy").await.unwrap());
    assert!(!manager.find_component("P1", "P2.SinkProxy").await.unwrap());
    assert_eq!(p2.count("remove_interface_required_proxy:P1.SourceProxy"), 1);
    assert_eq!(p2.count("remove_component_proxy:P1.SourceProxy"), 1);
    assert!(manager
        .get_connections_of_interface_required_or_input("P1", "Source", "Required")
        .unwrap()
        .is_empty());
    assert!(manager.get_list_of_pending_connections().await.is_empty());

    p1.fail_provided_proxy.store(false, Ordering::SeqCst);
    let id = manager.connect("P1", &remote("Source")).await.unwrap();
    assert_eq!(id, ConnectionId(1));
}

#[tokio::test]
async fn test_unconfirmed_connection_is_evicted() {
    let config = ManagerConfig::default()
        .with_connect_timeout(Duration::from_millis(50))
        .with_reconcile_interval(Duration::from_millis(20));
    init_logging();
    let manager = Arc::new(GlobalManager::new(config));
    manager.add_process("P1").await.unwrap();
    add_provider(&manager, "P1", "Sink").await;
    add_consumer(&manager, "P1", "Source").await;
    manager.start();

    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    assert_eq!(manager.connection_state(id).await, Some(ConnectionState::Pending));

    wait_until_gone(&manager, id).await;
    assert!(manager.get_list_of_pending_connections().await.is_empty());
    assert!(manager.get_list_of_connections().await.unwrap().is_empty());
    assert_eq!(manager.statistics().connections_evicted, 1);
    // 驱逐后的标识可以安全地再次断开
    manager.disconnect(id).await.unwrap();

    manager.shutdown().await;
    assert!(!manager.is_running());
}

#[tokio::test]
async fn test_shared_provided_proxy_is_reference_counted() {
    let (manager, p1, p2) = remote_manager(ManagerConfig::default()).await;
    let first = manager.connect("P1", &remote("Source")).await.unwrap();
    let second = manager.connect("P1", &remote("Source2")).await.unwrap();

    assert_eq!(p1.count("create_component_proxy:P2.SinkProxy"), 1);
    assert_eq!(p1.count("create_interface_provided_proxy:P2.SinkProxy:Provided"), 1);
    assert_eq!(p2.count("create_component_proxy:"), 2);
    assert_eq!(p2.count("create_interface_required_proxy:"), 2);
    assert!(manager.is_proxy_component("P1", "P2.SinkProxy"));
    assert!(manager
        .find_interface_provided_or_output("P1", "P2.SinkProxy", "Provided")
        .await
        .unwrap());

    manager.disconnect(first).await.unwrap();
    manager.reconcile().await;
    assert_eq!(p1.count("remove_interface_provided_proxy:"), 0);
    assert_eq!(p2.count("remove_component_proxy:P1.SourceProxy"), 1);
    assert!(manager.find_component("P1", "P2.SinkProxy").await.unwrap());

    manager.disconnect(second).await.unwrap();
    manager.reconcile().await;
    assert_eq!(p1.count("remove_interface_provided_proxy:P2.SinkProxy:Provided"), 1);
    assert_eq!(p1.count("remove_component_proxy:P2.SinkProxy"), 1);
    assert!(!manager.find_component("P1", "P2.SinkProxy").await.unwrap());
    assert_eq!(manager.proxy_count(), 0);
}

#[tokio::test]
async fn test_remote_handshake_calls_reach_both_sides() {
    let (manager, p1, p2) = remote_manager(ManagerConfig::default()).await;
    let id = manager.connect("P1", &remote("Source")).await.unwrap();

    manager.initiate_connect(id).await.unwrap();
    assert_eq!(p1.calls().last().unwrap(), &format!("connect_client_side_interface:{id}"));

    manager
        .set_interface_provided_proxy_access_info(id, "loopback://P1/P2.SinkProxy/Provided")
        .await
        .unwrap();
    manager.connect_server_side_interface_request(id).await.unwrap();
    assert_eq!(p2.count("connect_server_side_interface:"), 1);

    assert_eq!(
        manager.get_interface_provided_proxy_access_info(id).await.unwrap(),
        "loopback://P1/P2.SinkProxy/Provided"
    );
    assert_eq!(
        manager
            .get_interface_provided_proxy_access_info_by_names("P1", "P2", "Sink", "Provided")
            .await
            .unwrap(),
        "loopback://P1/P2.SinkProxy/Provided"
    );

    manager.connect_confirm(id).await.unwrap();
    assert_eq!(manager.get_list_of_connections().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_remote_connect_checks_requester() {
    let (manager, _p1, _p2) = remote_manager(ManagerConfig::default()).await;
    let error = manager.connect("P3", &remote("Source")).await.unwrap_err();
    assert!(matches!(error, ManagerError::InvalidState { .. }));
    assert_eq!(manager.proxy_count(), 0);
}

#[tokio::test]
async fn test_local_connection_has_no_handshake() {
    let manager = scenario_manager().await;
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    assert!(matches!(
        manager.initiate_connect(id).await,
        Err(ManagerError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_removing_interface_queues_its_connections() {
    let manager = scenario_manager().await;
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    manager.connect_confirm(id).await.unwrap();

    manager
        .remove_interface_provided_or_output("P1", "Sink", "Provided")
        .await
        .unwrap();
    assert_eq!(manager.reconcile().await, 1);
    assert!(manager
        .get_connections_of_interface_required_or_input("P1", "Source", "Required")
        .unwrap()
        .is_empty());
    assert!(manager.get_list_of_connections().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_component_with_interfaces_needs_cascade() {
    let manager = scenario_manager().await;
    assert!(matches!(
        manager.remove_component("P1", "Sink", false).await,
        Err(ManagerError::InvalidState { .. })
    ));
    manager.remove_component("P1", "Sink", true).await.unwrap();
    assert!(!manager.find_component("P1", "Sink").await.unwrap());
}

#[tokio::test]
async fn test_disconnect_by_description() {
    let manager = scenario_manager().await;
    let id = manager.connect("P1", &local("Source", "Sink")).await.unwrap();
    manager.connect_confirm(id).await.unwrap();

    manager
        .disconnect_by_description(&local("Source", "Sink"))
        .await
        .unwrap();
    manager.reconcile().await;
    assert_eq!(manager.connection_state(id).await, None);
    assert!(matches!(
        manager.disconnect_by_description(&local("Source", "Sink")).await,
        Err(ManagerError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_disconnect_from_reverse_call_does_not_block() {
    let (manager, p1, _p2) = remote_manager(ManagerConfig::default()).await;
    let first = manager.connect("P1", &remote("Source")).await.unwrap();
    manager.connect_confirm(first).await.unwrap();
    p1.disconnect_during_callbacks(&manager, first);

    // Connect 持有连接表期间，反向调用里的 Disconnect 只操作断开队列
    let second = tokio::time::timeout(
        Duration::from_secs(5),
        manager.connect("P1", &remote("Source2")),
    )
    .await
    .expect("Connect 未在期限内完成")
    .unwrap();
    assert_eq!(p1.count(&format!("nested_disconnect:{first}:ok")), 1);
    assert_eq!(p1.count(&format!("nested_disconnect:{first}:blocked")), 0);
    assert_eq!(manager.outstanding_disconnects(), 1);

    // 已在断开队列中的连接不能再被确认
    assert!(matches!(
        manager.connect_confirm(first).await,
        Err(ManagerError::InvalidState { .. })
    ));

    // 拆除时的反向调用再次断开同一个连接
    let processed = tokio::time::timeout(Duration::from_secs(5), manager.reconcile())
        .await
        .expect("协调未在期限内完成");
    assert_eq!(processed, 1);
    assert_eq!(p1.count(&format!("nested_disconnect:{first}:blocked")), 0);
    assert_eq!(p1.count(&format!("nested_disconnect:{first}:ok")), 2);
    assert_eq!(manager.outstanding_disconnects(), 0);
    assert_eq!(manager.connection_state(first).await, None);
    assert_eq!(
        manager.connection_state(second).await,
        Some(ConnectionState::Pending)
    );
    assert_eq!(manager.statistics().disconnects_processed, 1);
}
