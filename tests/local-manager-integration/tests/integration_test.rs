//! LCM 集中集成测试：同一个 GCM 下两个进程的本地绑定、代理与生命周期
use async_trait::async_trait;
use global_manager::GlobalManager;
use local_manager::{Component, ComponentBehavior, LocalManager, LoopbackTransport};
use manager_abstractions::GlobalComponentManager;
use manager_common::{
    CommandDescription, CommandKind, ComponentKind, ComponentState, ConnectionDescription,
    ConnectionId, EventGeneratorDescription, EventHandlerDescription, EventKind,
    FunctionDescription, InterfaceProvidedDescription, InterfaceRequiredDescription,
    ManagerConfig, ManagerError, ManagerResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
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

fn sink(name: &str) -> Component {
    Component::new(name).with_interface_provided(
        InterfaceProvidedDescription::new("Provided")
            .with_command(CommandDescription::new("GetValue", CommandKind::Read))
            .with_event_generator(EventGeneratorDescription::new("Updated", EventKind::Void)),
    )
}

fn source(name: &str) -> Component {
    Component::new(name).with_interface_required(
        InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("GetValue", CommandKind::Read))
            .with_event_handler(EventHandlerDescription::new("Updated", EventKind::Void)),
    )
}

fn remote(client: &str) -> ConnectionDescription {
    ConnectionDescription::from_names("P1", client, "Required", "P2", "Sink", "Provided")
}

struct Deployment {
    global: Arc<GlobalManager>,
    p1: Arc<LocalManager>,
    p2: Arc<LocalManager>,
    p1_transport: Arc<LoopbackTransport>,
    p2_transport: Arc<LoopbackTransport>,
}

/// P1 上有 Source/Monitor，P2 上有 Sink；协调任务不启动，测试里手动调用
async fn deployment(config: ManagerConfig) -> Deployment {
    init_logging();
    let global = Arc::new(GlobalManager::new(config.clone()));
    let p1_transport = Arc::new(LoopbackTransport::new());
    let p2_transport = Arc::new(LoopbackTransport::new());

    let p1 = Arc::new(
        LocalManager::new("P1", global.clone(), config.clone())
            .with_transport(p1_transport.clone()),
    );
    p1.initialize().await.unwrap();
    let p2 = Arc::new(
        LocalManager::new("P2", global.clone(), config).with_transport(p2_transport.clone()),
    );
    p2.initialize().await.unwrap();

    p1.add_component(source("Source")).await.unwrap();
    p1.add_component(source("Monitor")).await.unwrap();
    p2.add_component(sink("Sink")).await.unwrap();

    Deployment {
        global,
        p1,
        p2,
        p1_transport,
        p2_transport,
    }
}

fn user_connections(p: &LocalManager) -> Vec<ConnectionId> {
    p.get_list_of_connections()
        .into_iter()
        .filter(|(_, description)| description.client.interface == "Required")
        .map(|(id, _)| id)
        .collect()
}

#[tokio::test]
async fn test_remote_connect_from_client_side() {
    let d = deployment(ManagerConfig::default()).await;
    let id = d.p1.connect_remote(&remote("Source")).await.unwrap();

    // 客户端进程：服务端组件代理及其提供接口代理
    assert_eq!(d.p1.component_kind("P2.SinkProxy").unwrap(), ComponentKind::Proxy);
    let binding = d.p1.binding_of("Source", "Required").unwrap().unwrap();
    assert_eq!(binding.id, id);
    assert_eq!(binding.component, "P2.SinkProxy");
    assert_eq!(d.p1.interface_user_count("P2.SinkProxy", "Provided").unwrap(), 1);
    assert_eq!(
        d.p1.get_names_of_commands("P2.SinkProxy", "Provided").unwrap(),
        vec!["GetValue"]
    );

    // 服务端进程：客户端组件代理及其所需接口代理
    assert_eq!(d.p2.component_kind("P1.SourceProxy").unwrap(), ComponentKind::Proxy);
    assert_eq!(
        d.p2.binding_of("P1.SourceProxy", "Required").unwrap().unwrap().component,
        "Sink"
    );
    assert_eq!(d.p2.interface_user_count("Sink", "Provided").unwrap(), 1);
    assert_eq!(
        d.p2_transport.attachment(id).as_deref(),
        Some("loopback://P1/P2.SinkProxy/Provided")
    );

    let connections = d.global.get_list_of_connections().await.unwrap();
    assert!(connections
        .iter()
        .any(|descriptor| descriptor.id == id && descriptor.description == remote("Source")));
    assert_eq!(user_connections(&d.p1), vec![id]);
    assert_eq!(user_connections(&d.p2), vec![id]);
}

#[tokio::test]
async fn test_remote_connect_from_server_side() {
    let d = deployment(ManagerConfig::default()).await;
    let id = d.p2.connect_remote(&remote("Source")).await.unwrap();

    assert_eq!(d.p1.binding_of("Source", "Required").unwrap().unwrap().id, id);
    assert_eq!(d.p2.interface_user_count("Sink", "Provided").unwrap(), 1);
    assert_eq!(
        d.global.connection_state(id).await,
        Some(manager_common::ConnectionState::Connected)
    );
}

#[tokio::test]
async fn test_remote_disconnect_removes_proxies_on_both_sides() {
    let d = deployment(ManagerConfig::default()).await;
    let id = d.p1.connect_remote(&remote("Source")).await.unwrap();

    d.p1.disconnect(id).await.unwrap();
    d.global.reconcile().await;

    assert!(d.p1.binding_of("Source", "Required").unwrap().is_none());
    assert!(!d.p1.find_component("P2.SinkProxy"));
    assert!(!d.p2.find_component("P1.SourceProxy"));
    assert_eq!(d.p2.interface_user_count("Sink", "Provided").unwrap(), 0);
    assert_eq!(d.p1_transport.open_endpoints(), 0);
    assert_eq!(d.p2_transport.attachment(id), None);
    assert!(user_connections(&d.p1).is_empty());
    assert!(user_connections(&d.p2).is_empty());
    assert_eq!(d.global.proxy_count(), 0);
}

#[tokio::test]
async fn test_shared_provided_proxy_outlives_first_client() {
    let d = deployment(ManagerConfig::default()).await;
    let first = d.p1.connect_remote(&remote("Source")).await.unwrap();
    let second = d.p1.connect_remote(&remote("Monitor")).await.unwrap();

    assert_eq!(d.p1.interface_user_count("P2.SinkProxy", "Provided").unwrap(), 2);
    assert_eq!(d.p1_transport.open_endpoints(), 1);
    assert!(d.p2.find_component("P1.SourceProxy"));
    assert!(d.p2.find_component("P1.MonitorProxy"));
    assert_eq!(d.p2.interface_user_count("Sink", "Provided").unwrap(), 2);

    d.p1.disconnect(first).await.unwrap();
    d.global.reconcile().await;
    assert!(d.p1.find_component("P2.SinkProxy"));
    assert_eq!(d.p1.interface_user_count("P2.SinkProxy", "Provided").unwrap(), 1);
    assert_eq!(d.p1_transport.open_endpoints(), 1);
    assert!(!d.p2.find_component("P1.SourceProxy"));
    assert_eq!(d.p1.binding_of("Monitor", "Required").unwrap().unwrap().id, second);

    d.p1.disconnect(second).await.unwrap();
    d.global.reconcile().await;
    assert!(!d.p1.find_component("P2.SinkProxy"));
    assert_eq!(d.p1_transport.open_endpoints(), 0);
}

#[tokio::test]
async fn test_connect_remote_requires_participation() {
    let d = deployment(ManagerConfig::default()).await;
    let description =
        ConnectionDescription::from_names("P3", "Source", "Required", "P2", "Sink", "Provided");
    assert!(matches!(
        d.p1.connect_remote(&description).await,
        Err(ManagerError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_connect_remote_gives_up_after_retries() {
    let config = ManagerConfig::default().with_connect_retry(3, Duration::from_millis(5));
    let d = deployment(config).await;
    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "P2", "Missing", "Provided");
    assert!(matches!(
        d.p1.connect_remote(&description).await,
        Err(ManagerError::NotFound { .. })
    ));
    assert!(d.p1.binding_of("Source", "Required").unwrap().is_none());
    assert_eq!(d.global.proxy_count(), 0);
}

#[tokio::test]
async fn test_connect_remote_waits_for_late_server_component() {
    let config = ManagerConfig::default().with_connect_retry(50, Duration::from_millis(10));
    let d = deployment(config).await;

    let p2 = d.p2.clone();
    let late = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        p2.add_component(sink("LateSink")).await
    });
    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "P2", "LateSink", "Provided");
    let id = d.p1.connect_remote(&description).await.unwrap();
    late.await.unwrap().unwrap();

    assert_eq!(d.p1.binding_of("Source", "Required").unwrap().unwrap().id, id);
    assert_eq!(d.p2.interface_user_count("LateSink", "Provided").unwrap(), 1);
}

#[tokio::test]
async fn test_removing_server_component_releases_client_proxy() {
    let d = deployment(ManagerConfig::default()).await;
    d.p1.connect_remote(&remote("Source")).await.unwrap();

    d.p2.remove_component("Sink").await.unwrap();
    d.global.reconcile().await;

    assert!(!d.p2.find_component("Sink"));
    assert!(!d.p2.find_component("P1.SourceProxy"));
    assert!(!d.p1.find_component("P2.SinkProxy"));
    assert!(d.p1.binding_of("Source", "Required").unwrap().is_none());
    assert!(!d.global.find_component("P2", "Sink").await.unwrap());
}

#[tokio::test]
async fn test_cleanup_of_peer_process() {
    let d = deployment(ManagerConfig::default()).await;
    d.p1.connect_remote(&remote("Source")).await.unwrap();

    d.p2.cleanup().await.unwrap();
    d.global.reconcile().await;

    assert!(!d.global.find_process("P2").await.unwrap());
    assert!(!d.p1.find_component("P2.SinkProxy"));
    assert!(d.p1.binding_of("Source", "Required").unwrap().is_none());
    assert!(d
        .global
        .get_list_of_connections()
        .await
        .unwrap()
        .iter()
        .all(|descriptor| !descriptor.description.involves_process("P2")));
}

#[tokio::test]
async fn test_every_user_component_is_bound_to_manager_client() {
    let d = deployment(ManagerConfig::default()).await;
    for component in ["Source", "Monitor"] {
        let binding = d
            .p1
            .binding_of("P1_MCC", &format!("InterfaceComponentRequiredFor{component}"))
            .unwrap()
            .unwrap();
        assert_eq!(binding.component, component);
        assert_eq!(binding.interface, "InterfaceInternal");
    }

    d.p1.remove_component("Monitor").await.unwrap();
    d.global.reconcile().await;
    assert_eq!(
        d.p1.get_names_of_interfaces_required("P1_MCC").unwrap(),
        vec!["InterfaceComponentRequiredForSource"]
    );
    assert!(!d
        .global
        .find_interface_required_or_input("P1", "P1_MCC", "InterfaceComponentRequiredForMonitor")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_manager_components_cannot_be_removed_directly() {
    let d = deployment(ManagerConfig::default()).await;
    assert!(matches!(
        d.p1.remove_component("P1_MCC").await,
        Err(ManagerError::InvalidState { .. })
    ));
    assert!(matches!(
        d.p1.add_component(Component::with_kind("Other", ComponentKind::ManagerServer))
            .await,
        Err(ManagerError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_process_named_gcm_hosts_manager_server() {
    init_logging();
    let global = Arc::new(GlobalManager::new(ManagerConfig::default()));
    let local = LocalManager::create("GCM", global.clone(), ManagerConfig::default())
        .await
        .unwrap();
    assert_eq!(local.component_kind("MCS").unwrap(), ComponentKind::ManagerServer);
    assert_eq!(local.component_kind("GCM_MCC").unwrap(), ComponentKind::ManagerClient);
    assert!(global.find_component("GCM", "MCS").await.unwrap());
}

#[tokio::test]
async fn test_incompatible_interfaces_are_not_bound() {
    let d = deployment(ManagerConfig::default()).await;
    d.p1.add_component(Component::new("Strict").with_interface_required(
        InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("Missing", CommandKind::Void)),
    ))
    .await
    .unwrap();
    d.p1.add_component(sink("LocalSink")).await.unwrap();

    assert!(d
        .p1
        .connect("Strict", "Required", "LocalSink", "Provided")
        .await
        .is_err());
    assert!(d.p1.binding_of("Strict", "Required").unwrap().is_none());
    assert_eq!(d.p1.interface_user_count("LocalSink", "Provided").unwrap(), 0);
}

/// 记录生命周期调用次数，可让启动失败
struct CountingBehavior {
    created: AtomicUsize,
    started: AtomicUsize,
    fail_start: bool,
}

impl CountingBehavior {
    fn new(fail_start: bool) -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            fail_start,
        })
    }
}

#[async_trait]
impl ComponentBehavior for CountingBehavior {
    async fn create(&self, _component: &str) -> ManagerResult<()> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start(&self, component: &str) -> ManagerResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(ManagerError::internal(format!("{component} 启动失败")));
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_lifecycle_calls_behaviors_once() {
    let d = deployment(ManagerConfig::default()).await;
    let behavior = CountingBehavior::new(false);
    d.p2.add_component(sink("Worker").with_behavior(behavior.clone()))
        .await
        .unwrap();

    d.p2.create_all_and_wait(Duration::from_secs(1)).await.unwrap();
    d.p2.create_all().await.unwrap();
    d.p2.start_all_and_wait(Duration::from_secs(1)).await.unwrap();

    assert_eq!(behavior.created.load(Ordering::SeqCst), 1);
    assert_eq!(behavior.started.load(Ordering::SeqCst), 1);
    assert_eq!(d.p2.component_state("Worker").unwrap(), ComponentState::Active);
    assert_eq!(d.p2.component_state("P2_MCC").unwrap(), ComponentState::Active);
}

#[tokio::test]
async fn test_failed_start_is_reported() {
    let d = deployment(ManagerConfig::default()).await;
    let behavior = CountingBehavior::new(true);
    d.p2.add_component(sink("Broken").with_behavior(behavior.clone()))
        .await
        .unwrap();

    d.p2.create_all().await.unwrap();
    assert!(d.p2.start_all().await.is_err());
    assert_eq!(d.p2.component_state("Broken").unwrap(), ComponentState::Ready);
    assert_eq!(d.p2.component_state("Sink").unwrap(), ComponentState::Active);
}
