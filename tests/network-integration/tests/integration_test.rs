//! 联网模式集中集成测试：LCM 经 TCP 访问 GCM，GCM 经同一链路反向调用 LCM
use global_manager::GlobalManager;
use local_manager::{Component, LocalManager};
use manager_abstractions::GlobalComponentManager;
use manager_common::{
    CommandDescription, CommandKind, ConnectionDescription, ConnectionState, FunctionDescription,
    InterfaceProvidedDescription, InterfaceRequiredDescription, ManagerConfig, ManagerError,
    ManagerResult,
};
use manager_composition::{ManagerRuntime, RuntimeStatus};
use manager_network::{GlobalManagerClient, GlobalManagerServer};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::task::JoinHandle;

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
            .with_command(CommandDescription::new("GetValue", CommandKind::Read)),
    )
}

fn source(name: &str) -> Component {
    Component::new(name).with_interface_required(
        InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("GetValue", CommandKind::Read)),
    )
}

/// 监听在随机端口上的 GCM；协调任务不启动，由测试手动调用
struct Cluster {
    config: ManagerConfig,
    manager: Arc<GlobalManager>,
    server: Arc<GlobalManagerServer>,
    task: JoinHandle<ManagerResult<()>>,
}

impl Cluster {
    async fn start() -> Self {
        init_logging();
        let config = ManagerConfig::default().with_listen("127.0.0.1", 0);
        let manager = Arc::new(GlobalManager::new(config.clone()));
        let server = Arc::new(
            GlobalManagerServer::bind(manager.clone(), config.clone())
                .await
                .unwrap(),
        );
        let serving = server.clone();
        let task = tokio::spawn(async move { serving.run().await });
        Self {
            config,
            manager,
            server,
            task,
        }
    }

    async fn join(&self, process: &str) -> (Arc<GlobalManagerClient>, Arc<LocalManager>) {
        let address = self.server.local_addr().to_string();
        let client = Arc::new(
            GlobalManagerClient::connect_to(&address, &self.config)
                .await
                .unwrap(),
        );
        let local = LocalManager::create(
            process,
            client.clone() as Arc<dyn GlobalComponentManager>,
            self.config.clone(),
        )
        .await
        .unwrap();
        (client, local)
    }

    async fn stop(self) {
        self.server.shutdown();
        self.task.await.unwrap().unwrap();
        assert!(!self.server.is_running());
    }
}

async fn wait_for_process_removal(manager: &GlobalManager, process: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while manager.find_process(process).await.unwrap() {
        assert!(tokio::time::Instant::now() < deadline, "进程 {process} 未被移除");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_local_managers_register_over_tcp() {
    let cluster = Cluster::start().await;
    let (_c1, p1) = cluster.join("P1").await;
    let (_c2, _p2) = cluster.join("P2").await;
    p1.add_component(source("Source")).await.unwrap();

    let processes = cluster.manager.get_names_of_processes().await.unwrap();
    assert_eq!(processes, vec!["P1", "P2"]);
    assert!(cluster.manager.find_component("P1", "Source").await.unwrap());
    assert!(cluster.manager.find_component("P1", "P1_MCC").await.unwrap());
    assert!(cluster.manager.get_process_object("P1").is_some());
    assert_eq!(cluster.server.active_links(), 2);

    cluster.stop().await;
}

#[tokio::test]
async fn test_remote_connection_between_networked_processes() {
    let cluster = Cluster::start().await;
    let (_c1, p1) = cluster.join("P1").await;
    let (_c2, p2) = cluster.join("P2").await;
    p1.add_component(source("Source")).await.unwrap();
    p2.add_component(sink("Sink")).await.unwrap();

    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "P2", "Sink", "Provided");
    let id = p1.connect_remote(&description).await.unwrap();

    assert_eq!(
        cluster.manager.connection_state(id).await,
        Some(ConnectionState::Connected)
    );
    assert!(p1.find_component("P2.SinkProxy"));
    assert!(p2.find_component("P1.SourceProxy"));
    assert_eq!(p1.binding_of("Source", "Required").unwrap().unwrap().id, id);
    assert_eq!(p2.interface_user_count("Sink", "Provided").unwrap(), 1);
    assert_eq!(
        cluster
            .manager
            .get_interface_provided_proxy_access_info(id)
            .await
            .unwrap(),
        "loopback://P1/P2.SinkProxy/Provided"
    );

    p1.disconnect(id).await.unwrap();
    assert_eq!(cluster.manager.reconcile().await, 1);
    assert!(!p1.find_component("P2.SinkProxy"));
    assert!(!p2.find_component("P1.SourceProxy"));
    assert!(p1.binding_of("Source", "Required").unwrap().is_none());
    assert_eq!(cluster.manager.proxy_count(), 0);

    cluster.stop().await;
}

#[tokio::test]
async fn test_networked_client_reaches_gcm_hosted_component() {
    let cluster = Cluster::start().await;
    let hosted = LocalManager::create(
        "GCM",
        cluster.manager.clone() as Arc<dyn GlobalComponentManager>,
        cluster.config.clone(),
    )
    .await
    .unwrap();
    hosted.add_component(sink("Sink")).await.unwrap();
    let (_c1, p1) = cluster.join("P1").await;
    p1.add_component(source("Source")).await.unwrap();

    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "GCM", "Sink", "Provided");
    let id = p1.connect_remote(&description).await.unwrap();
    assert_eq!(hosted.interface_user_count("Sink", "Provided").unwrap(), 1);
    assert_eq!(
        hosted.binding_of("P1.SourceProxy", "Required").unwrap().unwrap().id,
        id
    );

    cluster.stop().await;
}

#[tokio::test]
async fn test_dropped_link_removes_its_processes() {
    let cluster = Cluster::start().await;
    let hosted = LocalManager::create(
        "GCM",
        cluster.manager.clone() as Arc<dyn GlobalComponentManager>,
        cluster.config.clone(),
    )
    .await
    .unwrap();
    hosted.add_component(sink("Sink")).await.unwrap();
    let (client, p1) = cluster.join("P1").await;
    p1.add_component(source("Source")).await.unwrap();
    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "GCM", "Sink", "Provided");
    p1.connect_remote(&description).await.unwrap();
    assert!(hosted.find_component("P1.SourceProxy"));

    client.close();
    assert!(!client.is_connected());
    wait_for_process_removal(&cluster.manager, "P1").await;
    cluster.manager.reconcile().await;

    assert!(!hosted.find_component("P1.SourceProxy"));
    assert_eq!(hosted.interface_user_count("Sink", "Provided").unwrap(), 0);
    assert!(cluster
        .manager
        .get_list_of_connections()
        .await
        .unwrap()
        .iter()
        .all(|descriptor| !descriptor.description.involves_process("P1")));

    // 链路关闭后的调用立即失败
    assert!(matches!(
        client.find_process("P1").await,
        Err(ManagerError::NetworkFailure { .. })
    ));

    cluster.stop().await;
}

#[tokio::test]
async fn test_error_kinds_survive_the_wire() {
    let cluster = Cluster::start().await;
    let (client, _p1) = cluster.join("P1").await;

    assert!(matches!(
        client.get_names_of_components("Nope").await,
        Err(ManagerError::NotFound { .. })
    ));
    assert!(matches!(
        client.add_process("P1").await,
        Err(ManagerError::AlreadyExists { .. })
    ));
    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "P1", "Sink", "Provided");
    assert!(matches!(
        client.connect("P1", &description).await,
        Err(ManagerError::NotFound { .. })
    ));

    cluster.stop().await;
}

#[tokio::test]
async fn test_runtime_shutdown_releases_server_side_proxies() {
    init_logging();
    let config = ManagerConfig::default()
        .with_listen("127.0.0.1", 0)
        .with_reconcile_interval(Duration::from_millis(20));
    let server = ManagerRuntime::builder()
        .networked_server()
        .with_config(config.clone())
        .build()
        .await
        .unwrap();
    let address = server.listen_addr().unwrap().to_string();
    server.local_manager().add_component(sink("Sink")).await.unwrap();

    let client = ManagerRuntime::builder()
        .networked_client("P1", Some(address))
        .with_config(config)
        .build()
        .await
        .unwrap();
    client.local_manager().add_component(source("Source")).await.unwrap();
    let description =
        ConnectionDescription::from_names("P1", "Source", "Required", "GCM", "Sink", "Provided");
    client.local_manager().connect_remote(&description).await.unwrap();
    assert!(server.local_manager().find_component("P1.SourceProxy"));

    client.shutdown().await.unwrap();
    assert_eq!(client.status(), RuntimeStatus::Stopped);

    let gcm = server.global_manager().unwrap();
    wait_for_process_removal(gcm, "P1").await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.local_manager().find_component("P1.SourceProxy") {
        assert!(tokio::time::Instant::now() < deadline, "服务端代理未被释放");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        server
            .local_manager()
            .interface_user_count("Sink", "Provided")
            .unwrap(),
        0
    );

    server.shutdown().await.unwrap();
    assert_eq!(server.status(), RuntimeStatus::Stopped);
}
