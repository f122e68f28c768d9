//! 组件管理器运行时

use crate::builder::ManagerRuntimeBuilder;
use global_manager::{GlobalManager, GlobalManagerStatistics};
use local_manager::LocalManager;
use manager_abstractions::{GlobalComponentManager, ManagerEvent};
use manager_common::{ManagerConfig, ManagerError, ManagerResult, GCM_PROCESS_NAME};
use manager_network::{GlobalManagerClient, GlobalManagerServer};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 部署拓扑
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// GCM 与 LCM 同进程
    Standalone {
        /// LCM 进程名
        process: String,
    },
    /// 运行 GCM 并监听 LCM，同时带一个名为 `GCM` 的本地 LCM
    NetworkedServer,
    /// LCM 通过 TCP 访问远程 GCM
    NetworkedClient {
        /// LCM 进程名
        process: String,
        /// GCM 地址，为空时使用配置中的监听地址
        address: Option<String>,
    },
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standalone { process } => write!(f, "独立模式 ({process})"),
            Self::NetworkedServer => write!(f, "联网服务端"),
            Self::NetworkedClient { process, address } => write!(
                f,
                "联网客户端 ({process} -> {})",
                address.as_deref().unwrap_or("配置地址")
            ),
        }
    }
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    /// 运行中
    Running,
    /// 停止中
    Stopping,
    /// 已停止
    Stopped,
    /// 失败
    Failed,
}

/// 运行时统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 本进程 GCM 的连接/断开计数（仅独立模式与服务端）
    pub global: Option<GlobalManagerStatistics>,
    /// 本地 LCM 的组件数
    pub local_components: usize,
    /// 本地 LCM 参与的连接数
    pub local_connections: usize,
}

impl RuntimeMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}

/// 组件管理器运行时
///
/// 持有一次部署中的全部管理器对象，替代进程级单例。
pub struct ManagerRuntime {
    id: Uuid,
    topology: Topology,
    config: ManagerConfig,
    global: Arc<dyn GlobalComponentManager>,
    gcm: Option<Arc<GlobalManager>>,
    server: Option<Arc<GlobalManagerServer>>,
    server_task: Mutex<Option<JoinHandle<ManagerResult<()>>>>,
    client: Option<Arc<GlobalManagerClient>>,
    local: Arc<LocalManager>,
    status: RwLock<RuntimeStatus>,
    metrics: RwLock<RuntimeMetrics>,
}

impl ManagerRuntime {
    /// 创建运行时构建器
    pub fn builder() -> ManagerRuntimeBuilder {
        ManagerRuntimeBuilder::new()
    }

    pub(crate) async fn assemble(topology: Topology, config: ManagerConfig) -> ManagerResult<Self> {
        let mut gcm = None;
        let mut server = None;
        let mut server_task = None;
        let mut client = None;

        let (global, process): (Arc<dyn GlobalComponentManager>, String) = match &topology {
            Topology::Standalone { process } => {
                let manager = Arc::new(GlobalManager::new(config.clone()));
                manager.start();
                gcm = Some(Arc::clone(&manager));
                (manager as Arc<dyn GlobalComponentManager>, process.clone())
            }
            Topology::NetworkedServer => {
                let manager = Arc::new(GlobalManager::new(config.clone()));
                manager.start();
                let listening = Arc::new(
                    GlobalManagerServer::bind(Arc::clone(&manager), config.clone()).await?,
                );
                let serving = Arc::clone(&listening);
                server_task = Some(tokio::spawn(async move { serving.run().await }));
                server = Some(listening);
                gcm = Some(Arc::clone(&manager));
                (manager as Arc<dyn GlobalComponentManager>, GCM_PROCESS_NAME.to_string())
            }
            Topology::NetworkedClient { process, address } => {
                let connected = match address {
                    Some(address) => GlobalManagerClient::connect_to(address, &config).await?,
                    None => GlobalManagerClient::connect(&config).await?,
                };
                let connected = Arc::new(connected);
                client = Some(Arc::clone(&connected));
                (connected as Arc<dyn GlobalComponentManager>, process.clone())
            }
        };

        let local = match LocalManager::create(process, Arc::clone(&global), config.clone()).await {
            Ok(local) => local,
            Err(e) => {
                error!("本地组件管理器初始化失败: {}", e);
                if let Some(server) = &server {
                    server.shutdown();
                }
                if let Some(gcm) = &gcm {
                    gcm.shutdown().await;
                }
                return Err(e);
            }
        };

        let runtime = Self {
            id: Uuid::new_v4(),
            topology,
            config,
            global,
            gcm,
            server,
            server_task: Mutex::new(server_task),
            client,
            local,
            status: RwLock::new(RuntimeStatus::Running),
            metrics: RwLock::new(RuntimeMetrics {
                start_time: Some(chrono::Utc::now()),
                ..RuntimeMetrics::default()
            }),
        };
        info!("运行时 {} 已启动: {}", runtime.id, runtime.topology);
        Ok(runtime)
    }

    /// 运行时标识
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 拓扑
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// 配置
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// 本进程访问 GCM 的接口（进程内对象或网络客户端）
    pub fn global(&self) -> &Arc<dyn GlobalComponentManager> {
        &self.global
    }

    /// 本进程内的 GCM（联网客户端模式下为空）
    pub fn global_manager(&self) -> Option<&Arc<GlobalManager>> {
        self.gcm.as_ref()
    }

    /// 本进程的 LCM
    pub fn local_manager(&self) -> &Arc<LocalManager> {
        &self.local
    }

    /// 联网服务端的实际监听地址
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(|server| server.local_addr())
    }

    /// 订阅 GCM 事件（联网客户端模式下为空）
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ManagerEvent>> {
        self.gcm.as_ref().map(|gcm| gcm.subscribe())
    }

    /// 运行状态
    pub fn status(&self) -> RuntimeStatus {
        *self.status.read()
    }

    /// 统计信息
    pub fn metrics(&self) -> RuntimeMetrics {
        let mut metrics = self.metrics.read().clone();
        metrics.global = self.gcm.as_ref().map(|gcm| gcm.statistics());
        metrics.local_components = self.local.get_names_of_components().len();
        metrics.local_connections = self.local.get_list_of_connections().len();
        metrics
    }

    /// 停止运行时：清理本地 LCM，关闭网络，停止 GCM 后台任务
    pub async fn shutdown(&self) -> ManagerResult<()> {
        {
            let mut status = self.status.write();
            if matches!(*status, RuntimeStatus::Stopping | RuntimeStatus::Stopped) {
                return Ok(());
            }
            *status = RuntimeStatus::Stopping;
        }
        info!("停止运行时 {}", self.id);

        let mut result = self.local.cleanup().await;

        if let Some(client) = &self.client {
            client.close();
        }
        if let Some(server) = &self.server {
            server.shutdown();
            let task = self.server_task.lock().take();
            if let Some(task) = task {
                match task.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("GCM 服务端退出时出错: {}", e);
                        result = result.and(Err(e));
                    }
                    Err(e) => {
                        warn!("GCM 服务端任务异常退出: {}", e);
                        result = result.and(Err(ManagerError::internal(format!(
                            "服务端任务异常: {e}"
                        ))));
                    }
                }
            }
        }
        if let Some(gcm) = &self.gcm {
            gcm.shutdown().await;
        }

        *self.status.write() = if result.is_ok() {
            RuntimeStatus::Stopped
        } else {
            RuntimeStatus::Failed
        };
        self.metrics.write().stop_time = Some(chrono::Utc::now());
        info!("运行时 {} 已停止", self.id);
        result
    }
}

impl fmt::Debug for ManagerRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerRuntime")
            .field("id", &self.id)
            .field("topology", &self.topology)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
