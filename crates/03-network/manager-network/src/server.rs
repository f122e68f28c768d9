//! 联网 GCM 服务端

use async_trait::async_trait;
use global_manager::GlobalManager;
use manager_abstractions::{GlobalComponentManager, LocalManagerInterface};
use manager_common::{ManagerConfig, ManagerError, ManagerResult};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::link::{Link, RequestHandler};
use crate::protocol::{GlobalCall, Reply, Request};
use crate::remote::RemoteLocalManager;

/// 监听 LCM 连接并把请求转交给 [`GlobalManager`]
pub struct GlobalManagerServer {
    manager: Arc<GlobalManager>,
    config: ManagerConfig,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    links: Mutex<Vec<Arc<Link>>>,
    shutdown: CancellationToken,
    running: AtomicBool,
}

impl GlobalManagerServer {
    /// 绑定监听地址
    pub async fn bind(manager: Arc<GlobalManager>, config: ManagerConfig) -> ManagerResult<Self> {
        config.validate()?;
        let address = config.listen_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ManagerError::network(format!("监听 {address} 失败: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ManagerError::network(format!("读取监听地址失败: {e}")))?;

        Ok(Self {
            manager,
            config,
            listener: Mutex::new(Some(listener)),
            local_addr,
            links: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            running: AtomicBool::new(false),
        })
    }

    /// 实际监听地址
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 服务的 GCM
    pub fn manager(&self) -> &Arc<GlobalManager> {
        &self.manager
    }

    /// 是否正在接受连接
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// 当前活动链路数
    pub fn active_links(&self) -> usize {
        self.links.lock().iter().filter(|link| !link.is_closed()).count()
    }

    /// 接受连接直到 [`GlobalManagerServer::shutdown`]
    pub async fn run(&self) -> ManagerResult<()> {
        let Some(listener) = self.listener.lock().take() else {
            return Err(ManagerError::invalid_state("服务端已经运行过"));
        };
        self.running.store(true, Ordering::SeqCst);
        info!("GCM 服务端开始监听 {}", self.local_addr);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    info!("GCM 服务端收到停止信号");
                    break;
                }
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("设置 TCP_NODELAY 失败 ({}): {}", peer, e);
                        }
                        info!("LCM 已连接: {}", peer);
                        let session = Arc::new(ServerSession {
                            manager: Arc::clone(&self.manager),
                            processes: Mutex::new(BTreeSet::new()),
                        });
                        let (link, _task) =
                            Link::spawn(stream, peer.to_string(), &self.config, session);
                        let mut links = self.links.lock();
                        links.retain(|link| !link.is_closed());
                        links.push(link);
                    }
                    Err(e) => error!("接受连接失败: {}", e),
                },
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// 停止接受连接并关闭所有链路
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        for link in self.links.lock().drain(..) {
            link.close();
        }
    }
}

impl std::fmt::Debug for GlobalManagerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalManagerServer")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("active_links", &self.active_links())
            .finish_non_exhaustive()
    }
}

/// 一条 LCM 链路上的会话，记录经由它注册的进程
struct ServerSession {
    manager: Arc<GlobalManager>,
    processes: Mutex<BTreeSet<String>>,
}

impl ServerSession {
    async fn dispatch(&self, link: &Arc<Link>, call: GlobalCall) -> ManagerResult<Reply> {
        let manager = self.manager.as_ref();
        let reply = match call {
            GlobalCall::AddProcess { process } => {
                manager.add_process(&process).await?;
                self.processes.lock().insert(process);
                Reply::Unit
            }
            GlobalCall::AddProcessObject { process } => {
                let handle: Arc<dyn LocalManagerInterface> =
                    Arc::new(RemoteLocalManager::new(process.clone(), Arc::clone(link)));
                manager.add_process_object(&process, handle).await?;
                self.processes.lock().insert(process);
                Reply::Unit
            }
            GlobalCall::RemoveProcess { process } => {
                manager.remove_process(&process).await?;
                self.processes.lock().remove(&process);
                Reply::Unit
            }
            GlobalCall::FindProcess { process } => {
                Reply::Flag(manager.find_process(&process).await?)
            }
            GlobalCall::AddComponent { process, component, kind } => {
                manager.add_component(&process, &component, kind).await?;
                Reply::Unit
            }
            GlobalCall::CommitAddComponent { process, component } => {
                manager.commit_add_component(&process, &component).await?;
                Reply::Unit
            }
            GlobalCall::RemoveComponent { process, component, cascade } => {
                manager.remove_component(&process, &component, cascade).await?;
                Reply::Unit
            }
            GlobalCall::FindComponent { process, component } => {
                Reply::Flag(manager.find_component(&process, &component).await?)
            }
            GlobalCall::AddInterfaceProvided { process, component, interface } => {
                manager
                    .add_interface_provided_or_output(&process, &component, &interface)
                    .await?;
                Reply::Unit
            }
            GlobalCall::AddInterfaceRequired { process, component, interface } => {
                manager
                    .add_interface_required_or_input(&process, &component, &interface)
                    .await?;
                Reply::Unit
            }
            GlobalCall::RemoveInterfaceProvided { process, component, interface } => {
                manager
                    .remove_interface_provided_or_output(&process, &component, &interface)
                    .await?;
                Reply::Unit
            }
            GlobalCall::RemoveInterfaceRequired { process, component, interface } => {
                manager
                    .remove_interface_required_or_input(&process, &component, &interface)
                    .await?;
                Reply::Unit
            }
            GlobalCall::FindInterfaceProvided { process, component, interface } => Reply::Flag(
                manager
                    .find_interface_provided_or_output(&process, &component, &interface)
                    .await?,
            ),
            GlobalCall::FindInterfaceRequired { process, component, interface } => Reply::Flag(
                manager
                    .find_interface_required_or_input(&process, &component, &interface)
                    .await?,
            ),
            GlobalCall::Connect { requester, description } => {
                Reply::Connection(manager.connect(&requester, &description).await?)
            }
            GlobalCall::ConnectConfirm { id } => {
                manager.connect_confirm(id).await?;
                Reply::Unit
            }
            GlobalCall::Disconnect { id } => {
                manager.disconnect(id).await?;
                Reply::Unit
            }
            GlobalCall::DisconnectByDescription { description } => {
                manager.disconnect_by_description(&description).await?;
                Reply::Unit
            }
            GlobalCall::GetListOfConnections => {
                Reply::Connections(manager.get_list_of_connections().await?)
            }
            GlobalCall::InitiateConnect { id } => {
                manager.initiate_connect(id).await?;
                Reply::Unit
            }
            GlobalCall::ConnectServerSideInterfaceRequest { id } => {
                manager.connect_server_side_interface_request(id).await?;
                Reply::Unit
            }
            GlobalCall::SetAccessInfo { id, endpoint } => {
                manager
                    .set_interface_provided_proxy_access_info(id, &endpoint)
                    .await?;
                Reply::Unit
            }
            GlobalCall::GetAccessInfo { id } => {
                Reply::Endpoint(manager.get_interface_provided_proxy_access_info(id).await?)
            }
            GlobalCall::GetNamesOfProcesses => {
                Reply::Names(manager.get_names_of_processes().await?)
            }
            GlobalCall::GetNamesOfComponents { process } => {
                Reply::Names(manager.get_names_of_components(&process).await?)
            }
            GlobalCall::GetNamesOfInterfacesProvided { process, component } => Reply::Names(
                manager
                    .get_names_of_interfaces_provided_or_output(&process, &component)
                    .await?,
            ),
            GlobalCall::GetNamesOfInterfacesRequired { process, component } => Reply::Names(
                manager
                    .get_names_of_interfaces_required_or_input(&process, &component)
                    .await?,
            ),
        };
        Ok(reply)
    }
}

#[async_trait]
impl RequestHandler for ServerSession {
    async fn handle(&self, link: &Arc<Link>, request: Request) -> ManagerResult<Reply> {
        match request {
            Request::Global(call) => self.dispatch(link, call).await,
            Request::Local(call) => Err(ManagerError::invalid_state(format!(
                "GCM 不处理发往 LCM 的请求: {call:?}"
            ))),
        }
    }

    /// 链路断开时移除经由它注册的所有进程
    async fn closed(&self, link: &Arc<Link>) {
        let processes = std::mem::take(&mut *self.processes.lock());
        if processes.is_empty() {
            return;
        }
        info!("与 {} 的链路断开，移除进程: {:?}", link.peer(), processes);
        for process in processes {
            match self.manager.remove_process(&process).await {
                Ok(()) => {}
                Err(ManagerError::NotFound { .. }) => debug!("进程 {} 已被移除", process),
                Err(e) => warn!("移除进程 {} 失败: {}", process, e),
            }
        }
    }
}
