//! # Manager Network
//!
//! 联网模式：GCM 独立运行，各进程的 LCM 通过 TCP 访问它。
//!
//! 线路格式为 4 字节大端长度前缀加 JSON 帧。一条连接上双向复用请求/应答，
//! LCM 调用 GCM 与 GCM 反向调用 LCM 共用同一条链路。
//!
//! - [`GlobalManagerServer`] - 监听并把请求转交给 [`global_manager::GlobalManager`]；链路断开时移除经由它注册的进程
//! - [`GlobalManagerClient`] - 在 LCM 一侧实现 [`manager_abstractions::GlobalComponentManager`]
//! - [`RemoteLocalManager`] - 在 GCM 一侧实现 [`manager_abstractions::LocalManagerInterface`]
//!
//! ```rust,no_run
//! use global_manager::GlobalManager;
//! use manager_network::{GlobalManagerClient, GlobalManagerServer};
//! use manager_abstractions::GlobalComponentManager;
//! use manager_common::ManagerConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> manager_common::ManagerResult<()> {
//! let config = ManagerConfig::default();
//! let manager = Arc::new(GlobalManager::new(config.clone()));
//! manager.start();
//!
//! let server = Arc::new(GlobalManagerServer::bind(manager, config.clone()).await?);
//! let serving = server.clone();
//! tokio::spawn(async move { serving.run().await });
//!
//! let client = GlobalManagerClient::connect_to(&server.local_addr().to_string(), &config).await?;
//! client.add_process("P1").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod link;
pub mod protocol;
pub mod remote;
pub mod server;

pub use client::GlobalManagerClient;
pub use codec::{read_frame, write_frame};
pub use link::{Link, RequestHandler};
pub use protocol::{Frame, GlobalCall, LocalCall, Reply, Request};
pub use remote::RemoteLocalManager;
pub use server::GlobalManagerServer;
