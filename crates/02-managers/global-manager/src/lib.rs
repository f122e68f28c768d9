//! # Global Manager
//!
//! 全局组件管理器 (GCM) 的进程内实现。
//!
//! ## 主要内容
//!
//! - [`Registry`] - 进程/组件/接口注册表
//! - [`ConnectionMap`] - 连接表与连接标识分配
//! - [`ProxyArena`] - 代理组件/接口的引用计数
//! - [`DisconnectQueues`] - 断开请求队列
//! - [`GlobalManager`] - 连接/断开协议，实现 [`manager_abstractions::GlobalComponentManager`]
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use global_manager::GlobalManager;
//! use manager_abstractions::GlobalComponentManager;
//! use manager_common::{ComponentKind, ConnectionDescription, ManagerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> manager_common::ManagerResult<()> {
//! let manager = Arc::new(GlobalManager::new(ManagerConfig::default()));
//! manager.start();
//!
//! manager.add_process("P1").await?;
//! manager.add_component("P1", "Sink", ComponentKind::Generic).await?;
//! manager.add_interface_provided_or_output("P1", "Sink", "Provided").await?;
//! manager.add_component("P1", "Source", ComponentKind::Generic).await?;
//! manager.add_interface_required_or_input("P1", "Source", "Required").await?;
//!
//! let description =
//!     ConnectionDescription::from_names("P1", "Source", "Required", "P1", "Sink", "Provided");
//! let id = manager.connect("P1", &description).await?;
//! manager.connect_confirm(id).await?;
//! manager.disconnect(id).await?;
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod disconnect;
pub mod manager;
pub mod proxy_arena;
pub mod registry;

pub use connection::{ConnectionMap, ConnectionRecord};
pub use disconnect::{DisconnectQueues, DisconnectRequest, DisconnectStatus};
pub use manager::{GlobalManager, GlobalManagerStatistics};
pub use proxy_arena::{ComponentProxyKey, InterfaceProxyKey, ProxyArena, ProxyRelease};
pub use registry::{InterfaceRole, Registry};
