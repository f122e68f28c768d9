//! # Local Manager
//!
//! 本地组件管理器 (LCM)，每个进程一个。
//!
//! - [`LocalManager`] - 组件表、本地绑定、跨进程握手与生命周期，实现 [`manager_abstractions::LocalManagerInterface`]
//! - [`Component`] / [`InterfaceProvided`] / [`InterfaceRequired`] - 本地组件与接口对象
//! - [`ProxyTransport`] - 代理接口之间的端点传输，默认 [`LoopbackTransport`]
//!
//! 添加用户组件时会自动为其创建内部提供接口，并绑定到本进程的管理器组件客户端。
//!
//! ```rust,no_run
//! use global_manager::GlobalManager;
//! use local_manager::{Component, LocalManager};
//! use manager_common::{InterfaceProvidedDescription, InterfaceRequiredDescription, ManagerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> manager_common::ManagerResult<()> {
//! let global = Arc::new(GlobalManager::new(ManagerConfig::default()));
//! let local = LocalManager::create("P1", global, ManagerConfig::default()).await?;
//!
//! local
//!     .add_component(Component::new("Sink").with_interface_provided(InterfaceProvidedDescription::new("Provided")))
//!     .await?;
//! local
//!     .add_component(Component::new("Source").with_interface_required(InterfaceRequiredDescription::new("Required")))
//!     .await?;
//! let id = local.connect("Source", "Required", "Sink", "Provided").await?;
//! local.disconnect(id).await?;
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod interface;
pub mod manager;
pub mod transport;

pub use component::{Component, ComponentBehavior};
pub use interface::{
    check_compatibility, internal_interface_description, manager_client_required_description,
    Binding, InterfaceProvided, InterfaceRequired,
};
pub use manager::LocalManager;
pub use transport::{LoopbackTransport, ProxyTransport, LOOPBACK_SCHEME};
