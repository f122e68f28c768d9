//! # Manager Abstractions
//!
//! 组件管理器抽象层，定义 LCM 与 GCM 之间的调用边界。
//!
//! ## 核心接口
//!
//! - [`GlobalComponentManager`] - LCM 调用 GCM 的接口（注册、连接、断开、端点交换）
//! - [`LocalManagerInterface`] - GCM 反向调用 LCM 的接口（代理生命周期、接口描述、握手）
//! - [`ManagerEvent`] - GCM 发布给观察者的事件
//!
//! 独立模式下两个接口都是进程内对象，联网模式下由网络层实现相同的 trait。

pub mod events;
pub mod global;
pub mod local;

pub use events::*;
pub use global::*;
pub use local::*;
