//! # Manager Common
//!
//! 这个 crate 提供全局组件管理器 (GCM) 与本地组件管理器 (LCM) 共用的类型。
//!
//! ## 核心类型
//!
//! - [`ConnectionId`] - 单调递增且永不复用的连接标识
//! - [`ConnectionDescription`] - 连接的六元组身份
//! - [`InterfaceProvidedDescription`] / [`InterfaceRequiredDescription`] - 接口描述
//! - [`ComponentKind`] - 组件类别
//! - [`ManagerError`] - 错误分类
//! - [`ManagerConfig`] - 协议可调参数
//!
//! ## 设计原则
//!
//! - 纯数据类型，不包含 I/O
//! - 所有跨进程传递的类型都可序列化

pub mod configuration;
pub mod connection;
pub mod description;
pub mod errors;
pub mod lifecycle;
pub mod names;

pub use configuration::*;
pub use connection::*;
pub use description::*;
pub use errors::*;
pub use lifecycle::*;
pub use names::*;
