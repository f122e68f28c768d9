//! # 组合层
//!
//! 把 GCM、LCM 与网络层组装成可运行的部署：
//!
//! - **独立模式**：GCM 与 LCM 在同一进程内直接调用
//! - **联网服务端**：运行 GCM 并监听 LCM，同进程带一个名为 `GCM` 的 LCM
//! - **联网客户端**：本进程 LCM 通过 TCP 访问远程 GCM
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use manager_composition::{LoggingConfig, ManagerRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ManagerRuntime::builder()
//!         .standalone("P1")
//!         .with_logging(LoggingConfig::development())
//!         .build()
//!         .await?;
//!
//!     let local = runtime.local_manager();
//!     println!("组件: {:?}", local.get_names_of_components());
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod runtime;

pub use builder::{LoggingConfig, ManagerRuntimeBuilder};
pub use runtime::{ManagerRuntime, RuntimeMetrics, RuntimeStatus, Topology};
