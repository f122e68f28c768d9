//! 组件管理器配置

use crate::errors::{ManagerError, ManagerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 环境变量前缀
pub const CONFIG_ENV_PREFIX: &str = "CMW";

/// 组件管理器配置
///
/// 包含连接协议中所有可调的常量。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// 未确认连接的超时时间（毫秒）
    pub connect_timeout_ms: u64,
    /// 断开协调任务的维护周期（毫秒）
    pub reconcile_interval_ms: u64,
    /// 已处理断开请求的保留数量
    pub processed_retention: usize,
    /// LCM 远程连接的重试次数
    pub connect_retry_count: u32,
    /// LCM 远程连接的重试间隔（毫秒）
    pub connect_retry_interval_ms: u64,
    /// 获取代理访问端点的尝试次数
    pub endpoint_fetch_attempts: u32,
    /// 获取代理访问端点的间隔（毫秒）
    pub endpoint_fetch_interval_ms: u64,
    /// 网络请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 网络帧最大长度
    pub max_message_size: usize,
    /// GCM 监听地址
    pub bind_address: String,
    /// GCM 监听端口
    pub port: u16,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            reconcile_interval_ms: 100,
            processed_retention: 1024,
            connect_retry_count: 10,
            connect_retry_interval_ms: 1_000,
            endpoint_fetch_attempts: 10,
            endpoint_fetch_interval_ms: 200,
            request_timeout_ms: 10_000,
            max_message_size: 4 * 1024 * 1024,
            bind_address: "127.0.0.1".to_string(),
            port: 10705,
        }
    }
}

impl ManagerConfig {
    /// 从配置文件加载，并叠加 `CMW_` 前缀的环境变量
    ///
    /// 文件格式由扩展名决定（toml / json / yaml）。
    pub fn load(path: Option<&Path>) -> ManagerResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            debug!("加载组件管理器配置文件: {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(CONFIG_ENV_PREFIX).try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .and_then(config::Config::try_deserialize::<Self>)
            .map_err(|e| ManagerError::config(format!("配置加载失败: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// 验证配置
    pub fn validate(&self) -> ManagerResult<()> {
        let checks = [
            (self.connect_timeout_ms == 0, "connect_timeout_ms"),
            (self.reconcile_interval_ms == 0, "reconcile_interval_ms"),
            (self.connect_retry_count == 0, "connect_retry_count"),
            (self.endpoint_fetch_attempts == 0, "endpoint_fetch_attempts"),
            (self.request_timeout_ms == 0, "request_timeout_ms"),
            (self.max_message_size == 0, "max_message_size"),
        ];
        for (invalid, field) in checks {
            if invalid {
                return Err(ManagerError::config(format!("{field} 必须大于 0")));
            }
        }
        Ok(())
    }

    /// 渲染为 TOML 文本
    pub fn to_toml(&self) -> ManagerResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ManagerError::config(format!("配置序列化失败: {e}")))
    }

    /// 设置超时时间
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_to_millis(timeout);
        self
    }

    /// 设置维护周期
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval_ms = duration_to_millis(interval);
        self
    }

    /// 设置远程连接重试策略
    pub fn with_connect_retry(mut self, count: u32, interval: Duration) -> Self {
        self.connect_retry_count = count;
        self.connect_retry_interval_ms = duration_to_millis(interval);
        self
    }

    /// 设置端点获取策略
    pub fn with_endpoint_fetch(mut self, attempts: u32, interval: Duration) -> Self {
        self.endpoint_fetch_attempts = attempts;
        self.endpoint_fetch_interval_ms = duration_to_millis(interval);
        self
    }

    /// 设置监听地址
    pub fn with_listen(mut self, bind_address: impl Into<String>, port: u16) -> Self {
        self.bind_address = bind_address.into();
        self.port = port;
        self
    }

    /// 未确认连接的超时时间
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// 维护周期
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    /// 远程连接重试间隔
    pub fn connect_retry_interval(&self) -> Duration {
        Duration::from_millis(self.connect_retry_interval_ms)
    }

    /// 端点获取间隔
    pub fn endpoint_fetch_interval(&self) -> Duration {
        Duration::from_millis(self.endpoint_fetch_interval_ms)
    }

    /// 网络请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 监听地址 `host:port`
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
