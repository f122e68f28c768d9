//! 运行时构建器

use crate::runtime::{ManagerRuntime, Topology};
use manager_common::{ManagerConfig, ManagerError, ManagerResult, DEFAULT_PROCESS_NAME};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 运行时构建器
///
/// 选择拓扑、配置来源与日志，然后 [`ManagerRuntimeBuilder::build`] 组装出 [`ManagerRuntime`]。
pub struct ManagerRuntimeBuilder {
    /// 拓扑
    topology: Topology,
    /// 显式配置，优先于配置文件
    config: Option<ManagerConfig>,
    /// 配置文件路径
    config_file: Option<PathBuf>,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: LoggingConfig,
}

impl ManagerRuntimeBuilder {
    /// 创建构建器，默认拓扑为独立模式
    pub fn new() -> Self {
        Self {
            topology: Topology::Standalone {
                process: DEFAULT_PROCESS_NAME.to_string(),
            },
            config: None,
            config_file: None,
            logging_enabled: false, // 默认不初始化日志，避免测试中重复初始化
            logging_config: LoggingConfig::default(),
        }
    }

    /// 独立模式：GCM 与 LCM 在同一进程内
    pub fn standalone(mut self, process: impl Into<String>) -> Self {
        self.topology = Topology::Standalone {
            process: process.into(),
        };
        self
    }

    /// 联网模式服务端：运行 GCM 并监听 LCM
    pub fn networked_server(mut self) -> Self {
        self.topology = Topology::NetworkedServer;
        self
    }

    /// 联网模式客户端：本进程 LCM 通过 TCP 访问 GCM
    ///
    /// `address` 为空时使用配置中的监听地址。
    pub fn networked_client(mut self, process: impl Into<String>, address: Option<String>) -> Self {
        self.topology = Topology::NetworkedClient {
            process: process.into(),
            address,
        };
        self
    }

    /// 使用显式配置
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从配置文件加载（叠加环境变量）
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = config;
        self.logging_enabled = true;
        self
    }

    /// 构建运行时
    pub async fn build(self) -> ManagerResult<ManagerRuntime> {
        if self.logging_enabled {
            self.logging_config.init()?;
        }
        info!("开始构建组件管理器运行时: {}", self.topology);

        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => ManagerConfig::load(self.config_file.as_deref())?,
        };

        let runtime = ManagerRuntime::assemble(self.topology, config).await?;
        info!("组件管理器运行时构建完成");
        Ok(runtime)
    }
}

impl Default for ManagerRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别（设置了 `RUST_LOG` 时以环境变量为准）
    pub level: tracing::Level,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 设置日志级别
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// 按名称设置日志级别（trace/debug/info/warn/error）
    pub fn with_level_name(self, level: &str) -> ManagerResult<Self> {
        let level = level
            .parse::<tracing::Level>()
            .map_err(|_| ManagerError::config(format!("无效的日志级别: {level}")))?;
        Ok(self.with_level(level))
    }

    /// 初始化全局日志订阅者
    ///
    /// 已经初始化过时返回错误，调用方可以忽略。
    pub fn init(&self) -> ManagerResult<()> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_file)
            .with_line_number(self.show_line_number);

        if self.json_format {
            subscriber.json().try_init()
        } else {
            subscriber.try_init()
        }
        .map_err(|e| ManagerError::config(format!("日志初始化失败: {e}")))?;

        info!("日志系统初始化完成");
        Ok(())
    }
}
