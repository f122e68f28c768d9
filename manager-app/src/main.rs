//! # 组件管理器命令行
//!
//! - `gcm`：运行联网 GCM，直到收到 Ctrl-C
//! - `demo`：独立模式演示，进程内连接与跨进程连接各建立一次
//! - `config`：打印生效的配置

use anyhow::Context;
use clap::{Parser, Subcommand};
use local_manager::{Component, LocalManager};
use manager_common::{
    CommandDescription, CommandKind, ConnectionDescription, EventGeneratorDescription,
    EventHandlerDescription, EventKind, FunctionDescription, InterfaceProvidedDescription,
    InterfaceRequiredDescription, ManagerConfig,
};
use manager_composition::{LoggingConfig, ManagerRuntime};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "manager-app")]
#[command(about = "分布式组件连接管理")]
struct Args {
    /// 配置文件路径（toml / json / yaml）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// 日志级别
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 运行联网 GCM
    Gcm {
        /// 监听地址
        #[arg(long)]
        bind: Option<String>,
        /// 监听端口
        #[arg(long)]
        port: Option<u16>,
    },
    /// 独立模式演示
    Demo,
    /// 打印生效的配置
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = ManagerConfig::load(args.config.as_deref()).context("加载配置失败")?;
    let logging = LoggingConfig::default().with_level_name(&args.log_level)?;

    match args.command {
        Command::Gcm { bind, port } => {
            if let Some(bind) = bind {
                config.bind_address = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            run_gcm(config, logging).await
        }
        Command::Demo => run_demo(config, logging).await,
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_gcm(config: ManagerConfig, logging: LoggingConfig) -> anyhow::Result<()> {
    let runtime = ManagerRuntime::builder()
        .networked_server()
        .with_config(config)
        .with_logging(logging)
        .build()
        .await?;
    if let Some(address) = runtime.listen_addr() {
        info!("GCM 正在监听 {}，按 Ctrl-C 退出", address);
    }

    tokio::signal::ctrl_c().await?;
    info!("收到退出信号，正在关闭");

    runtime.shutdown().await?;
    println!("{}", serde_json::to_string_pretty(&runtime.metrics())?);
    Ok(())
}

fn sink(name: &str) -> Component {
    Component::new(name).with_interface_provided(
        InterfaceProvidedDescription::new("Provided")
            .with_command(
                CommandDescription::new("GetValue", CommandKind::Read)
                    .with_argument_prototype("double"),
            )
            .with_command(CommandDescription::new("Reset", CommandKind::Void))
            .with_event_generator(EventGeneratorDescription::new("Updated", EventKind::Write)),
    )
}

fn source(name: &str) -> Component {
    Component::new(name).with_interface_required(
        InterfaceRequiredDescription::new("Required")
            .with_function(FunctionDescription::new("GetValue", CommandKind::Read))
            .with_event_handler(EventHandlerDescription::new("Updated", EventKind::Write)),
    )
}

async fn run_demo(config: ManagerConfig, logging: LoggingConfig) -> anyhow::Result<()> {
    let runtime = ManagerRuntime::builder()
        .standalone("P1")
        .with_config(config.clone())
        .with_logging(logging)
        .build()
        .await?;
    let p1 = runtime.local_manager();

    p1.add_component(sink("Sink")).await?;
    p1.add_component(source("Source")).await?;
    let local_id = p1.connect("Source", "Required", "Sink", "Provided").await?;
    info!("进程内连接已建立: {}", local_id);

    // 同一个 GCM 下的第二个进程
    let p2 = LocalManager::create("P2", runtime.global().clone(), config).await?;
    p2.add_component(sink("RemoteSink")).await?;
    p1.add_component(source("Monitor")).await?;
    let description = ConnectionDescription::from_names(
        "P1",
        "Monitor",
        "Required",
        "P2",
        "RemoteSink",
        "Provided",
    );
    let remote_id = p1.connect_remote(&description).await?;
    info!("跨进程连接已建立: {}", remote_id);

    p1.create_all_and_wait(Duration::from_secs(1)).await?;
    p1.start_all_and_wait(Duration::from_secs(1)).await?;

    for descriptor in runtime.global().get_list_of_connections().await? {
        println!("{:>4}  {}", descriptor.id, descriptor.description);
    }
    println!("P1 组件: {:?}", p1.get_names_of_components());
    println!("P2 组件: {:?}", p2.get_names_of_components());

    p1.disconnect(remote_id).await?;
    p1.disconnect(local_id).await?;
    p1.kill_all_and_wait(Duration::from_secs(1)).await?;
    p2.cleanup().await?;
    runtime.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&runtime.metrics())?);
    Ok(())
}
