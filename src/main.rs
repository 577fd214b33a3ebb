use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use proc_util_monitor::{Config, ShutdownFlag, StatusMonitor, install_interrupt_handler};

/// 终端资源占用监控
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 统计流量的网络接口 (默认: enp0s1)
    #[arg(short, long, default_value = "enp0s1")]
    interface: String,

    /// 统计 I/O 的块设备 (默认: sda)
    #[arg(short, long, default_value = "sda")]
    disk: String,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    init_logger(&args.log_level);

    let shutdown = ShutdownFlag::new();
    install_interrupt_handler(&shutdown).context("无法安装中断信号处理器")?;

    let config = Config {
        interface: args.interface,
        disk_device: args.disk,
        ..Config::default()
    };

    info!(
        "配置信息 - 网络接口: {}, 磁盘设备: {}",
        config.interface, config.disk_device
    );

    let mut monitor = StatusMonitor::new(config);
    monitor
        .run(&shutdown, &mut std::io::stdout())
        .await
        .context("轮询异常终止")?;

    Ok(())
}

/// 初始化日志系统，日志输出到 stderr，不干扰 stdout 上的状态行
fn init_logger(level: &str) {
    match env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .try_init()
    {
        Ok(_) => info!("日志系统初始化成功，级别: {level}"),
        Err(e) => eprintln!("日志系统初始化失败: {e}"),
    }
}
