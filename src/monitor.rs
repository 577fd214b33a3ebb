use crate::sampler::{CpuSampler, DiskSampler, MemorySampler, NetworkSampler, Samplers, Utilization};
use crate::stats::open_source;
use anyhow::Result;
use log::{debug, error, info};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// 固定的轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 内核伪文件路径
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub stat: PathBuf,
    pub meminfo: PathBuf,
    pub net_dev: PathBuf,
    pub diskstats: PathBuf,
}

impl Default for SourcePaths {
    fn default() -> Self {
        Self {
            stat: PathBuf::from("/proc/stat"),
            meminfo: PathBuf::from("/proc/meminfo"),
            net_dev: PathBuf::from("/proc/net/dev"),
            diskstats: PathBuf::from("/proc/diskstats"),
        }
    }
}

/// 监控配置
#[derive(Debug, Clone)]
pub struct Config {
    pub interface: String,
    pub disk_device: String,
    pub sources: SourcePaths,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: "enp0s1".to_string(),
            disk_device: "sda".to_string(),
            sources: SourcePaths::default(),
        }
    }
}

/// 轮询循环的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Running,
    Stopping,
}

/// 停止标志，只由信号处理任务写入，只由轮询循环读取
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn state(&self) -> PollState {
        if self.0.load(Ordering::SeqCst) {
            PollState::Stopping
        } else {
            PollState::Running
        }
    }
}

/// 安装 SIGINT 处理：收到信号后只置位停止标志
///
/// 必须在 tokio 运行时内调用。注册失败时返回错误，由调用方终止进程。
#[cfg(unix)]
pub fn install_interrupt_handler(flag: &ShutdownFlag) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let flag = flag.clone();
    tokio::spawn(async move {
        if interrupt.recv().await.is_some() {
            flag.request_stop();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn install_interrupt_handler(flag: &ShutdownFlag) -> std::io::Result<()> {
    let flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.request_stop();
        }
    });
    Ok(())
}

/// 渲染单行状态，行首回车使其原地覆盖
pub fn render_status_line(u: &Utilization) -> String {
    format!(
        "\rCPU Utilization: {:5.1}%, Memory Utilization: {:5.1}%, Network Utilization: {:5.1} KB, I/O Utilization: {:7.1}      ",
        u.cpu, u.memory, u.network, u.disk
    )
}

/// 资源监控轮询器
pub struct StatusMonitor {
    stat_path: PathBuf,
    samplers: Samplers,
    last: Option<Utilization>,
}

impl StatusMonitor {
    /// 创建监控实例，所有采样器的保留状态在此初始化为 0
    pub fn new(config: Config) -> Self {
        let Config {
            interface,
            disk_device,
            sources,
        } = config;

        Self {
            stat_path: sources.stat,
            samplers: Samplers {
                cpu: CpuSampler::new(),
                memory: MemorySampler::new(sources.meminfo),
                network: NetworkSampler::new(sources.net_dev, interface),
                disk: DiskSampler::new(sources.diskstats, disk_device),
            },
            last: None,
        }
    }

    /// 最近一次输出的采样结果
    #[inline]
    pub fn last_sample(&self) -> Option<&Utilization> {
        self.last.as_ref()
    }

    /// 运行轮询循环直到停止标志被置位，返回已完成的轮询次数
    ///
    /// 停止标志只在每次迭代开始时检查，正在进行的睡眠会先完成。
    /// CPU 数据源无法打开是唯一的致命错误，不重试。
    pub async fn run<W: Write>(&mut self, shutdown: &ShutdownFlag, out: &mut W) -> Result<u64> {
        info!(
            "开始轮询，间隔 {} 毫秒，网络接口: {}，磁盘设备: {}",
            POLL_INTERVAL.as_millis(),
            self.samplers.network.interface(),
            self.samplers.disk.device()
        );

        let mut ticks = 0u64;
        while shutdown.state() == PollState::Running {
            let mut source = open_source(&self.stat_path).map_err(|e| {
                error!("无法打开 CPU 数据源: {e}");
                e
            })?;

            let mut line = String::new();
            match source.read_line(&mut line) {
                Ok(n) if n > 0 => {
                    let utilization = self.samplers.sample_all(&line);
                    write!(out, "{}", render_status_line(&utilization))?;
                    out.flush()?;
                    self.last = Some(utilization);
                }
                Ok(_) => debug!("CPU 数据源为空，跳过本次输出"),
                Err(e) => debug!("读取 CPU 数据源失败: {e}，跳过本次输出"),
            }

            tokio::time::sleep(POLL_INTERVAL).await;
            drop(source);
            ticks += 1;
        }

        writeln!(out, "\nDone!   ")?;
        out.flush()?;
        match &self.last {
            Some(u) => info!(
                "收到中断信号，共轮询 {ticks} 次，最后一次采样于 {:?} 前，正常退出",
                u.timestamp.elapsed()
            ),
            None => info!("收到中断信号，共轮询 {ticks} 次，正常退出"),
        }

        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::StatsError;
    use std::fs;
    use std::path::Path;
    use std::time::Instant;

    fn write_sources(dir: &Path) -> SourcePaths {
        let sources = SourcePaths {
            stat: dir.join("stat"),
            meminfo: dir.join("meminfo"),
            net_dev: dir.join("net_dev"),
            diskstats: dir.join("diskstats"),
        };
        fs::write(&sources.stat, "cpu  10 0 10 80 0 0 0 0 0 0\ncpu0 10 0 10 80 0 0 0\n").unwrap();
        fs::write(&sources.meminfo, "MemTotal: 1000 kB\nMemFree: 400 kB\n").unwrap();
        fs::write(
            &sources.net_dev,
            "enp0s1: 1 2 3 4 5 6 7 8 2048 10 11 12 13 14 15 16 0\n",
        )
        .unwrap();
        fs::write(&sources.diskstats, "   8       0 sda 10 0 100 5 20 0 50 7 0 0 0\n").unwrap();
        sources
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            sources: write_sources(dir),
            ..Config::default()
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.interface, "enp0s1");
        assert_eq!(config.disk_device, "sda");
        assert_eq!(config.sources.stat, PathBuf::from("/proc/stat"));
        assert_eq!(config.sources.diskstats, PathBuf::from("/proc/diskstats"));
    }

    #[test]
    fn test_shutdown_flag_states() {
        let flag = ShutdownFlag::new();
        assert_eq!(flag.state(), PollState::Running);

        let handler_side = flag.clone();
        handler_side.request_stop();
        assert_eq!(flag.state(), PollState::Stopping);
    }

    #[test]
    fn test_render_status_line() {
        let u = Utilization {
            cpu: 25.0,
            memory: 60.0,
            network: 2.0,
            disk: 75.0,
            ..Utilization::default()
        };
        assert_eq!(
            render_status_line(&u),
            "\rCPU Utilization:  25.0%, Memory Utilization:  60.0%, Network Utilization:   2.0 KB, I/O Utilization:    75.0      "
        );
    }

    #[test]
    fn test_render_status_line_sentinel() {
        let u = Utilization {
            memory: -1.0,
            ..Utilization::default()
        };
        assert!(render_status_line(&u).contains("Memory Utilization:  -1.0%"));
    }

    #[test]
    fn test_run_stops_immediately_when_flag_set() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = StatusMonitor::new(test_config(dir.path()));
        let flag = ShutdownFlag::new();
        flag.request_stop();

        let mut out = Vec::new();
        let ticks = tokio_test::block_on(monitor.run(&flag, &mut out)).unwrap();
        assert_eq!(ticks, 0);
        assert_eq!(String::from_utf8(out).unwrap(), "\nDone!   \n");
    }

    #[tokio::test]
    async fn test_run_finishes_in_flight_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = StatusMonitor::new(test_config(dir.path()));
        let flag = ShutdownFlag::new();
        let mut out = Vec::new();

        let stopper = flag.clone();
        let stop_soon = async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stopper.request_stop();
        };

        let before = Instant::now();
        let (ticks, ()) = tokio::join!(monitor.run(&flag, &mut out), stop_soon);
        assert_eq!(ticks.unwrap(), 1);

        let last = monitor.last_sample().unwrap();
        assert!(last.timestamp >= before);
        assert!((last.cpu - 20.0).abs() < 1e-9);
        assert!((last.memory - 60.0).abs() < 1e-9);

        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("\rCPU Utilization:  20.0%, Memory Utilization:  60.0%"));
        assert!(output.contains("Network Utilization:   2.0 KB"));
        assert!(output.contains("I/O Utilization:    75.0"));
        assert!(output.ends_with("\nDone!   \n"));
    }

    #[test]
    fn test_run_fails_when_cpu_source_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.sources.stat = dir.path().join("missing");
        let mut monitor = StatusMonitor::new(config);

        let mut out = Vec::new();
        let err = tokio_test::block_on(monitor.run(&ShutdownFlag::new(), &mut out)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StatsError>(),
            Some(StatsError::SourceUnavailable { .. })
        ));
        assert!(out.is_empty());
    }

    #[test]
    fn test_run_skips_output_on_empty_cpu_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        fs::write(&config.sources.stat, "").unwrap();
        let mut monitor = StatusMonitor::new(config);
        let flag = ShutdownFlag::new();

        let mut out = Vec::new();
        let stopper = flag.clone();
        let ticks = tokio_test::block_on(async {
            let (ticks, ()) = tokio::join!(monitor.run(&flag, &mut out), async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                stopper.request_stop();
            });
            ticks
        })
        .unwrap();

        assert_eq!(ticks, 1);
        assert_eq!(String::from_utf8(out).unwrap(), "\nDone!   \n");
        assert!(monitor.last_sample().is_none());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_install_interrupt_handler() {
        let flag = ShutdownFlag::new();
        assert!(install_interrupt_handler(&flag).is_ok());
        assert_eq!(flag.state(), PollState::Running);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_sigint_stops_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut monitor = StatusMonitor::new(test_config(dir.path()));
        let flag = ShutdownFlag::new();
        install_interrupt_handler(&flag).unwrap();

        let mut out = Vec::new();
        let pid = std::process::id().to_string();
        let interrupt_later = async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            let status = tokio::process::Command::new("kill")
                .args(["-INT", &pid])
                .status()
                .await
                .unwrap();
            assert!(status.success());
        };

        let (ticks, ()) = tokio::join!(monitor.run(&flag, &mut out), interrupt_later);
        let ticks = ticks.unwrap();
        assert!(ticks >= 1);
        assert_eq!(flag.state(), PollState::Stopping);

        let output = String::from_utf8(out).unwrap();
        assert!(output.starts_with("\rCPU Utilization:"));
        assert!(output.ends_with("\nDone!   \n"));
    }
}
