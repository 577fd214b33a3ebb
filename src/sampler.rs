//! 各项资源的增量采样器
//!
//! 每个采样器只持有自己上一次的计数快照，调用之间保留，进程生命周期内不释放。
//! 各指标的失败表达方式不同：内存返回哨兵值 [`UNAVAILABLE`]，
//! CPU、网络、磁盘则静默以 0 代替缺失数据。

use crate::stats::{
    CpuTimes, DiskCounters, MemoryInfo, NetCounters, Result, StatsError, parse_cpu_times,
    parse_diskstats, parse_meminfo, parse_net_dev, read_source,
};
use log::debug;
use std::path::PathBuf;
use std::time::Instant;

/// 数据不可用时的哨兵值
pub const UNAVAILABLE: f64 = -1.0;

/// 一次轮询得到的四项利用率
#[derive(Debug, Clone, Copy)]
pub struct Utilization {
    pub cpu: f64,     // CPU 使用率 (%)
    pub memory: f64,  // 内存使用率 (%)，-1.0 表示不可用
    pub network: f64, // 距上次轮询的收发总量 (KB)
    pub disk: f64,    // 累计读写扇区数 / 2
    pub timestamp: Instant,
}

impl Default for Utilization {
    #[inline]
    fn default() -> Self {
        Self {
            cpu: 0.0,
            memory: 0.0,
            network: 0.0,
            disk: 0.0,
            timestamp: Instant::now(),
        }
    }
}

/// CPU 使用率采样器
#[derive(Debug, Default)]
pub struct CpuSampler {
    prev: CpuTimes,
}

impl CpuSampler {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 上一次成功采样的计数
    #[inline]
    pub fn baseline(&self) -> &CpuTimes {
        &self.prev
    }

    /// 从 /proc/stat 首行采样；行格式错误时返回 0，基线保持不变
    pub fn sample(&mut self, line: &str) -> f64 {
        match parse_cpu_times(line) {
            Ok(current) => match self.update(current) {
                Ok(usage) => usage,
                Err(e) => {
                    debug!("CPU 使用率退化为 0: {e}");
                    0.0
                }
            },
            Err(e) => {
                debug!("CPU 行解析失败: {e}");
                0.0
            }
        }
    }

    /// 使用率 = (1 - 空闲增量 / 总增量) * 100
    ///
    /// 首次调用时基线全为 0，结果是相对开机以来的平均值。计数回绕时可能得到
    /// 超出 0..=100 的值，不做截断。无论结果如何都会把基线更新为 `current`。
    pub fn update(&mut self, current: CpuTimes) -> Result<f64> {
        let total_diff = current.total as f64 - self.prev.total as f64;
        let idle_diff = current.idle() as f64 - self.prev.idle() as f64;
        self.prev = current;

        if total_diff == 0.0 {
            return Err(StatsError::DivisionDegenerate);
        }

        Ok((1.0 - idle_diff / total_diff) * 100.0)
    }
}

/// 内存使用率采样器，无状态
#[derive(Debug)]
pub struct MemorySampler {
    source: PathBuf,
}

impl MemorySampler {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// 读取并计算内存使用率；数据源不可读或缺少 MemTotal 时返回 [`UNAVAILABLE`]
    pub fn sample(&self) -> f64 {
        let info = match read_source(&self.source) {
            Ok(content) => parse_meminfo(&content),
            Err(e) => {
                debug!("内存数据源不可用: {e}");
                return UNAVAILABLE;
            }
        };

        Self::utilization(&info).unwrap_or_else(|e| {
            debug!("内存使用率不可用: {e}");
            UNAVAILABLE
        })
    }

    /// (总内存 - 空闲内存) / 总内存 * 100
    pub fn utilization(info: &MemoryInfo) -> Result<f64> {
        if info.total == 0 {
            return Err(StatsError::MissingRequiredField("MemTotal".to_string()));
        }
        Ok((info.total as f64 - info.free as f64) / info.total as f64 * 100.0)
    }
}

/// 网络流量采样器
#[derive(Debug)]
pub struct NetworkSampler {
    source: PathBuf,
    interface: String,
    prev: NetCounters,
}

impl NetworkSampler {
    pub fn new(source: impl Into<PathBuf>, interface: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            interface: interface.into(),
            prev: NetCounters::default(),
        }
    }

    #[inline]
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// 读取并计算距上次调用的收发总量 (KB)；数据源不可读时按全 0 计数处理
    pub fn sample(&mut self) -> f64 {
        let current = match read_source(&self.source) {
            Ok(content) => parse_net_dev(&content, &self.interface),
            Err(e) => {
                debug!("网络数据源不可用: {e}");
                NetCounters::default()
            }
        };
        self.update(current)
    }

    /// 计数减小 (接口重置或记录缺失) 时结果为负，不做修正
    pub fn update(&mut self, current: NetCounters) -> f64 {
        let rx_diff = current.rx_bytes as f64 - self.prev.rx_bytes as f64;
        let tx_diff = current.tx_bytes as f64 - self.prev.tx_bytes as f64;
        self.prev = current;
        (rx_diff + tx_diff) / 1024.0
    }
}

/// 磁盘 I/O 采样器
///
/// 与网络不同，这里不计算增量：每次报告累计读写扇区数之和的一半。
#[derive(Debug)]
pub struct DiskSampler {
    source: PathBuf,
    device: String,
}

impl DiskSampler {
    pub fn new(source: impl Into<PathBuf>, device: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            device: device.into(),
        }
    }

    #[inline]
    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn sample(&self) -> f64 {
        let counters = match read_source(&self.source) {
            Ok(content) => parse_diskstats(&content, &self.device),
            Err(e) => {
                debug!("磁盘数据源不可用: {e}");
                DiskCounters::default()
            }
        };
        Self::activity(&counters)
    }

    #[inline]
    pub fn activity(counters: &DiskCounters) -> f64 {
        (counters.read_sectors as f64 + counters.write_sectors as f64) / 2.0
    }
}

/// 四个采样器的集合，每项指标各自持有唯一的保留状态
#[derive(Debug)]
pub struct Samplers {
    pub cpu: CpuSampler,
    pub memory: MemorySampler,
    pub network: NetworkSampler,
    pub disk: DiskSampler,
}

impl Samplers {
    /// 依次调用四个采样器
    pub fn sample_all(&mut self, cpu_line: &str) -> Utilization {
        Utilization {
            cpu: self.cpu.sample(cpu_line),
            memory: self.memory.sample(),
            network: self.network.sample(),
            disk: self.disk.sample(),
            timestamp: Instant::now(),
        }
    }
}
