use log::debug;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// /proc/stat 中 CPU 行的计数字段数 (user nice system idle iowait irq softirq)
pub const CPU_FIELDS: usize = 7;

/// 空闲时间在 CPU 计数向量中的下标
pub const CPU_IDLE_INDEX: usize = 3;

/// /proc/net/dev 记录中接收字节数所在的空白分隔字段下标
pub const NET_RX_BYTES_FIELD: usize = 9;
/// /proc/net/dev 记录中发送字节数所在的空白分隔字段下标
pub const NET_TX_BYTES_FIELD: usize = 17;

/// /proc/diskstats 记录中设备名所在字段下标 (major minor name ...)
pub const DISK_NAME_FIELD: usize = 2;
/// /proc/diskstats 记录中读扇区数所在字段下标
pub const DISK_READ_SECTORS_FIELD: usize = 5;
/// /proc/diskstats 记录中写扇区数所在字段下标
pub const DISK_WRITE_SECTORS_FIELD: usize = 9;

/// CPU 时间统计，来自 /proc/stat 首行
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub ticks: [u64; CPU_FIELDS],
    pub total: u64,
}

impl CpuTimes {
    /// 由 7 个累计计数构造，同时计算总和
    pub fn from_ticks(ticks: [u64; CPU_FIELDS]) -> Self {
        let total = ticks.iter().fold(0u64, |sum, &t| sum.saturating_add(t));
        Self { ticks, total }
    }

    #[inline]
    pub fn idle(&self) -> u64 {
        self.ticks[CPU_IDLE_INDEX]
    }
}

/// 内存信息 (kB)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub total: u64,
    pub free: u64,
    /// 读取但不参与计算
    pub active: u64,
}

/// 单个网络接口的累计字节计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NetCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// 单个块设备的累计扇区计数
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskCounters {
    pub read_sectors: u64,
    pub write_sectors: u64,
}

/// 系统资源获取错误类型
#[derive(Debug)]
pub enum StatsError {
    /// 伪文件无法打开或读取
    SourceUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// 缺少必需字段或字段格式错误
    MissingRequiredField(String),
    /// CPU 公式的分母增量为 0
    DivisionDegenerate,
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::SourceUnavailable { path, source } => {
                write!(f, "数据源不可用 {}: {source}", path.display())
            }
            StatsError::MissingRequiredField(s) => write!(f, "缺少必需字段: {s}"),
            StatsError::DivisionDegenerate => write!(f, "CPU 总时间增量为 0"),
        }
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatsError::SourceUnavailable { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StatsError>;

fn unavailable(path: &Path, source: std::io::Error) -> StatsError {
    StatsError::SourceUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// 打开数据源，返回的句柄由调用方决定何时释放
pub fn open_source(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| unavailable(path, e))
}

/// 一次性读取整个数据源，不保留文件句柄
#[inline]
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| unavailable(path, e))
}

/// 解析 CPU 时间统计
///
/// 输入为 /proc/stat 的一行：首个空格之后必须能依次解析出 7 个无符号整数，
/// 多余字段 (steal, guest, guest_nice) 忽略。
pub fn parse_cpu_times(line: &str) -> Result<CpuTimes> {
    let (_, rest) = line
        .split_once(' ')
        .ok_or_else(|| StatsError::MissingRequiredField("CPU 行缺少标签分隔符".to_string()))?;

    let mut ticks = [0u64; CPU_FIELDS];
    let mut parts = rest.split_whitespace();
    for (i, slot) in ticks.iter_mut().enumerate() {
        *slot = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StatsError::MissingRequiredField(format!("CPU 字段 {i}")))?;
    }

    Ok(CpuTimes::from_ticks(ticks))
}

/// 解析 /proc/meminfo
///
/// 按子串匹配 `MemTotal`、`MemFree`、`Active`，数值取第二个空白分隔字段。
/// 无法解析的值保持原值不变。
pub fn parse_meminfo(content: &str) -> MemoryInfo {
    let mut info = MemoryInfo::default();

    for line in content.lines() {
        let slot = if line.contains("MemTotal") {
            &mut info.total
        } else if line.contains("MemFree") {
            &mut info.free
        } else if line.contains("Active") {
            &mut info.active
        } else {
            continue;
        };

        if let Some(value) = line.split_whitespace().nth(1).and_then(|v| v.parse().ok()) {
            *slot = value;
        }
    }

    info
}

/// 按设备名选择记录：名称字段完全相同者优先，否则取最后一个包含该子串的行
fn select_record<'a>(content: &'a str, filter: &str, name_field: usize) -> Option<&'a str> {
    let mut candidate = None;
    for line in content.lines() {
        if !line.contains(filter) {
            continue;
        }
        let name = line
            .split_whitespace()
            .nth(name_field)
            .map(|n| n.trim_end_matches(':'));
        if name == Some(filter) {
            return Some(line);
        }
        candidate = Some(line);
    }
    candidate
}

#[inline]
fn field(record: &str, index: usize) -> u64 {
    record
        .split_whitespace()
        .nth(index)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// 解析 /proc/net/dev 中指定接口的收发字节数，记录缺失时全部为 0
pub fn parse_net_dev(content: &str, interface: &str) -> NetCounters {
    match select_record(content, interface, 0) {
        Some(record) => NetCounters {
            rx_bytes: field(record, NET_RX_BYTES_FIELD),
            tx_bytes: field(record, NET_TX_BYTES_FIELD),
        },
        None => {
            debug!("/proc/net/dev 中未找到接口 {interface}");
            NetCounters::default()
        }
    }
}

/// 解析 /proc/diskstats 中指定设备的读写扇区数，记录缺失时全部为 0
pub fn parse_diskstats(content: &str, device: &str) -> DiskCounters {
    match select_record(content, device, DISK_NAME_FIELD) {
        Some(record) => DiskCounters {
            read_sectors: field(record, DISK_READ_SECTORS_FIELD),
            write_sectors: field(record, DISK_WRITE_SECTORS_FIELD),
        },
        None => {
            debug!("/proc/diskstats 中未找到设备 {device}");
            DiskCounters::default()
        }
    }
}
