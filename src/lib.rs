//! 终端资源占用监控库
//!
//! 周期性读取内核伪文件中的累计计数，换算为 CPU、内存、网络、磁盘的单行利用率摘要。

pub mod monitor;
pub mod sampler;
pub mod stats;

// 重新导出主要的公共类型
pub use monitor::{Config, PollState, ShutdownFlag, StatusMonitor, install_interrupt_handler};
pub use sampler::{Samplers, UNAVAILABLE, Utilization};
pub use stats::{StatsError, parse_cpu_times};
