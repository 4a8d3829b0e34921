//! 启动配置

/// 启动时确定的内核规模参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// 核数
    pub cpu_count: usize,
    /// 每核 IPI 收件箱容量
    pub ipi_inbox_capacity: usize,
    /// 每个进程的文件表大小
    pub file_table_size: usize,
    /// 交给帧分配器管理的物理内存起始地址
    pub phys_start: usize,
    /// 交给帧分配器管理的物理内存结束地址（不含）
    pub phys_end: usize,
    /// 日志级别上限
    pub log_level: ::log::LevelFilter,
}

/// 默认核数
pub const DEFAULT_CPU_COUNT: usize = 4;
/// 默认物理内存起点（DRAM 基址之上预留 2 MiB 给内核镜像）
pub const DEFAULT_PHYS_START: usize = 0x8020_0000;
/// 默认物理内存终点（128 MiB DRAM）
pub const DEFAULT_PHYS_END: usize = 0x8800_0000;

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            cpu_count: DEFAULT_CPU_COUNT,
            ipi_inbox_capacity: task::DEFAULT_IPI_CAPACITY,
            file_table_size: vfs::DEFAULT_FILE_TABLE_SIZE,
            phys_start: DEFAULT_PHYS_START,
            phys_end: DEFAULT_PHYS_END,
            log_level: ::log::LevelFilter::Info,
        }
    }
}
