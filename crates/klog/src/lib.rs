//! 内核日志子系统
//!
//! 日志写入定长环形缓冲区，严重级别的日志同时立即打印到控制台。
//! 本 crate 同时作为 [`log`] crate 的后端：其余内核 crate 只使用
//! `log::info!` 等宏，启动时由 os 调用 [`init`] 完成接管。
//!
//! # 组件
//!
//! - [`LogLevel`] - 日志级别（从 Emergency 到 Debug）
//! - [`LogEntry`] - 定长日志条目
//! - `LogCore` - 缓冲区与过滤阈值
//! - [`KernelLogger`] - `log::Log` 实现
//!
//! # 架构解耦
//!
//! - **LogContextProvider**：提供 CPU ID、任务 ID、时间戳
//! - **LogOutput**：提供控制台输出能力
//!
//! 两者均为可选注册；未注册时上下文为 0，控制台输出被丢弃。

#![no_std]

extern crate alloc;

mod buffer;
mod config;
mod entry;
mod level;
mod log_core;

pub use config::{
    DEFAULT_CONSOLE_LEVEL, DEFAULT_LOG_LEVEL, GLOBAL_LOG_BUFFER_SIZE, MAX_LOG_MESSAGE_LENGTH,
};
pub use entry::LogEntry;
pub use level::LogLevel;
pub use log_core::{LogCore, format_log_entry};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 日志上下文提供者 trait
pub trait LogContextProvider: Send + Sync {
    /// 获取当前 CPU ID
    fn cpu_id(&self) -> usize;
    /// 获取当前任务 ID（如果没有任务则返回 0）
    fn task_id(&self) -> u32;
    /// 获取当前时间戳
    fn timestamp(&self) -> usize;
}

/// 日志输出 trait
pub trait LogOutput: Send + Sync {
    /// 输出字符串到控制台
    fn write_str(&self, s: &str);
}

static PROVIDER_DATA: AtomicUsize = AtomicUsize::new(0);
static PROVIDER_VTABLE: AtomicUsize = AtomicUsize::new(0);
static OUTPUT_DATA: AtomicUsize = AtomicUsize::new(0);
static OUTPUT_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册日志上下文提供者
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_context_provider(provider: &'static dyn LogContextProvider) {
    let ptr = provider as *const dyn LogContextProvider;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn LogContextProvider, (usize, usize)>(ptr) };
    PROVIDER_VTABLE.store(vtable, Ordering::Release);
    PROVIDER_DATA.store(data, Ordering::Release);
}

/// 注册日志输出
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_log_output(output: &'static dyn LogOutput) {
    let ptr = output as *const dyn LogOutput;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn LogOutput, (usize, usize)>(ptr) };
    OUTPUT_VTABLE.store(vtable, Ordering::Release);
    OUTPUT_DATA.store(data, Ordering::Release);
}

pub(crate) fn get_context_provider() -> Option<&'static dyn LogContextProvider> {
    let data = PROVIDER_DATA.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    let vtable = PROVIDER_VTABLE.load(Ordering::Acquire);
    // SAFETY: 由 register_context_provider 设置
    Some(unsafe {
        &*core::mem::transmute::<(usize, usize), *const dyn LogContextProvider>((data, vtable))
    })
}

pub(crate) fn get_log_output() -> Option<&'static dyn LogOutput> {
    let data = OUTPUT_DATA.load(Ordering::Acquire);
    if data == 0 {
        return None;
    }
    let vtable = OUTPUT_VTABLE.load(Ordering::Acquire);
    // SAFETY: 由 register_log_output 设置
    Some(unsafe { &*core::mem::transmute::<(usize, usize), *const dyn LogOutput>((data, vtable)) })
}

/// 全局日志系统实例
static GLOBAL_LOG: LogCore = LogCore::default();

/// `log` crate 后端
///
/// `target` 作为消息前缀保留，便于区分子系统。
pub struct KernelLogger;

impl log::Log for KernelLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        GLOBAL_LOG.is_level_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record) {
        GLOBAL_LOG._log(
            record.level().into(),
            format_args!("{}: {}", record.target(), record.args()),
        );
    }

    fn flush(&self) {}
}

static KERNEL_LOGGER: KernelLogger = KernelLogger;

/// 把内核日志系统安装为 `log` 的全局后端
///
/// 重复调用返回 `log::SetLoggerError`。
pub fn init(max_level: log::LevelFilter) -> Result<(), log::SetLoggerError> {
    log::set_logger(&KERNEL_LOGGER)?;
    log::set_max_level(max_level);
    Ok(())
}

/// 从缓冲区读取下一个日志条目
pub fn read_log() -> Option<LogEntry> {
    GLOBAL_LOG._read_log()
}

/// 非破坏性读取：按索引 peek 日志条目，不移动读指针
pub fn peek_log(index: usize) -> Option<LogEntry> {
    GLOBAL_LOG._peek_log(index)
}

/// 获取当前可读取的起始索引
pub fn log_reader_index() -> usize {
    GLOBAL_LOG._log_reader_index()
}

/// 返回未读日志条目的数量
pub fn log_len() -> usize {
    GLOBAL_LOG._log_len()
}

/// 返回已丢弃日志的计数
pub fn log_dropped_count() -> usize {
    GLOBAL_LOG._log_dropped_count()
}

/// 设置全局日志级别阈值
pub fn set_global_level(level: LogLevel) {
    GLOBAL_LOG._set_global_level(level);
}

/// 获取当前全局日志级别
pub fn get_global_level() -> LogLevel {
    GLOBAL_LOG._get_global_level()
}

/// 设置控制台输出级别阈值
pub fn set_console_level(level: LogLevel) {
    GLOBAL_LOG._set_console_level(level);
}

/// 获取当前控制台输出级别
pub fn get_console_level() -> LogLevel {
    GLOBAL_LOG._get_console_level()
}
