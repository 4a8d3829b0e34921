//! 用户态互斥量（futex 风格）系统调用的返回约定
//!
//! wait/wake 调用都以用户互斥量字的虚拟地址为参数；
//! 非负返回值区分“立即返回 / 值已写入”与“已挂起”，负返回值为 `-errno`。

/// wait：互斥量字已不等于期望值，未挂起直接返回
pub const UMUTEX_WOKE_IMMEDIATELY: isize = 0;
/// wait：调用者已挂入等待队列
pub const UMUTEX_PARKED: isize = 1;
/// wake：没有等待者，值已直接写回用户内存
pub const UMUTEX_WRITTEN: isize = 0;
