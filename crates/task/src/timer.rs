//! 进程定时器与时钟
//!
//! 时间以 tick 为单位。定时器到期由 [`Timers::expire`] 在时钟推进时统一检查；
//! 周期定时器到期后按周期重新装填。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::{TaskError, TaskResult};

/// 定时器编号（进程内唯一）
pub type TimerId = usize;

/// 定时器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// 到期一次后删除
    OneShot,
    /// 到期后以给定周期重新装填
    Periodic(u64),
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: u64,
    kind: TimerKind,
}

/// 一个进程的全部定时器
#[derive(Debug)]
pub struct Timers {
    next_id: TimerId,
    timers: BTreeMap<TimerId, Timer>,
}

impl Timers {
    /// 创建空的定时器集合
    pub const fn new() -> Self {
        Self {
            next_id: 1,
            timers: BTreeMap::new(),
        }
    }

    /// 添加定时器，返回其编号
    pub fn add_timer(&mut self, deadline: u64, kind: TimerKind) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.timers.insert(id, Timer { deadline, kind });
        id
    }

    /// 取消定时器
    pub fn cancel_timer(&mut self, id: TimerId) -> TaskResult<()> {
        self.timers
            .remove(&id)
            .map(|_| ())
            .ok_or(TaskError::NotFound)
    }

    /// 收集在 `now` 之前（含）到期的定时器
    pub fn expire(&mut self, now: u64) -> Vec<TimerId> {
        let mut fired = Vec::new();
        self.timers.retain(|&id, timer| {
            if timer.deadline > now {
                return true;
            }
            fired.push(id);
            match timer.kind {
                TimerKind::OneShot => false,
                TimerKind::Periodic(period) => {
                    let period = period.max(1);
                    let missed = (now - timer.deadline) / period + 1;
                    timer.deadline += missed * period;
                    true
                }
            }
        });
        fired
    }

    /// 取消全部定时器，返回取消的个数
    pub fn cancel_all(&mut self) -> usize {
        let n = self.timers.len();
        self.timers.clear();
        n
    }

    /// 活跃定时器个数
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// 是否没有活跃定时器
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程时钟：累计该进程消耗的 tick
#[derive(Debug, Default)]
pub struct Clock {
    ticks: u64,
}

impl Clock {
    /// 创建归零的时钟
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    /// 推进 `n` 个 tick，返回推进后的值
    pub fn tick(&mut self, n: u64) -> u64 {
        self.ticks = self.ticks.saturating_add(n);
        self.ticks
    }

    /// 累计的 tick
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
