//! 内存对象
//!
//! 一个或多个区域共享的后备存储，以 `Arc` 计数。
//! 最后一个引用消失时，对象持有的帧随之归还。

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;

use sync::SpinLock;

use crate::address::{PAGE_SIZE, Ppn};
use crate::error::{MmError, MmResult};
use crate::file::MmFile;
use crate::frame_allocator::{FrameTracker, alloc_frame};

/// 内存对象的种类
#[derive(Clone)]
pub enum ObjectKind {
    /// 匿名内存：按页延迟分配，内容为零
    Anonymous,
    /// 文件后备：页在首次访问时从文件读入
    File {
        /// 后备文件
        file: Arc<dyn MmFile>,
        /// 对象第 0 页对应的文件字节偏移
        offset: usize,
    },
    /// 设备内存：固定的物理页区间，从不释放
    Device {
        /// 起始物理页号
        base: Ppn,
    },
}

impl fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Anonymous => f.write_str("Anonymous"),
            ObjectKind::File { offset, .. } => write!(f, "File(offset={:#x})", offset),
            ObjectKind::Device { base } => write!(f, "Device({:?})", base),
        }
    }
}

/// 引用计数的后备存储
pub struct MemoryObject {
    kind: ObjectKind,
    /// 对象大小（页）；`None` 表示匿名对象不设上限
    pages: Option<usize>,
    frames: SpinLock<BTreeMap<usize, FrameTracker>>,
}

impl MemoryObject {
    /// 匿名对象，大小随映射它的区域伸缩
    pub fn anonymous() -> Arc<Self> {
        Arc::new(Self {
            kind: ObjectKind::Anonymous,
            pages: None,
            frames: SpinLock::new(BTreeMap::new()),
        })
    }

    /// 文件后备对象
    pub fn file(file: Arc<dyn MmFile>, offset: usize, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            kind: ObjectKind::File { file, offset },
            pages: Some(pages),
            frames: SpinLock::new(BTreeMap::new()),
        })
    }

    /// 设备内存对象
    pub fn device(base: Ppn, pages: usize) -> Arc<Self> {
        Arc::new(Self {
            kind: ObjectKind::Device { base },
            pages: Some(pages),
            frames: SpinLock::new(BTreeMap::new()),
        })
    }

    /// 对象种类
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// 对象大小（页），匿名对象返回 None
    pub fn size_pages(&self) -> Option<usize> {
        self.pages
    }

    /// 已经驻留的页数
    pub fn resident_pages(&self) -> usize {
        match self.kind {
            ObjectKind::Device { .. } => self.pages.unwrap_or(0),
            _ => self.frames.lock().len(),
        }
    }

    /// 第 `index` 页对应的物理页号，必要时分配并填充
    pub fn page(&self, index: usize) -> MmResult<Ppn> {
        if self.pages.is_some_and(|pages| index >= pages) {
            return Err(MmError::InvalidAddress);
        }
        if let ObjectKind::Device { base } = self.kind {
            return Ok(base + index);
        }

        if let Some(frame) = self.frames.lock().get(&index) {
            return Ok(frame.ppn());
        }

        // 分配和读文件都在锁外进行
        let frame = alloc_frame().ok_or(MmError::OutOfMemory)?;
        if let ObjectKind::File { file, offset } = &self.kind {
            // SAFETY: 新帧尚未发布，本函数独占
            let buf = unsafe {
                core::slice::from_raw_parts_mut(frame.paddr().as_kernel_ptr::<u8>(), PAGE_SIZE)
            };
            file.read_at(offset + index * PAGE_SIZE, buf)?;
        }

        // 并发填充同一页时保留先插入的帧，新帧随 drop 归还
        let mut frames = self.frames.lock();
        Ok(frames.entry(index).or_insert(frame).ppn())
    }

    /// 丢弃 `index` 起的驻留页（区域收缩时使用），返回丢弃的页数
    pub fn discard_from(&self, index: usize) -> usize {
        if matches!(self.kind, ObjectKind::Device { .. }) {
            return 0;
        }
        let mut frames = self.frames.lock();
        let tail = frames.split_off(&index);
        drop(frames);
        tail.len()
    }
}

impl fmt::Debug for MemoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryObject")
            .field("kind", &self.kind)
            .field("pages", &self.pages)
            .finish()
    }
}
