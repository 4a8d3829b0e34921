//! 路径解析引擎
//!
//! 该模块实现了 VFS 的路径解析功能，负责将路径字符串转换为 [`Tnode`]。
//!
//! 支持的典型语义：
//!
//! - 绝对路径以 `/` 开头，从根目录开始解析；相对路径从“当前工作目录”开始解析
//! - `.` 表示当前目录，解析时跳过；`..` 表示父目录（不允许越过根）
//! - 经过挂载点时透明地进入被挂载的文件系统，`..` 也会从文件系统根回到挂载点所在目录

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::{FsError, FsResult, Tnode};

/// 单个路径组件的最大长度
pub const NAME_MAX: usize = 255;

/// 路径组件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathComponent {
    /// 根目录 "/"
    Root,
    /// 当前目录 "."
    Current,
    /// 父目录 ".."
    Parent,
    /// 正常的文件名
    Normal(String),
}

/// 将路径字符串解析为组件列表
pub fn parse_path(path: &str) -> Vec<PathComponent> {
    let mut components = Vec::new();

    // 绝对路径以 Root 开始
    if path.starts_with('/') {
        components.push(PathComponent::Root);
    }

    // 分割路径并解析每个部分
    for part in path.split('/').filter(|s| !s.is_empty()) {
        let component = match part {
            "." => PathComponent::Current,
            ".." => PathComponent::Parent,
            name => PathComponent::Normal(String::from(name)),
        };
        components.push(component);
    }

    components
}

/// 规范化路径（处理 ".." 和 "."）
pub fn normalize_path(path: &str) -> String {
    let components = parse_path(path);
    let mut stack: Vec<String> = Vec::new();
    let mut is_absolute = false;

    for component in components {
        match component {
            PathComponent::Root => {
                is_absolute = true;
            }
            PathComponent::Current => {
                // "." 不做任何操作
            }
            PathComponent::Parent => {
                if is_absolute {
                    // 绝对路径：不能越过根目录
                    if !stack.is_empty() {
                        stack.pop();
                    }
                } else {
                    // 相对路径：
                    if let Some(last) = stack.last() {
                        if last == ".." {
                            stack.push(String::from(".."));
                        } else {
                            stack.pop();
                        }
                    } else {
                        stack.push(String::from(".."));
                    }
                }
            }
            PathComponent::Normal(name) => {
                stack.push(name);
            }
        }
    }

    // 构造结果
    if stack.is_empty() {
        if is_absolute {
            String::from("/")
        } else {
            String::from(".")
        }
    } else if is_absolute {
        String::from("/") + &stack.join("/")
    } else {
        stack.join("/")
    }
}

/// 将路径分割为目录部分和文件名部分
pub fn split_path(path: &str) -> Result<(String, String), FsError> {
    // 如果路径以斜杠结尾，说明是目录而非文件，返回错误
    if path.ends_with('/') && path.len() > 1 {
        return Err(FsError::InvalidArgument);
    }

    // 先规范化路径
    let normalized = normalize_path(path);

    if let Some(pos) = normalized.rfind('/') {
        let dir = if pos == 0 {
            String::from("/")
        } else {
            String::from(&normalized[..pos])
        };
        let filename = String::from(&normalized[pos + 1..]);

        if filename.is_empty() {
            return Err(FsError::InvalidArgument);
        }

        Ok((dir, filename))
    } else {
        // 相对路径，使用当前目录
        Ok((String::from("."), normalized))
    }
}

/// 解析路径
///
/// 绝对路径从 `root` 开始，相对路径从 `cwd` 开始，逐个组件查找。
/// 名字不存在返回 `NotFound`；中间组件不是目录返回 `NotDirectory`。
pub fn resolve(root: &Arc<Tnode>, cwd: &Arc<Tnode>, path: &str) -> FsResult<Arc<Tnode>> {
    let root = root.follow_mounts();
    let mut cur = cwd.follow_mounts();

    for component in parse_path(path) {
        match component {
            PathComponent::Root => cur = root.clone(),
            PathComponent::Current => {}
            PathComponent::Parent => {
                if Arc::ptr_eq(&cur, &root) {
                    continue;
                }
                if let Some(parent) = cur.parent_across_mounts() {
                    cur = parent.follow_mounts();
                }
            }
            PathComponent::Normal(name) => {
                if name.len() > NAME_MAX {
                    return Err(FsError::NameTooLong);
                }
                if !cur.inode().is_dir() {
                    return Err(FsError::NotDirectory);
                }
                cur = cur.lookup(&name)?.follow_mounts();
            }
        }
    }

    Ok(cur)
}

/// 解析路径的父目录，返回父目录 tnode 和最后一个组件名
pub fn resolve_parent(
    root: &Arc<Tnode>,
    cwd: &Arc<Tnode>,
    path: &str,
) -> FsResult<(Arc<Tnode>, String)> {
    let (dir, name) = split_path(path)?;
    if name == "." || name == ".." {
        return Err(FsError::InvalidArgument);
    }
    let parent = resolve(root, cwd, &dir)?;
    if !parent.inode().is_dir() {
        return Err(FsError::NotDirectory);
    }
    Ok((parent, name))
}
