//! 测试支持 crate
//!
//! 提供 Mock 实现和测试工具。
//! 不依赖任何被测 crate；被测 crate 在 `cfg(test)` 下为这里的类型实现自己的 trait，
//! 或在集成测试中用本地包装类型委托过来。

#![no_std]

pub mod mock;
