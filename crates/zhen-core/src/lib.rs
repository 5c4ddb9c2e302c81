//! # zhen-core
//!
//! zhen 帧组装器核心库, 提供错误类型、位流读写器和通用数值类型.
//!
//! 上层的参数集解析器与帧组装器都构建在本 crate 的位游标之上.

pub mod bitreader;
pub mod bitwriter;
pub mod emulation;
pub mod error;
pub mod rational;

// 重导出常用类型
pub use bitreader::BitCursor;
pub use bitwriter::BitWriter;
pub use error::{ZhenError, ZhenResult};
pub use rational::Rational;
