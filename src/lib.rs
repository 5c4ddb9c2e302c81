//! # zhen (帧)
//!
//! 纯 Rust 实现的 H.264 / H.265 帧组装器与参数集解析器, 位于硬件解码器之前.
//!
//! # 快速开始
//!
//! ```rust
//! use zhen::codec::{Chunk, ChunkFlags, CodecFamily, ConstructorState, create_constructor};
//!
//! let mut fc = create_constructor(CodecFamily::Hevc, Default::default());
//! let data = [0x00, 0x00, 0x01, 0x26, 0x01, 0xAF];
//! let mut cycle = fc.load(Chunk::new(&data, 0, ChunkFlags::empty())).unwrap();
//! let len = cycle.assembled_buffer().map_or(0, |b| b.length());
//! cycle.consume(len).unwrap();
//! drop(cycle);
//! assert_eq!(fc.state(), ConstructorState::HeaderAwaiting);
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `zhen-core` | 错误类型、位读写、防竞争字节处理 |
//! | `zhen-codec` | 单元扫描、参数集解析、帧组装器 |

/// 核心类型与工具
pub use zhen_core as core;

/// 扫描、解析与帧组装
pub use zhen_codec as codec;

pub mod logging;

/// 获取 zhen 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
