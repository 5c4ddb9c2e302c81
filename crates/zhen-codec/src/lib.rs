//! # zhen-codec
//!
//! zhen 帧组装库, 位于硬件解码器之前.
//!
//! 上游按任意大小切分的压缩视频数据块经本 crate 重新组装成解码器可直接消费的访问单元,
//! 同时从参数集中解析出配置解码器所需的元数据 (分辨率、位深、profile/level、HDR 静态信息).
//!
//! ## 模块
//!
//! - [`parsers`]: H.264 / H.265 的 NAL 语法与参数集解析器
//! - [`scanner`]: Annex B 起始码扫描与单元分类
//! - [`buffer`]: 可增长缓冲区
//! - [`header_set`]: 按 ID 索引的参数集表
//! - [`constructor`]: 帧组装器 (透传 / AVC / HEVC) 及其工厂
//!
//! ## 使用示例
//!
//! ```rust
//! use zhen_codec::constructor::{Chunk, ChunkFlags, CodecFamily, create_constructor};
//!
//! let mut fc = create_constructor(CodecFamily::Avc, Default::default());
//! let data = [0x00, 0x00, 0x01, 0x65, 0x88, 0x84];
//! let cycle = fc.load(Chunk::new(&data, 0, ChunkFlags::COMPLETE_FRAME)).unwrap();
//! assert_eq!(cycle.assembled_buffer().unwrap().unread(), &data);
//! ```

pub mod buffer;
pub mod constructor;
pub mod header_set;
pub mod parsers;
pub mod scanner;

// 重导出常用类型
pub use buffer::{BufferStats, GrowableBuffer};
pub use constructor::{
    AnyFrameConstructor, AssembledBuffer, BufferMeta, Chunk, ChunkFlags, CodecFamily,
    ConstructorConfig, ConstructorState, FrameConstructor, LoadCycle, create_constructor,
};
pub use header_set::HeaderSet;
pub use scanner::{AvcSyntax, HevcSyntax, ScanOutcome, UnitBoundary, UnitSyntax};
