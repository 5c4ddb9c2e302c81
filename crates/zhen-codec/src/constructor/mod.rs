//! 帧组装器.
//!
//! 上游把压缩数据按任意大小切块后逐块送入 ([`FrameConstructor::load`]),
//! 帧组装器负责:
//! - 从头部数据块中找出并缓存参数集 (SPS / PPS, HEVC 还有 VPS 与 SEI)
//! - 内部缓冲区为空时直接引用数据块 (零拷贝), 否则把数据块追加到内部缓冲区
//! - 复位 (seek) 后, 若新数据不含参数集, 则把缓存的参数集补发在新数据之前
//!
//! 每次 `load` 返回一个 [`LoadCycle`], 它借用帧组装器与本次数据块,
//! 在被丢弃或显式 [`LoadCycle::unload`] 时把未读完的数据转存到内部缓冲区.
//!
//! 同一实例的所有调用必须串行; 不同实例之间没有共享状态.

mod avc;
mod base;
mod cache;
mod hevc;
mod passthrough;

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use zhen_core::ZhenResult;

use crate::buffer::{BufferStats, GrowableBuffer};
use crate::parsers::h265::HdrMetadata;

pub use avc::AvcHeaders;
pub use base::{FrameConstructor, HeaderHandler, HeaderStep, LoadCycle};
pub use cache::RawHeaderCache;
pub use hevc::{HevcHeaders, SupplementalPayload};
pub use passthrough::PassThroughHeaders;

bitflags! {
    /// 数据块标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChunkFlags: u32 {
        /// 数据块包含流头部 (参数集)
        const HEADER         = 1 << 0;
        /// 数据块只含配置数据
        const CONFIG_ONLY    = 1 << 1;
        /// 流结束
        const END_OF_STREAM  = 1 << 2;
        /// 数据块是一个完整的帧
        const COMPLETE_FRAME = 1 << 3;
    }
}

/// 输入数据块, 由调用方持有
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    /// 数据
    pub data: &'a [u8],
    /// 显示时间戳
    pub timestamp: u64,
    /// 标志
    pub flags: ChunkFlags,
}

impl<'a> Chunk<'a> {
    pub fn new(data: &'a [u8], timestamp: u64, flags: ChunkFlags) -> Self {
        Self {
            data,
            timestamp,
            flags,
        }
    }

    pub fn is_header(&self) -> bool {
        self.flags.contains(ChunkFlags::HEADER)
    }

    fn meta(&self) -> BufferMeta {
        BufferMeta {
            timestamp: self.timestamp,
            complete_frame: self.flags.contains(ChunkFlags::COMPLETE_FRAME),
            config_only: self.flags.contains(ChunkFlags::CONFIG_ONLY),
        }
    }
}

/// 帧组装器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConstructorState {
    /// 尚未收到头部数据
    HeaderAwaiting,
    /// 正在收集头部数据
    HeaderCollecting,
    /// 已获得参数集, 等待 SEI (仅 HEVC)
    HeaderWaitingSupplemental,
    /// 头部已就绪
    HeaderObtained,
    /// 已复位, 下一次 load 决定是否补发参数集
    Resetting,
}

impl fmt::Display for ConstructorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HeaderAwaiting => "HeaderAwaiting",
            Self::HeaderCollecting => "HeaderCollecting",
            Self::HeaderWaitingSupplemental => "HeaderWaitingSupplemental",
            Self::HeaderObtained => "HeaderObtained",
            Self::Resetting => "Resetting",
        };
        f.write_str(name)
    }
}

/// 编码族, 决定使用哪种帧组装器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    /// 不需要重新组装的格式, 头部数据原样缓存
    PassThrough,
    /// H.264/AVC
    Avc,
    /// H.265/HEVC
    Hevc,
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PassThrough => "passthrough",
            Self::Avc => "H.264",
            Self::Hevc => "H.265",
        };
        f.write_str(name)
    }
}

/// 帧组装器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructorConfig {
    /// 内部缓冲区初始容量 (字节)
    pub initial_capacity: usize,
    /// HEVC 获得参数集后是否等待 SEI
    pub wait_for_supplemental: bool,
}

impl Default for ConstructorConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            wait_for_supplemental: true,
        }
    }
}

/// profile 提示, 只保存不参与解析
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHint(pub u16);

/// 帧几何提示, 只保存不参与解析
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

/// 组装结果的附加信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferMeta {
    /// 最近一次 load 的时间戳
    pub timestamp: u64,
    /// 最近一次 load 的完整帧提示
    pub complete_frame: bool,
    /// 最近一次 load 的纯配置提示
    pub config_only: bool,
}

/// 当前可供解码器消费的数据
///
/// 内部缓冲区有数据时总是返回 [`AssembledBuffer::Owned`];
/// 只有内部缓冲区为空时才直接引用本次数据块.
#[derive(Debug, Clone, Copy)]
pub enum AssembledBuffer<'a> {
    /// 直接引用本次 load 的数据块 (零拷贝), 只在本轮 load/unload 内有效
    Borrowed {
        chunk: &'a [u8],
        offset: usize,
        meta: BufferMeta,
    },
    /// 帧组装器内部缓冲区
    Owned {
        buffer: &'a GrowableBuffer,
        meta: BufferMeta,
    },
}

impl<'a> AssembledBuffer<'a> {
    /// 全部数据 (含已读部分)
    pub fn data(&self) -> &'a [u8] {
        match *self {
            Self::Borrowed { chunk, .. } => chunk,
            Self::Owned { buffer, .. } => buffer.data(),
        }
    }

    pub fn offset(&self) -> usize {
        match *self {
            Self::Borrowed { offset, .. } => offset,
            Self::Owned { buffer, .. } => buffer.offset(),
        }
    }

    pub fn length(&self) -> usize {
        self.data().len() - self.offset()
    }

    pub fn capacity(&self) -> usize {
        match *self {
            Self::Borrowed { chunk, .. } => chunk.len(),
            Self::Owned { buffer, .. } => buffer.capacity(),
        }
    }

    /// 未读数据
    pub fn unread(&self) -> &'a [u8] {
        &self.data()[self.offset()..]
    }

    pub fn meta(&self) -> BufferMeta {
        match *self {
            Self::Borrowed { meta, .. } | Self::Owned { meta, .. } => meta,
        }
    }

    pub fn timestamp(&self) -> u64 {
        self.meta().timestamp
    }

    pub fn complete_frame(&self) -> bool {
        self.meta().complete_frame
    }

    pub fn config_only(&self) -> bool {
        self.meta().config_only
    }

    pub fn is_borrowed(&self) -> bool {
        matches!(self, Self::Borrowed { .. })
    }
}

/// 按编码族选定的帧组装器
#[derive(Debug)]
pub enum AnyFrameConstructor {
    PassThrough(FrameConstructor<PassThroughHeaders>),
    Avc(FrameConstructor<AvcHeaders>),
    Hevc(FrameConstructor<HevcHeaders>),
}

macro_rules! dispatch {
    ($self:expr, $fc:ident => $body:expr) => {
        match $self {
            AnyFrameConstructor::PassThrough($fc) => $body,
            AnyFrameConstructor::Avc($fc) => $body,
            AnyFrameConstructor::Hevc($fc) => $body,
        }
    };
}

/// 创建帧组装器
pub fn create_constructor(family: CodecFamily, config: ConstructorConfig) -> AnyFrameConstructor {
    log::debug!("创建帧组装器: {}", family);
    match family {
        CodecFamily::PassThrough => AnyFrameConstructor::PassThrough(FrameConstructor::new(
            PassThroughHeaders::new(),
            &config,
        )),
        CodecFamily::Avc => {
            AnyFrameConstructor::Avc(FrameConstructor::new(AvcHeaders::new(), &config))
        }
        CodecFamily::Hevc => AnyFrameConstructor::Hevc(FrameConstructor::new(
            HevcHeaders::new(&config),
            &config,
        )),
    }
}

impl AnyFrameConstructor {
    pub fn family(&self) -> CodecFamily {
        dispatch!(self, fc => fc.family())
    }

    /// 保存 profile 与帧几何提示
    pub fn init(&mut self, profile: ProfileHint, geometry: FrameGeometry) {
        dispatch!(self, fc => fc.init(profile, geometry))
    }

    pub fn profile_hint(&self) -> Option<ProfileHint> {
        dispatch!(self, fc => fc.profile_hint())
    }

    pub fn geometry_hint(&self) -> Option<FrameGeometry> {
        dispatch!(self, fc => fc.geometry_hint())
    }

    /// 载入一个数据块
    pub fn load<'a>(&'a mut self, chunk: Chunk<'a>) -> ZhenResult<LoadCycle<'a>> {
        dispatch!(self, fc => fc.load(chunk))
    }

    /// 载入一个数据块, 同时转发不透明的旁路数据
    pub fn load_with_side_channel<'a>(
        &'a mut self,
        chunk: Chunk<'a>,
        side_channel: Option<&'a [u8]>,
    ) -> ZhenResult<LoadCycle<'a>> {
        dispatch!(self, fc => fc.load_with_side_channel(chunk, side_channel))
    }

    pub fn unload(&mut self) -> ZhenResult<()> {
        dispatch!(self, fc => fc.unload())
    }

    pub fn assembled_buffer(&self) -> Option<AssembledBuffer<'_>> {
        dispatch!(self, fc => fc.assembled_buffer())
    }

    pub fn consume(&mut self, n: usize) -> ZhenResult<()> {
        dispatch!(self, fc => fc.consume(n))
    }

    pub fn reset(&mut self) {
        dispatch!(self, fc => fc.reset())
    }

    pub fn close(&mut self) {
        dispatch!(self, fc => fc.close())
    }

    pub fn set_eos(&mut self, eos: bool) {
        dispatch!(self, fc => fc.set_eos(eos))
    }

    pub fn was_eos_reached(&self) -> bool {
        dispatch!(self, fc => fc.was_eos_reached())
    }

    pub fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
        reset_first: bool,
    ) -> ZhenResult<()> {
        dispatch!(self, fc => fc.save_header_sets(sequence, picture, reset_first))
    }

    pub fn state(&self) -> ConstructorState {
        dispatch!(self, fc => fc.state())
    }

    pub fn stats(&self) -> BufferStats {
        dispatch!(self, fc => fc.stats())
    }

    /// 查询缓存的 SEI 负载, 只有 HEVC 帧组装器有 SEI 缓存
    pub fn supplemental_payload(&self, payload_type: u32) -> Option<SupplementalPayload> {
        match self {
            Self::Hevc(fc) => fc.supplemental_payload(payload_type),
            _ => None,
        }
    }

    /// 缓存 SEI 中的 HDR 静态元数据, 非 HEVC 时为空
    pub fn hdr_metadata(&self) -> HdrMetadata {
        match self {
            Self::Hevc(fc) => fc.hdr_metadata(),
            _ => HdrMetadata::default(),
        }
    }

    pub fn as_avc(&self) -> Option<&FrameConstructor<AvcHeaders>> {
        match self {
            Self::Avc(fc) => Some(fc),
            _ => None,
        }
    }

    pub fn as_hevc(&self) -> Option<&FrameConstructor<HevcHeaders>> {
        match self {
            Self::Hevc(fc) => Some(fc),
            _ => None,
        }
    }
}
