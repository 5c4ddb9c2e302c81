//! 帧组装器状态机.
//!
//! 编码相关的部分 (参数集识别与缓存、状态推进、补发内容) 由 [`HeaderHandler`] 提供,
//! 缓冲区管理与 load/unload 周期在这里统一实现.

use zhen_core::{ZhenError, ZhenResult};

use super::{
    AssembledBuffer, BufferMeta, Chunk, ChunkFlags, CodecFamily, ConstructorConfig,
    ConstructorState, FrameGeometry, ProfileHint,
};
use crate::buffer::{BufferStats, GrowableBuffer};

/// 头部处理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderStep {
    /// 新状态
    pub state: ConstructorState,
    /// 是否在本次数据之前补发缓存的参数集
    pub reinject: bool,
}

impl HeaderStep {
    pub fn to(state: ConstructorState) -> Self {
        Self {
            state,
            reinject: false,
        }
    }

    pub fn reinject(state: ConstructorState) -> Self {
        Self {
            state,
            reinject: true,
        }
    }
}

/// 编码相关的头部处理
pub trait HeaderHandler {
    /// 编码族
    fn family(&self) -> CodecFamily;

    /// 检查一个数据块, 更新参数集缓存并给出下一个状态
    ///
    /// 单个参数集解析失败不是错误: 该单元被丢弃, 缓存保持原值.
    fn load_header(
        &mut self,
        state: ConstructorState,
        data: &[u8],
        is_header: bool,
    ) -> ZhenResult<HeaderStep>;

    /// 复位后需要补发的数据, 按顺序拼接
    fn reinjection(&self) -> Vec<&[u8]>;

    /// 由调用方直接覆盖缓存的序列级与图像级参数集, `None` 表示保持不变
    fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
    ) -> ZhenResult<()>;

    /// 清空全部缓存
    fn clear(&mut self);
}

/// 本轮 load 之后哪一份数据处于活动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Active {
    Buffer,
    Chunk,
}

/// 零拷贝时对数据块的读取位置
#[derive(Debug, Clone, Copy)]
struct ChunkView {
    offset: usize,
    len: usize,
    meta: BufferMeta,
}

/// 与编码无关的帧组装器状态
#[derive(Debug)]
pub(crate) struct ConstructorCore {
    family: CodecFamily,
    state: ConstructorState,
    buffer: GrowableBuffer,
    buffer_meta: BufferMeta,
    view: Option<ChunkView>,
    active: Option<Active>,
    eos: bool,
    profile: Option<ProfileHint>,
    geometry: Option<FrameGeometry>,
}

impl ConstructorCore {
    fn new(family: CodecFamily, config: &ConstructorConfig) -> Self {
        let buffer = GrowableBuffer::with_capacity(config.initial_capacity).unwrap_or_else(|e| {
            log::warn!("{}: 预分配缓冲区失败, 改为按需分配: {}", family, e);
            GrowableBuffer::new()
        });
        Self {
            family,
            state: ConstructorState::HeaderAwaiting,
            buffer,
            buffer_meta: BufferMeta::default(),
            view: None,
            active: None,
            eos: false,
            profile: None,
            geometry: None,
        }
    }

    fn transition(&mut self, next: ConstructorState) {
        if self.state != next {
            log::debug!("{}: 状态 {} -> {}", self.family, self.state, next);
            self.state = next;
        }
    }

    /// 决定本次数据块是直接引用还是追加到内部缓冲区
    fn stage(&mut self, data: &[u8], meta: BufferMeta) -> ZhenResult<()> {
        if self.buffer.is_empty() {
            self.view = Some(ChunkView {
                offset: 0,
                len: data.len(),
                meta,
            });
            self.active = Some(Active::Chunk);
        } else {
            self.buffer.append(data)?;
            self.buffer_meta = meta;
            self.view = None;
            self.active = Some(Active::Buffer);
        }
        Ok(())
    }

    fn assembled<'a>(&'a self, chunk: Option<&'a [u8]>) -> Option<AssembledBuffer<'a>> {
        if !self.buffer.is_empty() {
            return Some(AssembledBuffer::Owned {
                buffer: &self.buffer,
                meta: self.buffer_meta,
            });
        }
        let view = self.view?;
        let chunk = chunk?;
        (view.offset < view.len).then_some(AssembledBuffer::Borrowed {
            chunk,
            offset: view.offset,
            meta: view.meta,
        })
    }

    fn consume(&mut self, n: usize) -> ZhenResult<()> {
        if !self.buffer.is_empty() {
            return self.buffer.consume(n);
        }
        match self.view.as_mut() {
            Some(view) if n <= view.len - view.offset => {
                view.offset += n;
                Ok(())
            }
            _ if n == 0 => Ok(()),
            _ => Err(ZhenError::InvalidArgument(format!(
                "{}: 消费字节数超过未读数据, n={}",
                self.family, n
            ))),
        }
    }

    /// 结束一轮 load: 整理内部缓冲区, 或把数据块中未读的部分转存
    fn unload(&mut self, chunk: Option<&[u8]>) -> ZhenResult<()> {
        let result = match self.active.take() {
            Some(Active::Chunk) => match (self.view.take(), chunk) {
                (Some(view), Some(chunk)) if view.offset < view.len => {
                    let rest = &chunk[view.offset..view.len];
                    log::trace!("{}: 转存数据块剩余 {} 字节", self.family, rest.len());
                    self.buffer_meta = view.meta;
                    self.buffer.append(rest)
                }
                _ => Ok(()),
            },
            Some(Active::Buffer) | None => {
                self.buffer.compact();
                Ok(())
            }
        };
        // Resetting 只维持到本轮结束: 复位后先到的头部块即使参数集不全, 之后的数据也不再补发
        if self.state == ConstructorState::Resetting {
            self.transition(ConstructorState::HeaderObtained);
        }
        result
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.buffer_meta = BufferMeta::default();
        self.view = None;
        self.active = None;
        self.eos = false;
        self.transition(ConstructorState::Resetting);
    }
}

/// 帧组装器
///
/// `H` 决定编码相关的行为, 见 [`super::create_constructor`].
#[derive(Debug)]
pub struct FrameConstructor<H> {
    core: ConstructorCore,
    handler: H,
}

impl<H: HeaderHandler> FrameConstructor<H> {
    /// 创建帧组装器
    pub fn new(handler: H, config: &ConstructorConfig) -> Self {
        Self {
            core: ConstructorCore::new(handler.family(), config),
            handler,
        }
    }

    pub fn family(&self) -> CodecFamily {
        self.handler.family()
    }

    /// 编码相关的缓存 (参数集表等)
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// 保存 profile 与帧几何提示, 解析过程不使用它们
    pub fn init(&mut self, profile: ProfileHint, geometry: FrameGeometry) {
        self.core.profile = Some(profile);
        self.core.geometry = Some(geometry);
    }

    pub fn profile_hint(&self) -> Option<ProfileHint> {
        self.core.profile
    }

    pub fn geometry_hint(&self) -> Option<FrameGeometry> {
        self.core.geometry
    }

    pub fn state(&self) -> ConstructorState {
        self.core.state
    }

    /// 内部缓冲区统计
    pub fn stats(&self) -> BufferStats {
        self.core.buffer.stats()
    }

    /// 载入一个数据块
    pub fn load<'a>(&'a mut self, chunk: Chunk<'a>) -> ZhenResult<LoadCycle<'a>> {
        self.load_with_side_channel(chunk, None)
    }

    /// 载入一个数据块, 同时转发不透明的旁路数据 (例如解密元数据)
    ///
    /// 旁路数据不参与解析, 只能通过 [`LoadCycle::side_channel`] 取回.
    pub fn load_with_side_channel<'a>(
        &'a mut self,
        chunk: Chunk<'a>,
        side_channel: Option<&'a [u8]>,
    ) -> ZhenResult<LoadCycle<'a>> {
        if chunk.data.is_empty() {
            return Err(ZhenError::InvalidArgument(format!(
                "{}: 数据块为空",
                self.family()
            )));
        }
        log::trace!(
            "{}: load {} 字节, pts={}, flags={:?}",
            self.family(),
            chunk.data.len(),
            chunk.timestamp,
            chunk.flags
        );

        let step = self
            .handler
            .load_header(self.core.state, chunk.data, chunk.is_header())?;
        if step.reinject {
            let parts = self.handler.reinjection();
            let total: usize = parts.iter().map(|p| p.len()).sum();
            if total > 0 {
                log::debug!("{}: 复位后补发参数集 {} 字节", self.family(), total);
                self.core.buffer.reserve(total + chunk.data.len())?;
                for part in parts {
                    self.core.buffer.append(part)?;
                }
            }
        }
        self.core.transition(step.state);

        if chunk.flags.contains(ChunkFlags::END_OF_STREAM) {
            self.set_eos(true);
        }

        self.core.stage(chunk.data, chunk.meta())?;
        Ok(LoadCycle {
            core: &mut self.core,
            chunk: chunk.data,
            side_channel,
            unloaded: false,
        })
    }

    /// 在 load 周期之外整理内部缓冲区, 可重复调用
    pub fn unload(&mut self) -> ZhenResult<()> {
        self.core.unload(None)
    }

    /// 当前可供消费的数据 (load 周期之外只可能是内部缓冲区)
    pub fn assembled_buffer(&self) -> Option<AssembledBuffer<'_>> {
        self.core.assembled(None)
    }

    /// 标记 `n` 字节为已读
    pub fn consume(&mut self, n: usize) -> ZhenResult<()> {
        self.core.consume(n)
    }

    /// 复位 (seek), 丢弃缓冲的数据并准备补发参数集
    ///
    /// 任何状态都进入 Resetting, 包括尚未见到头部的 HeaderAwaiting; 此时缓存为空, 补发为空操作.
    /// 必须在上一轮 load/unload 完整结束后调用.
    pub fn reset(&mut self) {
        self.core.reset();
    }

    /// 复位并清空参数集缓存
    pub fn close(&mut self) {
        self.core.reset();
        self.core.buffer.release();
        self.handler.clear();
        self.core.transition(ConstructorState::HeaderAwaiting);
    }

    /// 设置流结束标志
    ///
    /// 置位时, 仍在收集头部或等待 SEI 的状态直接视为头部就绪.
    pub fn set_eos(&mut self, eos: bool) {
        self.core.eos = eos;
        if eos
            && matches!(
                self.core.state,
                ConstructorState::HeaderCollecting | ConstructorState::HeaderWaitingSupplemental
            )
        {
            self.core.transition(ConstructorState::HeaderObtained);
        }
    }

    pub fn was_eos_reached(&self) -> bool {
        self.core.eos
    }

    /// 直接覆盖缓存的参数集
    ///
    /// `reset_first` 为 true 时先执行 [`Self::reset`], 下一次不含参数集的数据前会补发这里给出的内容.
    pub fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
        reset_first: bool,
    ) -> ZhenResult<()> {
        if reset_first {
            self.reset();
        }
        self.handler.save_header_sets(sequence, picture)
    }
}

/// 一轮 load/unload
///
/// 借用帧组装器和本次数据块; 丢弃时自动执行 unload.
/// 零拷贝返回的数据因此不可能在数据块失效后被访问.
#[derive(Debug)]
pub struct LoadCycle<'a> {
    core: &'a mut ConstructorCore,
    chunk: &'a [u8],
    side_channel: Option<&'a [u8]>,
    unloaded: bool,
}

impl<'a> LoadCycle<'a> {
    /// 当前可供消费的数据
    pub fn assembled_buffer(&self) -> Option<AssembledBuffer<'_>> {
        self.core.assembled(Some(self.chunk))
    }

    /// 标记 `n` 字节为已读
    pub fn consume(&mut self, n: usize) -> ZhenResult<()> {
        self.core.consume(n)
    }

    /// 随数据块转发的旁路数据
    pub fn side_channel(&self) -> Option<&'a [u8]> {
        self.side_channel
    }

    pub fn state(&self) -> ConstructorState {
        self.core.state
    }

    /// 结束本轮, 返回转存数据时可能出现的内存错误
    pub fn unload(mut self) -> ZhenResult<()> {
        self.unloaded = true;
        self.core.unload(Some(self.chunk))
    }
}

impl Drop for LoadCycle<'_> {
    fn drop(&mut self) {
        if !self.unloaded {
            if let Err(e) = self.core.unload(Some(self.chunk)) {
                log::warn!("{}: unload 失败: {}", self.core.family, e);
            }
        }
    }
}
