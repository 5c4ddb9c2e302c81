//! 可增长缓冲区.
//!
//! 只有数据块需要拼接时 (复位后补发参数集、上一轮未读完的数据) 才会用到.
//! 已存数据为 `[0, offset + length)`, 其中 `[offset, offset + length)` 尚未被读取.
//! 扩容失败映射为 [`ZhenError::OutOfMemory`], 缓冲区内容保持不变.

use serde::Serialize;
use zhen_core::{ZhenError, ZhenResult};

/// 缓冲区统计信息, 用于诊断拷贝开销
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    /// 容量变化次数
    pub reallocations: u64,
    /// 累计拷贝的字节数 (追加、扩容搬移、压缩搬移)
    pub copied_bytes: u64,
}

/// 可增长字节缓冲区
#[derive(Debug, Default)]
pub struct GrowableBuffer {
    storage: Vec<u8>,
    offset: usize,
    stats: BufferStats,
}

impl GrowableBuffer {
    /// 创建空缓冲区, 不分配内存
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建并预留 `capacity` 字节
    pub fn with_capacity(capacity: usize) -> ZhenResult<Self> {
        let mut buffer = Self::new();
        buffer.reserve(capacity)?;
        Ok(buffer)
    }

    /// 已读取字节数 (读取偏移)
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// 未读取字节数
    pub fn length(&self) -> usize {
        self.storage.len() - self.offset
    }

    /// 当前容量
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// 是否没有未读数据
    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    /// 全部已存数据 (含已读部分)
    pub fn data(&self) -> &[u8] {
        &self.storage
    }

    /// 未读数据
    pub fn unread(&self) -> &[u8] {
        &self.storage[self.offset..]
    }

    /// 统计信息
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// 保证还能追加 `additional` 字节
    pub fn reserve(&mut self, additional: usize) -> ZhenResult<()> {
        let old_capacity = self.storage.capacity();
        self.storage.try_reserve(additional).map_err(|e| {
            ZhenError::OutOfMemory(format!(
                "缓冲区扩容失败, used={}, additional={}: {}",
                self.storage.len(),
                additional,
                e
            ))
        })?;
        if self.storage.capacity() != old_capacity {
            self.stats.reallocations += 1;
            self.stats.copied_bytes += self.storage.len() as u64;
            log::trace!(
                "缓冲区扩容: {} -> {} 字节",
                old_capacity,
                self.storage.capacity()
            );
        }
        Ok(())
    }

    /// 追加数据
    pub fn append(&mut self, data: &[u8]) -> ZhenResult<()> {
        self.reserve(data.len())?;
        self.storage.extend_from_slice(data);
        self.stats.copied_bytes += data.len() as u64;
        Ok(())
    }

    /// 标记 `n` 字节为已读
    pub fn consume(&mut self, n: usize) -> ZhenResult<()> {
        if n > self.length() {
            return Err(ZhenError::InvalidArgument(format!(
                "消费字节数超过未读数据, n={}, length={}",
                n,
                self.length()
            )));
        }
        self.offset += n;
        Ok(())
    }

    /// 把未读数据移到开头, 读取偏移归零
    pub fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }
        let unread = self.length();
        if unread > 0 {
            self.storage.copy_within(self.offset.., 0);
            self.stats.copied_bytes += unread as u64;
        }
        self.storage.truncate(unread);
        self.offset = 0;
    }

    /// 丢弃全部数据, 保留已分配的容量
    pub fn clear(&mut self) {
        self.storage.clear();
        self.offset = 0;
    }

    /// 丢弃全部数据并释放内存
    pub fn release(&mut self) {
        self.storage = Vec::new();
        self.offset = 0;
    }
}
