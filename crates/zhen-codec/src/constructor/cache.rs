//! 原始参数集缓存.
//!
//! 保存最近一次见到的 VPS / SPS / PPS 原始字节 (含起始码), 复位后原样补发.

use zhen_core::{ZhenError, ZhenResult};

/// 最近一次保存的原始参数集
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaderCache {
    video: Option<Vec<u8>>,
    sequence: Option<Vec<u8>>,
    picture: Option<Vec<u8>>,
}

impl RawHeaderCache {
    pub fn video(&self) -> Option<&[u8]> {
        self.video.as_deref()
    }

    pub fn sequence(&self) -> Option<&[u8]> {
        self.sequence.as_deref()
    }

    pub fn picture(&self) -> Option<&[u8]> {
        self.picture.as_deref()
    }

    pub(crate) fn set_video(&mut self, data: &[u8]) -> ZhenResult<()> {
        self.video = Some(copy_bytes(data)?);
        Ok(())
    }

    pub(crate) fn set_sequence(&mut self, data: &[u8]) -> ZhenResult<()> {
        self.sequence = Some(copy_bytes(data)?);
        Ok(())
    }

    pub(crate) fn set_picture(&mut self, data: &[u8]) -> ZhenResult<()> {
        self.picture = Some(copy_bytes(data)?);
        Ok(())
    }

    pub(crate) fn clear_video(&mut self) {
        self.video = None;
    }

    /// 序列级与图像级参数集都已缓存
    pub fn is_complete(&self) -> bool {
        self.sequence.is_some() && self.picture.is_some()
    }

    /// 补发内容: 缓存完整时依次为 VPS (若有)、SPS、PPS, 否则为空
    pub fn reinjection(&self) -> Vec<&[u8]> {
        if !self.is_complete() {
            return Vec::new();
        }
        [&self.video, &self.sequence, &self.picture]
            .into_iter()
            .filter_map(|part| part.as_deref())
            .collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// 拷贝一段数据, 分配失败映射为 [`ZhenError::OutOfMemory`]
pub(crate) fn copy_bytes(data: &[u8]) -> ZhenResult<Vec<u8>> {
    let mut out = Vec::new();
    out.try_reserve_exact(data.len()).map_err(|e| {
        ZhenError::OutOfMemory(format!("参数集缓存分配失败, len={}: {}", data.len(), e))
    })?;
    out.extend_from_slice(data);
    Ok(out)
}
