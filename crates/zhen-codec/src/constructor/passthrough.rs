//! 透传帧组装器.
//!
//! 用于没有参数集 NAL 单元的格式: 调用方标记为头部的数据块被整体缓存,
//! 复位后原样补发.

use zhen_core::ZhenResult;

use super::base::{HeaderHandler, HeaderStep};
use super::cache::copy_bytes;
use super::{CodecFamily, ConstructorState};

/// 透传模式的头部缓存
#[derive(Debug, Clone, Default)]
pub struct PassThroughHeaders {
    header: Vec<u8>,
}

impl PassThroughHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已缓存的头部数据
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    fn replace(&mut self, data: &[u8]) -> ZhenResult<()> {
        self.header = copy_bytes(data)?;
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> ZhenResult<()> {
        let mut joined = copy_bytes(&self.header)?;
        joined.extend_from_slice(data);
        self.header = joined;
        Ok(())
    }
}

impl HeaderHandler for PassThroughHeaders {
    fn family(&self) -> CodecFamily {
        CodecFamily::PassThrough
    }

    fn load_header(
        &mut self,
        state: ConstructorState,
        data: &[u8],
        is_header: bool,
    ) -> ZhenResult<HeaderStep> {
        use ConstructorState::*;

        if is_header {
            return match state {
                // 复位后收到新的头部, 以新头部为准
                Resetting => {
                    self.replace(data)?;
                    Ok(HeaderStep::to(HeaderObtained))
                }
                HeaderAwaiting => {
                    self.append(data)?;
                    Ok(HeaderStep::to(HeaderCollecting))
                }
                _ => {
                    self.append(data)?;
                    Ok(HeaderStep::to(state))
                }
            };
        }

        Ok(match state {
            HeaderCollecting => HeaderStep::to(HeaderObtained),
            Resetting if !self.header.is_empty() => HeaderStep::reinject(HeaderObtained),
            Resetting => HeaderStep::to(HeaderObtained),
            _ => HeaderStep::to(state),
        })
    }

    fn reinjection(&self) -> Vec<&[u8]> {
        vec![&self.header]
    }

    fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
    ) -> ZhenResult<()> {
        let mut header = copy_bytes(sequence.unwrap_or_default())?;
        header.extend_from_slice(picture.unwrap_or_default());
        self.header = header;
        Ok(())
    }

    fn clear(&mut self) {
        self.header = Vec::new();
    }
}
