//! H.264 帧组装器的头部处理.
//!
//! 在头部数据块 (以及复位后的第一个数据块) 中查找 SPS / PPS.
//! 每个参数集先完整解析, 解析成功才会替换缓存; 解析失败的单元被丢弃.

use zhen_core::ZhenResult;

use super::base::{HeaderHandler, HeaderStep};
use super::cache::RawHeaderCache;
use super::{CodecFamily, ConstructorState};
use crate::header_set::HeaderSet;
use crate::parsers::h264::nal::trim_trailing_zeros;
use crate::parsers::h264::{self, NalUnit, Pps, Sps};
use crate::scanner::{AnnexBUnits, AvcSyntax, ScannedUnit, UnitSyntax};

/// 一个数据块中找到的有效参数集
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FoundHeaders {
    pub(crate) sequence: bool,
    pub(crate) picture: bool,
}

impl FoundHeaders {
    pub(crate) fn complete(&self) -> bool {
        self.sequence && self.picture
    }
}

/// H.264 参数集缓存
#[derive(Debug, Clone)]
pub struct AvcHeaders {
    raw: RawHeaderCache,
    sps: HeaderSet<Sps>,
    pps: HeaderSet<Pps>,
}

impl Default for AvcHeaders {
    fn default() -> Self {
        Self::new()
    }
}

impl AvcHeaders {
    pub fn new() -> Self {
        Self {
            raw: RawHeaderCache::default(),
            sps: HeaderSet::new(h264::MAX_SPS_COUNT),
            pps: HeaderSet::new(h264::MAX_PPS_COUNT),
        }
    }

    /// 原始参数集缓存
    pub fn raw_headers(&self) -> &RawHeaderCache {
        &self.raw
    }

    /// 已解析的 SPS 表, current 指向最近一次保存的 SPS
    pub fn sps_set(&self) -> &HeaderSet<Sps> {
        &self.sps
    }

    /// 已解析的 PPS 表
    pub fn pps_set(&self) -> &HeaderSet<Pps> {
        &self.pps
    }

    /// 最近一次保存的 SPS
    pub fn active_sps(&self) -> Option<&Sps> {
        self.sps.current()
    }

    fn find_headers(&mut self, data: &[u8]) -> ZhenResult<FoundHeaders> {
        let mut found = FoundHeaders::default();
        for unit in AnnexBUnits::<AvcSyntax>::new(data) {
            if AvcSyntax::is_sequence_header(unit.unit_type) {
                found.sequence |= discard_malformed(self.accept_sps(&unit))?;
            } else if AvcSyntax::is_picture_header(unit.unit_type) {
                found.picture |= discard_malformed(self.accept_pps(&unit))?;
            }
        }
        Ok(found)
    }

    fn accept_sps(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = NalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let sps = h264::parse_sps(&nal.rbsp())?;
        let id = sps.sps_id as usize;
        log::info!(
            "H.264: 缓存 SPS {}, {} 字节, {}x{}, profile={}, level={}",
            id,
            unit.bytes.len(),
            sps.width,
            sps.height,
            sps.profile_idc,
            sps.level_idc
        );
        self.raw.set_sequence(unit.bytes)?;
        self.sps.insert(id, sps)?;
        self.sps.set_current(id)
    }

    fn accept_pps(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = NalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let rbsp = nal.rbsp();
        let (_, sps_id) = h264::peek_pps_ids(&rbsp)?;
        let pps = h264::parse_pps(&rbsp, self.sps.get(sps_id as usize))?;
        let id = pps.pps_id as usize;
        log::info!("H.264: 缓存 PPS {}, {} 字节", id, unit.bytes.len());
        self.raw.set_picture(unit.bytes)?;
        self.pps.insert(id, pps)?;
        self.pps.set_current(id)
    }
}

/// 码流格式错误只丢弃当前单元, 其他错误继续向上传播
pub(crate) fn discard_malformed(result: ZhenResult<()>) -> ZhenResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(e) if e.is_malformed() => {
            log::warn!("丢弃无法解析的参数集: {}", e);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

impl HeaderHandler for AvcHeaders {
    fn family(&self) -> CodecFamily {
        CodecFamily::Avc
    }

    fn load_header(
        &mut self,
        state: ConstructorState,
        data: &[u8],
        is_header: bool,
    ) -> ZhenResult<HeaderStep> {
        use ConstructorState::*;

        if is_header {
            let found = self.find_headers(data)?;
            let next = match state {
                _ if found.complete() => HeaderObtained,
                HeaderAwaiting => HeaderCollecting,
                other => other,
            };
            return Ok(HeaderStep::to(next));
        }

        match state {
            Resetting => {
                let found = self.find_headers(data)?;
                if found.complete() {
                    Ok(HeaderStep::to(HeaderObtained))
                } else {
                    Ok(HeaderStep::reinject(HeaderObtained))
                }
            }
            HeaderCollecting => Ok(HeaderStep::to(HeaderObtained)),
            other => Ok(HeaderStep::to(other)),
        }
    }

    fn reinjection(&self) -> Vec<&[u8]> {
        self.raw.reinjection()
    }

    fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
    ) -> ZhenResult<()> {
        if let Some(sequence) = sequence {
            self.raw.set_sequence(sequence)?;
        }
        if let Some(picture) = picture {
            self.raw.set_picture(picture)?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.raw.clear();
        self.sps.reset();
        self.pps.reset();
    }
}
