//! H.265 帧组装器的头部处理.
//!
//! 与 H.264 相比多出 VPS 与 SEI: 找到 SPS/PPS 之后默认还要等待一个 SEI
//! (或第一个编码条带) 才认为头部就绪, 以便 HDR 元数据在解码器初始化前可用.

use std::collections::HashMap;

use bytes::Bytes;
use zhen_core::ZhenResult;

use super::avc::{FoundHeaders, discard_malformed};
use super::base::{FrameConstructor, HeaderHandler, HeaderStep};
use super::cache::RawHeaderCache;
use super::{CodecFamily, ConstructorConfig, ConstructorState};
use crate::header_set::HeaderSet;
use crate::parsers::h264::nal::trim_trailing_zeros;
use crate::parsers::h265::sei::{
    SEI_CONTENT_LIGHT_LEVEL_INFO, SEI_MASTERING_DISPLAY_COLOUR_VOLUME, parse_content_light_level,
    parse_mastering_display,
};
use crate::parsers::h265::{
    self, HdrMetadata, HevcNalUnit, HevcPps, HevcSps, HevcVps,
};
use crate::parsers::sei::split_sei_messages;
use crate::scanner::{AnnexBUnits, HevcSyntax, ScannedUnit, UnitSyntax};

/// 缓存的一条 SEI 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplementalPayload {
    pub payload_type: u32,
    /// 负载位长度
    pub bit_length: usize,
    /// 负载字节 (已去除防竞争字节)
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Copy, Default)]
struct HevcFound {
    headers: FoundHeaders,
    supplemental: bool,
    slice: bool,
}

/// H.265 参数集与 SEI 缓存
#[derive(Debug, Clone)]
pub struct HevcHeaders {
    raw: RawHeaderCache,
    vps: HeaderSet<HevcVps>,
    sps: HeaderSet<HevcSps>,
    pps: HeaderSet<HevcPps>,
    supplemental: HashMap<u32, Bytes>,
    wait_for_supplemental: bool,
}

impl HevcHeaders {
    pub fn new(config: &ConstructorConfig) -> Self {
        Self {
            raw: RawHeaderCache::default(),
            vps: HeaderSet::new(h265::MAX_VPS_COUNT),
            sps: HeaderSet::new(h265::MAX_SPS_COUNT),
            pps: HeaderSet::new(h265::MAX_PPS_COUNT),
            supplemental: HashMap::new(),
            wait_for_supplemental: config.wait_for_supplemental,
        }
    }

    pub fn raw_headers(&self) -> &RawHeaderCache {
        &self.raw
    }

    pub fn vps_set(&self) -> &HeaderSet<HevcVps> {
        &self.vps
    }

    pub fn sps_set(&self) -> &HeaderSet<HevcSps> {
        &self.sps
    }

    pub fn pps_set(&self) -> &HeaderSet<HevcPps> {
        &self.pps
    }

    /// 最近一次保存的 SPS
    pub fn active_sps(&self) -> Option<&HevcSps> {
        self.sps.current()
    }

    /// 按 payloadType 取最近一次缓存的 SEI 消息
    pub fn supplemental_payload(&self, payload_type: u32) -> Option<SupplementalPayload> {
        self.supplemental
            .get(&payload_type)
            .map(|bytes| SupplementalPayload {
                payload_type,
                bit_length: bytes.len() * 8,
                bytes: bytes.clone(),
            })
    }

    /// 由缓存的 SEI 组成的 HDR 静态元数据
    pub fn hdr_metadata(&self) -> HdrMetadata {
        HdrMetadata {
            mastering_display: self
                .supplemental
                .get(&SEI_MASTERING_DISPLAY_COLOUR_VOLUME)
                .and_then(|p| parse_mastering_display(p).ok()),
            content_light_level: self
                .supplemental
                .get(&SEI_CONTENT_LIGHT_LEVEL_INFO)
                .and_then(|p| parse_content_light_level(p).ok()),
        }
    }

    fn find_headers(&mut self, data: &[u8]) -> ZhenResult<HevcFound> {
        let mut found = HevcFound::default();
        for unit in AnnexBUnits::<HevcSyntax>::new(data) {
            let t = unit.unit_type;
            if HevcSyntax::is_video_header(t) {
                discard_malformed(self.accept_vps(&unit))?;
            } else if HevcSyntax::is_sequence_header(t) {
                found.headers.sequence |= discard_malformed(self.accept_sps(&unit))?;
            } else if HevcSyntax::is_picture_header(t) {
                found.headers.picture |= discard_malformed(self.accept_pps(&unit))?;
            } else if HevcSyntax::is_supplemental(t) {
                found.supplemental |= discard_malformed(self.accept_sei(&unit))?;
            } else if HevcSyntax::is_coded_slice(t) {
                found.slice = true;
            }
        }
        Ok(found)
    }

    fn accept_vps(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = HevcNalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let vps = h265::parse_hevc_vps(&nal.rbsp())?;
        let id = vps.vps_id as usize;
        log::info!("H.265: 缓存 VPS {}, {} 字节", id, unit.bytes.len());
        self.raw.set_video(unit.bytes)?;
        self.vps.insert(id, vps)?;
        self.vps.set_current(id)
    }

    fn accept_sps(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = HevcNalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let sps = h265::parse_hevc_sps(&nal.rbsp())?;
        let id = sps.sps_id as usize;
        log::info!(
            "H.265: 缓存 SPS {}, {} 字节, {}x{}, profile={}, level={}",
            id,
            unit.bytes.len(),
            sps.width,
            sps.height,
            sps.effective_profile_idc(),
            sps.level_idc()
        );
        self.raw.set_sequence(unit.bytes)?;
        self.sps.insert(id, sps)?;
        self.sps.set_current(id)
    }

    fn accept_pps(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = HevcNalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let rbsp = nal.rbsp();
        let (_, sps_id) = h265::peek_hevc_pps_ids(&rbsp)?;
        let pps = h265::parse_hevc_pps(&rbsp, self.sps.get(sps_id as usize))?;
        let id = pps.pps_id as usize;
        log::info!("H.265: 缓存 PPS {}, {} 字节", id, unit.bytes.len());
        self.raw.set_picture(unit.bytes)?;
        self.pps.insert(id, pps)?;
        self.pps.set_current(id)
    }

    /// 缓存 SEI 中的每条消息, 同类型以新的为准
    ///
    /// HDR 相关的消息先按语法检查, 不合法的单条消息被跳过.
    fn accept_sei(&mut self, unit: &ScannedUnit<'_>) -> ZhenResult<()> {
        let nal = HevcNalUnit::parse(trim_trailing_zeros(unit.payload()))?;
        let rbsp = nal.rbsp();
        for message in split_sei_messages(&rbsp)? {
            let checked = match message.payload_type {
                SEI_MASTERING_DISPLAY_COLOUR_VOLUME => {
                    parse_mastering_display(message.payload).map(drop)
                }
                SEI_CONTENT_LIGHT_LEVEL_INFO => parse_content_light_level(message.payload).map(drop),
                _ => Ok(()),
            };
            if let Err(e) = checked {
                log::warn!("H.265: 跳过 SEI 消息 type={}: {}", message.payload_type, e);
                continue;
            }
            log::debug!(
                "H.265: 缓存 SEI type={}, {} 字节",
                message.payload_type,
                message.payload.len()
            );
            self.supplemental
                .insert(message.payload_type, Bytes::copy_from_slice(message.payload));
        }
        Ok(())
    }
}

impl HeaderHandler for HevcHeaders {
    fn family(&self) -> CodecFamily {
        CodecFamily::Hevc
    }

    fn load_header(
        &mut self,
        state: ConstructorState,
        data: &[u8],
        is_header: bool,
    ) -> ZhenResult<HeaderStep> {
        use ConstructorState::*;

        if is_header {
            let mut state = match state {
                HeaderAwaiting => HeaderCollecting,
                other => other,
            };
            let found = self.find_headers(data)?;
            if state == HeaderWaitingSupplemental && found.supplemental {
                state = HeaderObtained;
            }
            if found.headers.complete() {
                state = match state {
                    Resetting => HeaderObtained,
                    HeaderCollecting
                        if !self.wait_for_supplemental || found.supplemental || found.slice =>
                    {
                        HeaderObtained
                    }
                    HeaderCollecting => HeaderWaitingSupplemental,
                    other => other,
                };
            }
            return Ok(HeaderStep::to(state));
        }

        match state {
            HeaderCollecting => {
                self.find_headers(data)?;
                Ok(HeaderStep::to(HeaderObtained))
            }
            HeaderWaitingSupplemental => {
                let found = self.find_headers(data)?;
                if found.supplemental || found.slice {
                    Ok(HeaderStep::to(HeaderObtained))
                } else {
                    Ok(HeaderStep::to(HeaderWaitingSupplemental))
                }
            }
            Resetting => {
                let found = self.find_headers(data)?;
                if found.headers.complete() {
                    Ok(HeaderStep::to(HeaderObtained))
                } else {
                    Ok(HeaderStep::reinject(HeaderObtained))
                }
            }
            other => Ok(HeaderStep::to(other)),
        }
    }

    fn reinjection(&self) -> Vec<&[u8]> {
        self.raw.reinjection()
    }

    /// 外部给出的 SPS/PPS 不一定与缓存的 VPS 匹配, 因此 VPS 被丢弃
    fn save_header_sets(
        &mut self,
        sequence: Option<&[u8]>,
        picture: Option<&[u8]>,
    ) -> ZhenResult<()> {
        self.raw.clear_video();
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
        self.vps.reset();
        self.sps.reset();
        self.pps.reset();
        self.supplemental.clear();
    }
}

impl FrameConstructor<HevcHeaders> {
    /// 按 payloadType 取最近一次缓存的 SEI 消息
    pub fn supplemental_payload(&self, payload_type: u32) -> Option<SupplementalPayload> {
        self.handler().supplemental_payload(payload_type)
    }

    pub fn hdr_metadata(&self) -> HdrMetadata {
        self.handler().hdr_metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructor::{Chunk, ChunkFlags};
    use crate::parsers::h265::pps::tests::{build_hevc_pps_rbsp, build_hevc_pps_rbsp_with_qp};
    use crate::parsers::h265::sps::tests::{HevcSpsTestInput, build_hevc_sps_rbsp};
    use crate::parsers::h265::vps::tests::build_vps_rbsp;
    use zhen_core::emulation::insert_emulation_prevention;

    fn annex_b(unit_type: u8, rbsp: &[u8]) -> Vec<u8> {
        let mut out = vec![0, 0, 0, 1, unit_type << 1, 0x01];
        out.extend(insert_emulation_prevention(rbsp));
        out
    }

    fn parameter_sets() -> Vec<u8> {
        [
            annex_b(32, &build_vps_rbsp(0, None)),
            annex_b(33, &build_hevc_sps_rbsp(&HevcSpsTestInput::default())),
            annex_b(34, &build_hevc_pps_rbsp(0, 0)),
        ]
        .concat()
    }

    fn hdr_sei() -> Vec<u8> {
        let mut rbsp = vec![0x89, 0x18];
        for v in [8500u16, 39850, 6550, 2300, 35400, 14600, 15635, 16450] {
            rbsp.extend_from_slice(&v.to_be_bytes());
        }
        rbsp.extend_from_slice(&10_000_000u32.to_be_bytes());
        rbsp.extend_from_slice(&50u32.to_be_bytes());
        rbsp.extend([0x90, 0x04, 0x03, 0xE8, 0x01, 0x90, 0x80]);
        annex_b(39, &rbsp)
    }

    fn idr_slice() -> Vec<u8> {
        annex_b(19, &[0xAF, 0x12, 0x34])
    }

    fn hevc(wait: bool) -> FrameConstructor<HevcHeaders> {
        let config = ConstructorConfig {
            wait_for_supplemental: wait,
            ..ConstructorConfig::default()
        };
        FrameConstructor::new(HevcHeaders::new(&config), &config)
    }

    fn feed(fc: &mut FrameConstructor<HevcHeaders>, data: &[u8], flags: ChunkFlags) {
        let mut cycle = fc.load(Chunk::new(data, 0, flags)).unwrap();
        cycle.consume(data.len()).unwrap();
    }

    #[test]
    fn test_waits_for_sei_after_parameter_sets() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut fc = hevc(true);
        feed(&mut fc, &parameter_sets(), ChunkFlags::HEADER);
        assert_eq!(fc.state(), ConstructorState::HeaderWaitingSupplemental);

        feed(&mut fc, &hdr_sei(), ChunkFlags::empty());
        assert_eq!(fc.state(), ConstructorState::HeaderObtained);

        let hdr = fc.hdr_metadata();
        assert_eq!(hdr.mastering_display.unwrap().max_luminance, 10_000_000);
        assert_eq!(hdr.content_light_level.unwrap().max_cll, 1000);
        let cll = fc.supplemental_payload(SEI_CONTENT_LIGHT_LEVEL_INFO).unwrap();
        assert_eq!(cll.bit_length, 32);
        assert_eq!(&cll.bytes[..], &[0x03, 0xE8, 0x01, 0x90]);
    }

    #[test]
    fn test_no_wait_obtains_on_parameter_sets() {
        let mut fc = hevc(false);
        feed(&mut fc, &parameter_sets(), ChunkFlags::HEADER);
        assert_eq!(fc.state(), ConstructorState::HeaderObtained);
        assert_eq!(fc.handler().active_sps().unwrap().width, 1920);
        assert!(fc.handler().raw_headers().video().is_some());
    }

    #[test]
    fn test_slice_in_header_chunk_ends_wait() {
        let mut fc = hevc(true);
        let data = [parameter_sets(), idr_slice()].concat();
        feed(&mut fc, &data, ChunkFlags::HEADER);
        assert_eq!(fc.state(), ConstructorState::HeaderObtained);
    }

    #[test]
    fn test_waiting_stays_without_sei_or_slice() {
        let mut handler = HevcHeaders::new(&ConstructorConfig::default());
        let aud = annex_b(35, &[0x50]);
        let step = handler
            .load_header(ConstructorState::HeaderWaitingSupplemental, &aud, false)
            .unwrap();
        assert_eq!(step, HeaderStep::to(ConstructorState::HeaderWaitingSupplemental));
    }

    #[test]
    fn test_reset_reinjects_video_sequence_picture() {
        let mut fc = hevc(false);
        let headers = parameter_sets();
        feed(&mut fc, &headers, ChunkFlags::HEADER);

        fc.reset();
        let slice = idr_slice();
        let cycle = fc.load(Chunk::new(&slice, 5, ChunkFlags::empty())).unwrap();
        let expected = [headers, slice.clone()].concat();
        assert_eq!(cycle.assembled_buffer().unwrap().unread(), &expected[..]);
        assert_eq!(cycle.state(), ConstructorState::HeaderObtained);
    }

    #[test]
    fn test_save_header_sets_drops_cached_vps() {
        let mut fc = hevc(false);
        feed(&mut fc, &parameter_sets(), ChunkFlags::HEADER);
        fc.save_header_sets(Some(b"sps2"), Some(b"pps2"), true).unwrap();

        let data = [0xAAu8];
        let cycle = fc.load(Chunk::new(&data, 0, ChunkFlags::empty())).unwrap();
        assert_eq!(cycle.assembled_buffer().unwrap().unread(), b"sps2pps2\xAA");
    }

    #[test]
    fn test_malformed_hdr_message_skipped() {
        // 137 负载只有 2 字节, 其后的 144 仍被缓存
        let rbsp = [0x89, 0x02, 0x00, 0x01, 0x90, 0x04, 0x00, 0x10, 0x00, 0x08, 0x80];
        let sei = annex_b(39, &rbsp);
        let mut handler = HevcHeaders::new(&ConstructorConfig::default());
        handler
            .load_header(ConstructorState::HeaderCollecting, &sei, true)
            .unwrap();
        assert!(handler
            .supplemental_payload(SEI_MASTERING_DISPLAY_COLOUR_VOLUME)
            .is_none());
        assert_eq!(handler.hdr_metadata().content_light_level.unwrap().max_fall, 8);
    }

    #[test]
    fn test_close_clears_supplemental() {
        let mut fc = hevc(true);
        feed(&mut fc, &hdr_sei(), ChunkFlags::HEADER);
        assert!(!fc.hdr_metadata().is_empty());
        fc.close();
        assert!(fc.hdr_metadata().is_empty());
        assert_eq!(fc.state(), ConstructorState::HeaderAwaiting);
    }

    #[test]
    fn test_out_of_range_pps_qp_keeps_cached_pps() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut fc = hevc(false);
        feed(&mut fc, &parameter_sets(), ChunkFlags::HEADER);
        let good = annex_b(34, &build_hevc_pps_rbsp(0, 0));
        assert_eq!(fc.handler().raw_headers().picture(), Some(&good[..]));

        for minus26 in [i32::MAX, i32::MIN, -27] {
            // 8 位 SPS 下 -27 同样越界
            let bad = annex_b(34, &build_hevc_pps_rbsp_with_qp(0, 0, minus26));
            feed(&mut fc, &bad, ChunkFlags::HEADER);
            assert_eq!(fc.state(), ConstructorState::HeaderObtained);
            assert_eq!(fc.handler().pps_set().get(0).unwrap().init_qp, 26);
            assert_eq!(fc.handler().raw_headers().picture(), Some(&good[..]));
        }

        // 合法的负 QP 仍可替换缓存
        let hbd = annex_b(
            33,
            &build_hevc_sps_rbsp(&HevcSpsTestInput {
                bit_depth: 10,
                ..Default::default()
            }),
        );
        let low_qp = annex_b(34, &build_hevc_pps_rbsp_with_qp(0, 0, -30));
        feed(&mut fc, &[hbd, low_qp.clone()].concat(), ChunkFlags::HEADER);
        assert_eq!(fc.handler().pps_set().get(0).unwrap().init_qp, -4);
        assert_eq!(fc.handler().raw_headers().picture(), Some(&low_qp[..]));
    }
}
