//! H.265 SEI 解析.
//!
//! 解析 HDR10 静态元数据: mastering_display_colour_volume (类型 137)
//! 与 content_light_level_info (类型 144).

use serde::Serialize;
use zhen_core::{BitCursor, ZhenError, ZhenResult};

use crate::parsers::sei::{SeiMessage, split_sei_messages};

/// mastering_display_colour_volume
pub const SEI_MASTERING_DISPLAY_COLOUR_VOLUME: u32 = 137;
/// content_light_level_info
pub const SEI_CONTENT_LIGHT_LEVEL_INFO: u32 = 144;

/// 母版显示器色域信息
///
/// 色度坐标单位为 0.00002, 亮度单位为 0.0001 cd/m².
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MasteringDisplayColourVolume {
    /// 三基色 (x, y), 按 G/B/R 顺序
    pub display_primaries: [(u16, u16); 3],
    /// 白点 (x, y)
    pub white_point: (u16, u16),
    pub max_luminance: u32,
    pub min_luminance: u32,
}

/// 内容亮度信息 (cd/m²)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentLightLevel {
    pub max_cll: u16,
    pub max_fall: u16,
}

/// 一个 SEI NAL 中携带的 HDR 静态元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HdrMetadata {
    pub mastering_display: Option<MasteringDisplayColourVolume>,
    pub content_light_level: Option<ContentLightLevel>,
}

impl HdrMetadata {
    pub fn is_empty(&self) -> bool {
        self.mastering_display.is_none() && self.content_light_level.is_none()
    }
}

/// 拆分 SEI NAL 的 RBSP
pub fn parse_sei(rbsp: &[u8]) -> ZhenResult<Vec<SeiMessage<'_>>> {
    split_sei_messages(rbsp)
}

/// 解析 mastering_display_colour_volume 负载
pub fn parse_mastering_display(payload: &[u8]) -> ZhenResult<MasteringDisplayColourVolume> {
    ensure_len(payload, 24, "mastering_display_colour_volume")?;
    let mut br = BitCursor::new(payload);
    let mut info = MasteringDisplayColourVolume::default();
    for primary in &mut info.display_primaries {
        *primary = (br.read_bits(16)? as u16, br.read_bits(16)? as u16);
    }
    info.white_point = (br.read_bits(16)? as u16, br.read_bits(16)? as u16);
    info.max_luminance = br.read_bits(32)?;
    info.min_luminance = br.read_bits(32)?;
    Ok(info)
}

/// 解析 content_light_level_info 负载
pub fn parse_content_light_level(payload: &[u8]) -> ZhenResult<ContentLightLevel> {
    ensure_len(payload, 4, "content_light_level_info")?;
    let mut br = BitCursor::new(payload);
    Ok(ContentLightLevel {
        max_cll: br.read_bits(16)? as u16,
        max_fall: br.read_bits(16)? as u16,
    })
}

/// 从 SEI RBSP 中提取 HDR 静态元数据, 同类型只取第一条
pub fn parse_hdr_metadata(rbsp: &[u8]) -> ZhenResult<HdrMetadata> {
    let mut hdr = HdrMetadata::default();
    for message in split_sei_messages(rbsp)? {
        match message.payload_type {
            SEI_MASTERING_DISPLAY_COLOUR_VOLUME if hdr.mastering_display.is_none() => {
                hdr.mastering_display = Some(parse_mastering_display(message.payload)?);
            }
            SEI_CONTENT_LIGHT_LEVEL_INFO if hdr.content_light_level.is_none() => {
                hdr.content_light_level = Some(parse_content_light_level(message.payload)?);
            }
            _ => {}
        }
    }
    Ok(hdr)
}

fn ensure_len(payload: &[u8], need: usize, name: &str) -> ZhenResult<()> {
    if payload.len() < need {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: {} 负载太短, len={}, need={}",
            name,
            payload.len(),
            need
        )));
    }
    Ok(())
}
