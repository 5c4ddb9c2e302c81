//! H.265/HEVC VPS (Video Parameter Set) 解析器.
//!
//! VPS 描述整个码流的层/子层结构. 帧组装只需要缓存原始 VPS 单元,
//! 这里解析到 vps_extension_flag 为止, 扩展数据忽略.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

use super::ptl::{ProfileTierLevel, parse_profile_tier_level};
use super::vui::{HevcHrd, HevcTiming, parse_hrd_parameters, parse_timing};
use crate::parsers::ensure_range;

const CODEC: &str = "H.265";

/// VPS ID 上限 (不含)
pub const MAX_VPS_COUNT: usize = 16;
/// 最大子层数
pub const MAX_SUB_LAYERS: u32 = 7;

/// 子层排序信息 (VPS 与 SPS 共用)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubLayerOrdering {
    /// max_dec_pic_buffering_minus1 + 1
    pub max_dec_pic_buffering: u32,
    /// max_num_reorder_pics
    pub max_num_reorder_pics: u32,
    /// max_latency_increase_plus1 - 1, 为 -1 表示无限制
    pub max_latency_increase: i64,
}

/// VPS 中的一组 HRD 参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsHrdEntry {
    /// hrd_layer_set_idx
    pub layer_set_idx: u32,
    /// cprms_present_flag
    pub cprms_present: bool,
    /// HRD 参数
    pub hrd: HevcHrd,
}

/// VPS 解析结果
#[derive(Debug, Clone)]
pub struct HevcVps {
    /// VPS ID
    pub vps_id: u8,
    /// vps_base_layer_internal_flag
    pub base_layer_internal: bool,
    /// vps_base_layer_available_flag
    pub base_layer_available: bool,
    /// vps_max_layers_minus1 + 1
    pub max_layers: u8,
    /// vps_max_sub_layers_minus1 + 1
    pub max_sub_layers: u8,
    /// 时序 ID 嵌套标志
    pub temporal_id_nesting: bool,
    /// profile_tier_level
    pub ptl: ProfileTierLevel,
    /// vps_sub_layer_ordering_info_present_flag
    pub sub_layer_ordering_info_present: bool,
    /// 每个子层的排序信息
    pub sub_layer_ordering: Vec<SubLayerOrdering>,
    /// vps_max_layer_id
    pub max_layer_id: u8,
    /// vps_num_layer_sets_minus1 + 1
    pub num_layer_sets: u32,
    /// 计时信息
    pub timing: Option<HevcTiming>,
    /// HRD 参数列表
    pub hrd: Vec<VpsHrdEntry>,
    /// vps_extension_flag
    pub extension_present: bool,
}

impl HevcVps {
    /// general_profile_idc
    pub fn profile_idc(&self) -> u8 {
        self.ptl.general.profile_idc
    }

    /// general_level_idc
    pub fn level_idc(&self) -> u8 {
        self.ptl.general_level_idc
    }
}

/// 解析 HEVC VPS (RBSP, 不含 NAL 头)
pub fn parse_hevc_vps(rbsp: &[u8]) -> ZhenResult<HevcVps> {
    if rbsp.len() < 2 {
        return Err(ZhenError::MalformedBitstream(
            "H.265: VPS RBSP 太短".into(),
        ));
    }

    let mut br = BitCursor::new(rbsp);

    let vps_id = br.read_bits(4)? as u8;
    let base_layer_internal = br.read_flag()?;
    let base_layer_available = br.read_flag()?;
    let max_layers = br.read_bits(6)? as u8 + 1;
    let max_sub_layers = ensure_range(
        CODEC,
        "vps_max_sub_layers",
        br.read_bits(3)? + 1,
        1..=MAX_SUB_LAYERS,
    )?;
    let temporal_id_nesting = br.read_flag()?;
    if max_sub_layers == 1 && !temporal_id_nesting {
        return Err(ZhenError::MalformedBitstream(
            "H.265: 单子层时 vps_temporal_id_nesting_flag 必须为 1".into(),
        ));
    }
    let reserved = br.read_bits(16)?;
    if reserved != 0xFFFF {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: vps_reserved_0xffff_16bits 非法, value={:#06x}",
            reserved
        )));
    }

    let ptl = parse_profile_tier_level(&mut br, max_sub_layers - 1)?;

    let sub_layer_ordering_info_present = br.read_flag()?;
    let sub_layer_ordering =
        parse_sub_layer_ordering(&mut br, sub_layer_ordering_info_present, max_sub_layers)?;

    let max_layer_id = br.read_bits(6)? as u8;
    let num_layer_sets =
        ensure_range(CODEC, "vps_num_layer_sets_minus1", br.read_ue()?, 0..=1023)? + 1;
    for _ in 1..num_layer_sets {
        // layer_id_included_flag
        br.skip_bits(max_layer_id as usize + 1)?;
    }

    let mut timing = None;
    let mut hrd = Vec::new();
    if br.read_flag()? {
        timing = Some(parse_timing(&mut br)?);
        let num_hrd = ensure_range(
            CODEC,
            "vps_num_hrd_parameters",
            br.read_ue()?,
            0..=num_layer_sets,
        )?;
        for i in 0..num_hrd {
            let layer_set_idx = br.read_ue()?;
            let cprms_present = i == 0 || br.read_flag()?;
            hrd.push(VpsHrdEntry {
                layer_set_idx,
                cprms_present,
                hrd: parse_hrd_parameters(&mut br, cprms_present, max_sub_layers)?,
            });
        }
    }

    let extension_present = br.read_flag()?;

    Ok(HevcVps {
        vps_id,
        base_layer_internal,
        base_layer_available,
        max_layers,
        max_sub_layers: max_sub_layers as u8,
        temporal_id_nesting,
        ptl,
        sub_layer_ordering_info_present,
        sub_layer_ordering,
        max_layer_id,
        num_layer_sets,
        timing,
        hrd,
        extension_present,
    })
}

/// 解析子层排序信息
///
/// 未逐层携带时, 只有最高子层的值出现在码流中, 其余子层复制该值.
pub(crate) fn parse_sub_layer_ordering(
    br: &mut BitCursor,
    info_present: bool,
    max_sub_layers: u32,
) -> ZhenResult<Vec<SubLayerOrdering>> {
    let first = if info_present {
        0
    } else {
        max_sub_layers.saturating_sub(1)
    };
    let mut out: Vec<SubLayerOrdering> = Vec::with_capacity(max_sub_layers as usize);
    for _ in first..max_sub_layers {
        let max_dec_pic_buffering = ensure_range(
            CODEC,
            "max_dec_pic_buffering",
            br.read_ue()? as u64 + 1,
            1..=16,
        )? as u32;
        let max_num_reorder_pics = br.read_ue()?;
        if max_num_reorder_pics > max_dec_pic_buffering {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.265: max_num_reorder_pics 大于 max_dec_pic_buffering, {} > {}",
                max_num_reorder_pics, max_dec_pic_buffering
            )));
        }
        let max_latency_increase = br.read_ue()? as i64 - 1;
        let entry = SubLayerOrdering {
            max_dec_pic_buffering,
            max_num_reorder_pics,
            max_latency_increase,
        };
        if let Some(prev) = out.last() {
            if entry.max_dec_pic_buffering < prev.max_dec_pic_buffering
                || entry.max_num_reorder_pics < prev.max_num_reorder_pics
            {
                return Err(ZhenError::MalformedBitstream(
                    "H.265: 子层排序信息未单调递增".into(),
                ));
            }
        }
        out.push(entry);
    }
    if let Some(&last) = out.last().filter(|_| !info_present) {
        out = vec![last; max_sub_layers as usize];
    }
    Ok(out)
}
