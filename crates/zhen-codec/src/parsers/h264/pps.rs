//! H.264 PPS (Picture Parameter Set) 解析.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

use super::sps::{Sps, default_scaling_lists_4x4, default_scaling_lists_8x8, parse_scaling_matrix};
use crate::parsers::ensure_range;

const CODEC: &str = "H.264";

/// PPS ID 上限 (不含)
pub const MAX_PPS_COUNT: usize = 256;

/// slice group 映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceGroupMap {
    /// 类型 0: 交织
    Interleaved { run_length: Vec<u32> },
    /// 类型 1: 分散
    Dispersed,
    /// 类型 2: 前景与剩余
    Foreground { top_left: Vec<u32>, bottom_right: Vec<u32> },
    /// 类型 3..=5: 盒形 / 光栅 / 擦除
    Changing {
        map_type: u32,
        change_direction: bool,
        change_rate: u32,
    },
    /// 类型 6: 显式
    Explicit { slice_group_id: Vec<u32> },
}

/// PPS 解析结果
#[derive(Debug, Clone)]
pub struct Pps {
    /// pic_parameter_set_id
    pub pps_id: u32,
    /// 引用的 SPS ID
    pub sps_id: u32,
    /// entropy_coding_mode_flag (0=CAVLC, 1=CABAC)
    pub entropy_coding_mode: bool,
    /// bottom_field_pic_order_in_frame_present_flag
    pub pic_order_present: bool,
    /// num_slice_groups_minus1 + 1
    pub num_slice_groups: u32,
    /// slice group 映射 (仅 num_slice_groups > 1)
    pub slice_group_map: Option<SliceGroupMap>,
    /// num_ref_idx_l0_default_active_minus1 + 1
    pub num_ref_idx_l0_default_active: u32,
    /// num_ref_idx_l1_default_active_minus1 + 1
    pub num_ref_idx_l1_default_active: u32,
    /// weighted_pred_flag
    pub weighted_pred: bool,
    /// weighted_bipred_idc
    pub weighted_bipred_idc: u32,
    /// 26 + pic_init_qp_minus26
    pub pic_init_qp: i32,
    /// 26 + pic_init_qs_minus26
    pub pic_init_qs: i32,
    /// chroma_qp_index_offset
    pub chroma_qp_index_offset: i32,
    /// deblocking_filter_control_present_flag
    pub deblocking_filter_control: bool,
    /// constrained_intra_pred_flag
    pub constrained_intra_pred: bool,
    /// redundant_pic_cnt_present_flag
    pub redundant_pic_cnt_present: bool,
    /// transform_8x8_mode_flag
    pub transform_8x8_mode: bool,
    /// second_chroma_qp_index_offset (缺省等于 chroma_qp_index_offset)
    pub second_chroma_qp_index_offset: i32,
    /// PPS 级 4x4 量化矩阵 (仅 pic_scaling_matrix_present_flag=1)
    pub scaling_list_4x4: Option<[[u8; 16]; 6]>,
    /// PPS 级 8x8 量化矩阵
    pub scaling_list_8x8: Option<Vec<[u8; 64]>>,
}

/// 从 RBSP 数据 (不含 NAL 头) 解析 PPS
///
/// `sps` 为该 PPS 引用的 SPS, 用于 pic_init_qp 的下界、量化矩阵的回退规则与 4:4:4 的 8x8 列表数.
/// 缺少 SPS 时按 4:2:0 与默认矩阵处理, pic_init_qp 按最大位深 14 的下界 -36 校验.
pub fn parse_pps(rbsp: &[u8], sps: Option<&Sps>) -> ZhenResult<Pps> {
    if rbsp.is_empty() {
        return Err(ZhenError::MalformedBitstream(
            "H.264: PPS RBSP 为空".into(),
        ));
    }

    let mut br = BitCursor::new(rbsp);
    let pps_id = ensure_range(CODEC, "pps_id", br.read_ue()?, 0..=255)?;
    let sps_id = ensure_range(CODEC, "sps_id", br.read_ue()?, 0..=31)?;

    let entropy_coding_mode = br.read_flag()?;
    let pic_order_present = br.read_flag()?;

    let num_slice_groups =
        ensure_range(CODEC, "num_slice_groups_minus1", br.read_ue()?, 0..=7)? + 1;
    let slice_group_map = if num_slice_groups > 1 {
        Some(parse_slice_group_map(&mut br, num_slice_groups)?)
    } else {
        None
    };

    let num_ref_idx_l0_default_active = ensure_range(
        CODEC,
        "num_ref_idx_l0_default_active_minus1",
        br.read_ue()?,
        0..=31,
    )? + 1;
    let num_ref_idx_l1_default_active = ensure_range(
        CODEC,
        "num_ref_idx_l1_default_active_minus1",
        br.read_ue()?,
        0..=31,
    )? + 1;

    let weighted_pred = br.read_flag()?;
    let weighted_bipred_idc = br.read_bits(2)?;
    if weighted_bipred_idc > 2 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: weighted_bipred_idc 非法, value={}",
            weighted_bipred_idc
        )));
    }

    // pic_init_qp_minus26 取值 -(26 + QpBdOffsetY)..=25, pic_init_qs_minus26 固定为 -26..=25
    let qp_bd_offset = 6 * (i64::from(sps.map_or(14, |s| s.bit_depth_luma)) - 8);
    let pic_init_qp = ensure_range(
        CODEC,
        "pic_init_qp",
        26 + i64::from(br.read_se()?),
        -qp_bd_offset..=51,
    )? as i32;
    let pic_init_qs =
        ensure_range(CODEC, "pic_init_qs", 26 + i64::from(br.read_se()?), 0..=51)? as i32;
    let chroma_qp_index_offset =
        ensure_range(CODEC, "chroma_qp_index_offset", br.read_se()?, -12..=12)?;

    let deblocking_filter_control = br.read_flag()?;
    let constrained_intra_pred = br.read_flag()?;
    let redundant_pic_cnt_present = br.read_flag()?;

    let mut transform_8x8_mode = false;
    let mut second_chroma_qp_index_offset = chroma_qp_index_offset;
    let mut scaling_list_4x4 = None;
    let mut scaling_list_8x8 = None;

    if br.more_rbsp_data() {
        transform_8x8_mode = br.read_flag()?;
        if br.read_flag()? {
            let chroma_format_idc = sps.map_or(1, |s| s.chroma_format_idc);
            let list_count = 6 + if transform_8x8_mode {
                if chroma_format_idc == 3 { 6 } else { 2 }
            } else {
                0
            };
            let mut list4x4 = default_scaling_lists_4x4();
            let mut list8x8 = default_scaling_lists_8x8(chroma_format_idc);
            // 回退规则 B: SPS 携带量化矩阵时以 SPS 为回退来源
            let fallback = sps
                .filter(|s| s.scaling_matrix_present)
                .map(|s| (&s.scaling_list_4x4, s.scaling_list_8x8.as_slice()));
            parse_scaling_matrix(&mut br, list_count, fallback, &mut list4x4, &mut list8x8)?;
            scaling_list_4x4 = Some(list4x4);
            scaling_list_8x8 = Some(list8x8);
        }
        second_chroma_qp_index_offset =
            ensure_range(CODEC, "second_chroma_qp_index_offset", br.read_se()?, -12..=12)?;
    }

    Ok(Pps {
        pps_id,
        sps_id,
        entropy_coding_mode,
        pic_order_present,
        num_slice_groups,
        slice_group_map,
        num_ref_idx_l0_default_active,
        num_ref_idx_l1_default_active,
        weighted_pred,
        weighted_bipred_idc,
        pic_init_qp,
        pic_init_qs,
        chroma_qp_index_offset,
        deblocking_filter_control,
        constrained_intra_pred,
        redundant_pic_cnt_present,
        transform_8x8_mode,
        second_chroma_qp_index_offset,
        scaling_list_4x4,
        scaling_list_8x8,
    })
}

/// 只读取 PPS 开头的 pps_id 与 sps_id
pub fn peek_pps_ids(rbsp: &[u8]) -> ZhenResult<(u32, u32)> {
    let mut br = BitCursor::new(rbsp);
    let pps_id = ensure_range(CODEC, "pps_id", br.read_ue()?, 0..=255)?;
    let sps_id = ensure_range(CODEC, "sps_id", br.read_ue()?, 0..=31)?;
    Ok((pps_id, sps_id))
}

fn parse_slice_group_map(br: &mut BitCursor, num_slice_groups: u32) -> ZhenResult<SliceGroupMap> {
    let map_type = br.read_ue()?;
    let map = match map_type {
        0 => {
            let mut run_length = Vec::with_capacity(num_slice_groups as usize);
            for _ in 0..num_slice_groups {
                run_length.push(br.read_ue()?.saturating_add(1));
            }
            SliceGroupMap::Interleaved { run_length }
        }
        1 => SliceGroupMap::Dispersed,
        2 => {
            let mut top_left = Vec::new();
            let mut bottom_right = Vec::new();
            for _ in 1..num_slice_groups {
                top_left.push(br.read_ue()?);
                bottom_right.push(br.read_ue()?);
            }
            SliceGroupMap::Foreground {
                top_left,
                bottom_right,
            }
        }
        3..=5 => SliceGroupMap::Changing {
            map_type,
            change_direction: br.read_flag()?,
            change_rate: br.read_ue()?.saturating_add(1),
        },
        6 => {
            let pic_size_in_map_units = br.read_ue()? as usize + 1;
            if pic_size_in_map_units > br.bits_left() {
                return Err(ZhenError::MalformedBitstream(format!(
                    "H.264: pic_size_in_map_units 超出剩余数据, value={}",
                    pic_size_in_map_units
                )));
            }
            let bits_per_id = bits_for_slice_group_id(num_slice_groups);
            let mut slice_group_id = Vec::with_capacity(pic_size_in_map_units);
            for _ in 0..pic_size_in_map_units {
                slice_group_id.push(if bits_per_id > 0 {
                    br.read_bits(bits_per_id)?
                } else {
                    0
                });
            }
            SliceGroupMap::Explicit { slice_group_id }
        }
        _ => {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.264: slice_group_map_type 非法, value={}",
                map_type
            )));
        }
    };
    Ok(map)
}

fn bits_for_slice_group_id(group_count: u32) -> u32 {
    if group_count <= 1 {
        0
    } else {
        u32::BITS - (group_count - 1).leading_zeros()
    }
}
