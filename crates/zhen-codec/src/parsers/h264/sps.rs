//! H.264 SPS (Sequence Parameter Set) 解析器.
//!
//! SPS 包含编码视频序列的全局参数, 包括:
//! - Profile / Level (编码规格)
//! - 图像宽度和高度 (以宏块为单位, 需要 cropping 调整)
//! - 色度格式与位深
//! - 量化矩阵 (scaling list)
//! - VUI: 宽高比、色彩描述、计时信息、HRD、码流限制

use zhen_core::{BitCursor, Rational, ZhenError, ZhenResult};

use crate::parsers::ensure_range;

const CODEC: &str = "H.264";

/// SPS ID 上限 (不含)
pub const MAX_SPS_COUNT: usize = 32;

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct Sps {
    /// profile_idc (编码规格, 如 66=Baseline, 77=Main, 100=High)
    pub profile_idc: u8,
    /// constraint_set 标志位
    pub constraint_set_flags: u8,
    /// level_idc (编码级别, 如 30=3.0, 41=4.1)
    pub level_idc: u8,
    /// SPS ID (seq_parameter_set_id)
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// 亮度位深 (通常 8)
    pub bit_depth_luma: u32,
    /// 色度位深 (通常 8)
    pub bit_depth_chroma: u32,
    /// qpprime_y_zero_transform_bypass_flag
    pub qpprime_y_zero_transform_bypass: bool,
    /// 是否显式携带量化矩阵
    pub scaling_matrix_present: bool,
    /// 4x4 量化矩阵列表 (6 组, 已应用默认/回退规则).
    pub scaling_list_4x4: [[u8; 16]; 6],
    /// 8x8 量化矩阵列表 (4:2:0/4:2:2 为 2 组, 4:4:4 为 6 组).
    pub scaling_list_8x8: Vec<[u8; 64]>,
    /// log2(max_frame_num)
    pub log2_max_frame_num: u32,
    /// 图像顺序计数类型 (0, 1, 2)
    pub poc_type: u32,
    /// log2(max_pic_order_cnt_lsb) (仅 poc_type==0)
    pub log2_max_poc_lsb: u32,
    /// `poc_type==1` 时的 delta_pic_order_always_zero_flag.
    pub delta_pic_order_always_zero_flag: bool,
    /// `poc_type==1` 时的 offset_for_non_ref_pic.
    pub offset_for_non_ref_pic: i32,
    /// `poc_type==1` 时的 offset_for_top_to_bottom_field.
    pub offset_for_top_to_bottom_field: i32,
    /// `poc_type==1` 时的 offset_for_ref_frame 列表.
    pub offset_for_ref_frame: Vec<i32>,
    /// 最大参考帧数
    pub max_num_ref_frames: u32,
    /// gaps_in_frame_num_value_allowed_flag.
    pub gaps_in_frame_num_value_allowed_flag: bool,
    /// 宽度 (宏块数)
    pub pic_width_in_mbs: u32,
    /// 高度 (map unit 数)
    pub pic_height_in_map_units: u32,
    /// 是否为帧编码 (非场编码)
    pub frame_mbs_only: bool,
    /// mb_adaptive_frame_field_flag
    pub mb_adaptive_frame_field: bool,
    /// direct_8x8_inference_flag
    pub direct_8x8_inference: bool,
    /// cropping 偏移 (左, 右, 上, 下), 单位为 crop unit
    pub crop: [u32; 4],
    /// 图像宽度 (像素, 已应用 cropping)
    pub width: u32,
    /// 图像高度 (像素, 已应用 cropping)
    pub height: u32,
    /// VUI 参数
    pub vui: Option<Vui>,
}

impl Sps {
    /// 帧率 (VUI timing_info 存在时)
    pub fn fps(&self) -> Option<Rational> {
        self.vui.as_ref().and_then(Vui::fps)
    }

    /// 样本宽高比, 未携带时为 1:1
    pub fn sar(&self) -> Rational {
        self.vui
            .as_ref()
            .map_or(Rational::new(1, 1), |vui| vui.sar)
    }
}

/// VUI (Video Usability Information)
#[derive(Debug, Clone, Default)]
pub struct Vui {
    /// aspect_ratio_idc (未携带时为 0)
    pub aspect_ratio_idc: u8,
    /// SAR (Sample Aspect Ratio, 像素宽高比)
    pub sar: Rational,
    /// overscan_appropriate_flag
    pub overscan_appropriate: Option<bool>,
    /// 视频信号类型
    pub video_signal: Option<VideoSignal>,
    /// chroma_sample_loc_type (顶场, 底场)
    pub chroma_sample_loc: Option<(u32, u32)>,
    /// 计时信息
    pub timing: Option<Timing>,
    /// NAL HRD
    pub nal_hrd: Option<Hrd>,
    /// VCL HRD
    pub vcl_hrd: Option<Hrd>,
    /// low_delay_hrd_flag
    pub low_delay_hrd: bool,
    /// pic_struct_present_flag
    pub pic_struct_present: bool,
    /// 码流限制
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

impl Vui {
    /// H.264 定义: fps = time_scale / (2 * num_units_in_tick)
    pub fn fps(&self) -> Option<Rational> {
        self.timing
            .map(|t| Rational::new(t.time_scale, t.num_units_in_tick.saturating_mul(2)))
    }
}

/// 视频信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSignal {
    /// video_format
    pub video_format: u8,
    /// video_full_range_flag
    pub full_range: bool,
    /// colour_primaries (未携带时为 2)
    pub colour_primaries: u8,
    /// transfer_characteristics (未携带时为 2)
    pub transfer_characteristics: u8,
    /// matrix_coefficients (未携带时为 2)
    pub matrix_coefficients: u8,
}

/// 计时信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// num_units_in_tick
    pub num_units_in_tick: u32,
    /// time_scale
    pub time_scale: u32,
    /// fixed_frame_rate_flag
    pub fixed_frame_rate: bool,
}

/// HRD (Hypothetical Reference Decoder) 参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hrd {
    /// bit_rate_scale
    pub bit_rate_scale: u8,
    /// cpb_size_scale
    pub cpb_size_scale: u8,
    /// 每个 CPB 的 bit_rate_value_minus1 + 1
    pub bit_rate_value: Vec<u32>,
    /// 每个 CPB 的 cpb_size_value_minus1 + 1
    pub cpb_size_value: Vec<u32>,
    /// 每个 CPB 的 cbr_flag
    pub cbr_flag: Vec<bool>,
    /// initial_cpb_removal_delay_length_minus1 + 1
    pub initial_cpb_removal_delay_length: u8,
    /// cpb_removal_delay_length_minus1 + 1
    pub cpb_removal_delay_length: u8,
    /// dpb_output_delay_length_minus1 + 1
    pub dpb_output_delay_length: u8,
    /// time_offset_length
    pub time_offset_length: u8,
}

/// 码流限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamRestriction {
    /// motion_vectors_over_pic_boundaries_flag
    pub motion_vectors_over_pic_boundaries: bool,
    /// max_bytes_per_pic_denom
    pub max_bytes_per_pic_denom: u32,
    /// max_bits_per_mb_denom
    pub max_bits_per_mb_denom: u32,
    /// log2_max_mv_length_horizontal
    pub log2_max_mv_length_horizontal: u32,
    /// log2_max_mv_length_vertical
    pub log2_max_mv_length_vertical: u32,
    /// max_num_reorder_frames
    pub max_num_reorder_frames: u32,
    /// max_dec_frame_buffering
    pub max_dec_frame_buffering: u32,
}

/// 预定义的 SAR 表 (ITU-T H.264 表 E-1)
pub(crate) const SAR_TABLE: [(u32, u32); 17] = [
    (0, 0),    // 0: 未指定
    (1, 1),    // 1: 1:1
    (12, 11),  // 2: 12:11
    (10, 11),  // 3: 10:11
    (16, 11),  // 4: 16:11
    (40, 33),  // 5: 40:33
    (24, 11),  // 6: 24:11
    (20, 11),  // 7: 20:11
    (32, 11),  // 8: 32:11
    (80, 33),  // 9: 80:33
    (18, 11),  // 10: 18:11
    (15, 11),  // 11: 15:11
    (64, 33),  // 12: 64:33
    (160, 99), // 13: 160:99
    (4, 3),    // 14: 4:3
    (3, 2),    // 15: 3:2
    (2, 1),    // 16: 2:1
];

/// Extended_SAR
pub(crate) const EXTENDED_SAR: u8 = 255;

pub(crate) const DEFAULT_SCALING_4X4_INTRA: [u8; 16] = [
    6, 13, 20, 28, 13, 20, 28, 32, 20, 28, 32, 37, 28, 32, 37, 42,
];

pub(crate) const DEFAULT_SCALING_4X4_INTER: [u8; 16] = [
    10, 14, 20, 24, 14, 20, 24, 27, 20, 24, 27, 30, 24, 27, 30, 34,
];

pub(crate) const DEFAULT_SCALING_8X8_INTRA: [u8; 64] = [
    6, 10, 13, 16, 18, 23, 25, 27, 10, 11, 16, 18, 23, 25, 27, 29, 13, 16, 18, 23, 25, 27, 29, 31,
    16, 18, 23, 25, 27, 29, 31, 33, 18, 23, 25, 27, 29, 31, 33, 36, 23, 25, 27, 29, 31, 33, 36, 38,
    25, 27, 29, 31, 33, 36, 38, 40, 27, 29, 31, 33, 36, 38, 40, 42,
];

pub(crate) const DEFAULT_SCALING_8X8_INTER: [u8; 64] = [
    9, 13, 15, 17, 19, 21, 22, 24, 13, 13, 17, 19, 21, 22, 24, 25, 15, 17, 19, 21, 22, 24, 25, 27,
    17, 19, 21, 22, 24, 25, 27, 28, 19, 21, 22, 24, 25, 27, 28, 30, 21, 22, 24, 25, 27, 28, 30, 32,
    22, 24, 25, 27, 28, 30, 32, 33, 24, 25, 27, 28, 30, 32, 33, 35,
];

/// 从 RBSP 数据 (不含 NAL 头) 解析 SPS
pub fn parse_sps(rbsp: &[u8]) -> ZhenResult<Sps> {
    if rbsp.len() < 3 {
        return Err(ZhenError::MalformedBitstream(
            "H.264: SPS RBSP 太短".into(),
        ));
    }

    let mut br = BitCursor::new(rbsp);

    let profile_idc = br.read_bits(8)? as u8;
    let constraint_set_flags = br.read_bits(8)? as u8;
    let level_idc = br.read_bits(8)? as u8;
    let sps_id = ensure_range(CODEC, "sps_id", br.read_ue()?, 0..=31)?;

    let mut chroma_format_idc = 1; // 默认 4:2:0
    let mut separate_colour_plane = false;
    let mut bit_depth_luma = 8;
    let mut bit_depth_chroma = 8;
    let mut qpprime_y_zero_transform_bypass = false;
    let mut scaling_matrix_present = false;
    let mut scaling_list_4x4 = default_scaling_lists_4x4();
    let mut scaling_list_8x8 = default_scaling_lists_8x8(chroma_format_idc);

    // High profile 及以上有额外字段
    if is_high_profile(profile_idc) {
        chroma_format_idc = ensure_range(CODEC, "chroma_format_idc", br.read_ue()?, 0..=3)?;
        if chroma_format_idc == 3 {
            separate_colour_plane = br.read_flag()?;
        }
        scaling_list_8x8 = default_scaling_lists_8x8(chroma_format_idc);
        bit_depth_luma = ensure_range(CODEC, "bit_depth_luma", br.read_ue()? as u64 + 8, 8..=14)? as u32;
        bit_depth_chroma =
            ensure_range(CODEC, "bit_depth_chroma", br.read_ue()? as u64 + 8, 8..=14)? as u32;
        qpprime_y_zero_transform_bypass = br.read_flag()?;

        scaling_matrix_present = br.read_flag()?;
        if scaling_matrix_present {
            let list_count = if chroma_format_idc != 3 { 8 } else { 12 };
            parse_scaling_matrix(
                &mut br,
                list_count,
                None,
                &mut scaling_list_4x4,
                &mut scaling_list_8x8,
            )?;
        }
    }

    let log2_max_frame_num =
        ensure_range(CODEC, "log2_max_frame_num_minus4", br.read_ue()?, 0..=12)? + 4;

    let poc_type = br.read_ue()?;
    if poc_type > 2 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: pic_order_cnt_type 非法, value={}",
            poc_type
        )));
    }
    let mut log2_max_poc_lsb = 0u32;
    let mut delta_pic_order_always_zero_flag = false;
    let mut offset_for_non_ref_pic = 0i32;
    let mut offset_for_top_to_bottom_field = 0i32;
    let mut offset_for_ref_frame = Vec::new();
    match poc_type {
        0 => {
            log2_max_poc_lsb = ensure_range(
                CODEC,
                "log2_max_pic_order_cnt_lsb_minus4",
                br.read_ue()?,
                0..=12,
            )? + 4;
        }
        1 => {
            delta_pic_order_always_zero_flag = br.read_flag()?;
            offset_for_non_ref_pic = br.read_se()?;
            offset_for_top_to_bottom_field = br.read_se()?;
            let num_ref_in_poc = ensure_range(
                CODEC,
                "num_ref_frames_in_pic_order_cnt_cycle",
                br.read_ue()?,
                0..=255,
            )?;
            offset_for_ref_frame.reserve(num_ref_in_poc as usize);
            for _ in 0..num_ref_in_poc {
                offset_for_ref_frame.push(br.read_se()?);
            }
        }
        _ => {} // poc_type == 2: 无额外字段
    }

    let max_num_ref_frames = ensure_range(CODEC, "max_num_ref_frames", br.read_ue()?, 0..=16)?;
    let gaps_in_frame_num_value_allowed_flag = br.read_flag()?;

    // 图像尺寸 (宏块单位)
    let pic_width_in_mbs = br.read_ue()? as u64 + 1;
    let pic_height_in_map_units = br.read_ue()? as u64 + 1;
    if pic_width_in_mbs > 1024 || pic_height_in_map_units > 1024 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: 图像尺寸超出范围, mbs={}x{}",
            pic_width_in_mbs, pic_height_in_map_units
        )));
    }
    let pic_width_in_mbs = pic_width_in_mbs as u32;
    let pic_height_in_map_units = pic_height_in_map_units as u32;

    let frame_mbs_only = br.read_flag()?;
    let mb_adaptive_frame_field = if frame_mbs_only {
        false
    } else {
        br.read_flag()?
    };
    let direct_8x8_inference = br.read_flag()?;

    let mut crop = [0u32; 4];
    if br.read_flag()? {
        for slot in crop.iter_mut() {
            *slot = br.read_ue()?;
        }
    }

    // 计算像素尺寸
    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (crop_unit_x, crop_unit_y) = cropping_unit(chroma_array_type, frame_mbs_only);
    let raw_width = pic_width_in_mbs * 16;
    let raw_height = pic_height_in_map_units * if frame_mbs_only { 16 } else { 32 };
    let crop_x = (crop[0] as u64 + crop[1] as u64) * crop_unit_x as u64;
    let crop_y = (crop[2] as u64 + crop[3] as u64) * crop_unit_y as u64;
    if crop_x >= raw_width as u64 || crop_y >= raw_height as u64 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: 裁剪参数非法, raw={}x{}, crop_x={}, crop_y={}",
            raw_width, raw_height, crop_x, crop_y
        )));
    }
    let width = raw_width - crop_x as u32;
    let height = raw_height - crop_y as u32;

    let vui = if br.read_flag()? {
        Some(parse_vui(&mut br)?)
    } else {
        None
    };

    Ok(Sps {
        profile_idc,
        constraint_set_flags,
        level_idc,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        bit_depth_luma,
        bit_depth_chroma,
        qpprime_y_zero_transform_bypass,
        scaling_matrix_present,
        scaling_list_4x4,
        scaling_list_8x8,
        log2_max_frame_num,
        poc_type,
        log2_max_poc_lsb,
        delta_pic_order_always_zero_flag,
        offset_for_non_ref_pic,
        offset_for_top_to_bottom_field,
        offset_for_ref_frame,
        max_num_ref_frames,
        gaps_in_frame_num_value_allowed_flag,
        pic_width_in_mbs,
        pic_height_in_map_units,
        frame_mbs_only,
        mb_adaptive_frame_field,
        direct_8x8_inference,
        crop,
        width,
        height,
        vui,
    })
}

// ============================================================
// 辅助函数
// ============================================================

/// 是否为 High Profile 或更高
fn is_high_profile(profile_idc: u8) -> bool {
    matches!(
        profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    )
}

/// 获取 cropping 单位
fn cropping_unit(chroma_array_type: u32, frame_mbs_only: bool) -> (u32, u32) {
    let sub_width = match chroma_array_type {
        1 | 2 => 2,
        _ => 1,
    };
    let sub_height = if chroma_array_type == 1 { 2 } else { 1 };
    let height_mult = if frame_mbs_only { 1 } else { 2 };

    (sub_width, sub_height * height_mult)
}

pub(crate) fn default_scaling_lists_4x4() -> [[u8; 16]; 6] {
    [
        DEFAULT_SCALING_4X4_INTRA,
        DEFAULT_SCALING_4X4_INTRA,
        DEFAULT_SCALING_4X4_INTRA,
        DEFAULT_SCALING_4X4_INTER,
        DEFAULT_SCALING_4X4_INTER,
        DEFAULT_SCALING_4X4_INTER,
    ]
}

pub(crate) fn default_scaling_lists_8x8(chroma_format_idc: u32) -> Vec<[u8; 64]> {
    let list_count = if chroma_format_idc == 3 { 6 } else { 2 };
    (0..list_count).map(default_scaling_list_8x8_by_idx).collect()
}

fn default_scaling_list_4x4_by_idx(idx: usize) -> [u8; 16] {
    if idx < 3 {
        DEFAULT_SCALING_4X4_INTRA
    } else {
        DEFAULT_SCALING_4X4_INTER
    }
}

fn default_scaling_list_8x8_by_idx(idx: usize) -> [u8; 64] {
    if idx % 2 == 0 {
        DEFAULT_SCALING_8X8_INTRA
    } else {
        DEFAULT_SCALING_8X8_INTER
    }
}

/// 解析量化矩阵
///
/// `fallback` 为 PPS 中回退规则 A 使用的 SPS 矩阵 (list 0/3/6/7 缺省时取 SPS 的值),
/// SPS 自身传 `None`, 使用默认矩阵 (回退规则 A 的 SPS 版本).
pub(crate) fn parse_scaling_matrix(
    br: &mut BitCursor,
    list_count: usize,
    fallback: Option<(&[[u8; 16]; 6], &[[u8; 64]])>,
    scaling_list_4x4: &mut [[u8; 16]; 6],
    scaling_list_8x8: &mut [[u8; 64]],
) -> ZhenResult<()> {
    for list_idx in 0..list_count {
        let present = br.read_flag()?;
        if !present {
            apply_absent_fallback(list_idx, fallback, scaling_list_4x4, scaling_list_8x8)?;
            continue;
        }

        if list_idx < 6 {
            let mut list = [0u8; 16];
            let use_default = parse_scaling_list(br, &mut list)?;
            scaling_list_4x4[list_idx] = if use_default {
                default_scaling_list_4x4_by_idx(list_idx)
            } else {
                list
            };
        } else {
            let idx8 = list_idx - 6;
            let slot = scaling_list_8x8.get_mut(idx8).ok_or_else(|| {
                ZhenError::MalformedBitstream(format!(
                    "H.264: scaling_list_8x8 索引越界, idx={}",
                    idx8
                ))
            })?;
            let mut list = [0u8; 64];
            let use_default = parse_scaling_list(br, &mut list)?;
            *slot = if use_default {
                default_scaling_list_8x8_by_idx(idx8)
            } else {
                list
            };
        }
    }
    Ok(())
}

fn apply_absent_fallback(
    list_idx: usize,
    fallback: Option<(&[[u8; 16]; 6], &[[u8; 64]])>,
    scaling_list_4x4: &mut [[u8; 16]; 6],
    scaling_list_8x8: &mut [[u8; 64]],
) -> ZhenResult<()> {
    if list_idx < 6 {
        scaling_list_4x4[list_idx] = match (list_idx, fallback) {
            (0 | 3, Some((sps_4x4, _))) => sps_4x4[list_idx],
            (0 | 3, None) => default_scaling_list_4x4_by_idx(list_idx),
            _ => scaling_list_4x4[list_idx - 1],
        };
        return Ok(());
    }

    let idx8 = list_idx - 6;
    if idx8 >= scaling_list_8x8.len() {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: scaling_list_8x8 索引越界, idx={}",
            idx8
        )));
    }
    scaling_list_8x8[idx8] = match (idx8, fallback) {
        (0 | 1, Some((_, sps_8x8))) => sps_8x8
            .get(idx8)
            .copied()
            .unwrap_or_else(|| default_scaling_list_8x8_by_idx(idx8)),
        (0 | 1, None) => default_scaling_list_8x8_by_idx(idx8),
        _ => scaling_list_8x8[idx8 - 2],
    };
    Ok(())
}

/// 解析单个 scaling_list, 返回 useDefaultScalingMatrixFlag
fn parse_scaling_list(br: &mut BitCursor, list: &mut [u8]) -> ZhenResult<bool> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    let mut use_default = false;
    for (idx, slot) in list.iter_mut().enumerate() {
        if next_scale != 0 {
            let delta_scale = ensure_range(CODEC, "delta_scale", br.read_se()?, -128..=127)?;
            next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
            if idx == 0 && next_scale == 0 {
                use_default = true;
            }
        }
        let cur_scale = if next_scale == 0 {
            last_scale
        } else {
            next_scale
        };
        *slot = cur_scale as u8;
        last_scale = cur_scale;
    }
    Ok(use_default)
}

/// 解析 VUI 参数
fn parse_vui(br: &mut BitCursor) -> ZhenResult<Vui> {
    let mut vui = Vui {
        sar: Rational::new(1, 1),
        ..Vui::default()
    };

    if br.read_flag()? {
        let ar_idc = br.read_bits(8)? as u8;
        vui.aspect_ratio_idc = ar_idc;
        vui.sar = read_sample_aspect_ratio(br, ar_idc)?;
    }

    if br.read_flag()? {
        vui.overscan_appropriate = Some(br.read_flag()?);
    }

    if br.read_flag()? {
        vui.video_signal = Some(read_video_signal(br)?);
    }

    if br.read_flag()? {
        let top = ensure_range(CODEC, "chroma_sample_loc_type_top_field", br.read_ue()?, 0..=5)?;
        let bottom = ensure_range(
            CODEC,
            "chroma_sample_loc_type_bottom_field",
            br.read_ue()?,
            0..=5,
        )?;
        vui.chroma_sample_loc = Some((top, bottom));
    }

    if br.read_flag()? {
        let num_units_in_tick = br.read_bits(32)?;
        let time_scale = br.read_bits(32)?;
        if num_units_in_tick == 0 {
            return Err(ZhenError::MalformedBitstream(
                "H.264: VUI num_units_in_tick 不能为 0".into(),
            ));
        }
        if time_scale == 0 {
            return Err(ZhenError::MalformedBitstream(
                "H.264: VUI time_scale 不能为 0".into(),
            ));
        }
        vui.timing = Some(Timing {
            num_units_in_tick,
            time_scale,
            fixed_frame_rate: br.read_flag()?,
        });
    }

    if br.read_flag()? {
        vui.nal_hrd = Some(parse_hrd(br)?);
    }
    if br.read_flag()? {
        vui.vcl_hrd = Some(parse_hrd(br)?);
    }
    if vui.nal_hrd.is_some() || vui.vcl_hrd.is_some() {
        vui.low_delay_hrd = br.read_flag()?;
    }
    vui.pic_struct_present = br.read_flag()?;

    if br.read_flag()? {
        let motion_vectors_over_pic_boundaries = br.read_flag()?;
        let max_bytes_per_pic_denom =
            ensure_range(CODEC, "max_bytes_per_pic_denom", br.read_ue()?, 0..=16)?;
        let max_bits_per_mb_denom =
            ensure_range(CODEC, "max_bits_per_mb_denom", br.read_ue()?, 0..=16)?;
        let log2_max_mv_length_horizontal =
            ensure_range(CODEC, "log2_max_mv_length_horizontal", br.read_ue()?, 0..=16)?;
        let log2_max_mv_length_vertical =
            ensure_range(CODEC, "log2_max_mv_length_vertical", br.read_ue()?, 0..=16)?;
        let max_num_reorder_frames = br.read_ue()?;
        let max_dec_frame_buffering =
            ensure_range(CODEC, "max_dec_frame_buffering", br.read_ue()?, 0..=16)?;
        if max_num_reorder_frames > max_dec_frame_buffering {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.264: max_num_reorder_frames 大于 max_dec_frame_buffering, {} > {}",
                max_num_reorder_frames, max_dec_frame_buffering
            )));
        }
        vui.bitstream_restriction = Some(BitstreamRestriction {
            motion_vectors_over_pic_boundaries,
            max_bytes_per_pic_denom,
            max_bits_per_mb_denom,
            log2_max_mv_length_horizontal,
            log2_max_mv_length_vertical,
            max_num_reorder_frames,
            max_dec_frame_buffering,
        });
    }

    Ok(vui)
}

/// 按 aspect_ratio_idc 读取 SAR, 两种编码格式共用
pub(crate) fn read_sample_aspect_ratio(br: &mut BitCursor, ar_idc: u8) -> ZhenResult<Rational> {
    if ar_idc == EXTENDED_SAR {
        let sar_w = br.read_bits(16)?;
        let sar_h = br.read_bits(16)?;
        if sar_w == 0 || sar_h == 0 {
            return Err(ZhenError::MalformedBitstream(format!(
                "VUI Extended_SAR 非法, sar_w={}, sar_h={}",
                sar_w, sar_h
            )));
        }
        return Ok(Rational::new(sar_w, sar_h));
    }
    match SAR_TABLE.get(ar_idc as usize) {
        Some(&(w, h)) => Ok(Rational::new(w, h)),
        None => Err(ZhenError::MalformedBitstream(format!(
            "VUI aspect_ratio_idc 非法, value={}",
            ar_idc
        ))),
    }
}

/// 读取 video_signal_type, 两种编码格式共用
pub(crate) fn read_video_signal(br: &mut BitCursor) -> ZhenResult<VideoSignal> {
    let video_format = br.read_bits(3)? as u8;
    let full_range = br.read_flag()?;
    let mut signal = VideoSignal {
        video_format,
        full_range,
        colour_primaries: 2,
        transfer_characteristics: 2,
        matrix_coefficients: 2,
    };
    if br.read_flag()? {
        signal.colour_primaries = br.read_bits(8)? as u8;
        signal.transfer_characteristics = br.read_bits(8)? as u8;
        signal.matrix_coefficients = br.read_bits(8)? as u8;
    }
    Ok(signal)
}

fn parse_hrd(br: &mut BitCursor) -> ZhenResult<Hrd> {
    let cpb_cnt = ensure_range(CODEC, "cpb_cnt_minus1", br.read_ue()?, 0..=31)? as usize + 1;
    let mut hrd = Hrd {
        bit_rate_scale: br.read_bits(4)? as u8,
        cpb_size_scale: br.read_bits(4)? as u8,
        bit_rate_value: Vec::with_capacity(cpb_cnt),
        cpb_size_value: Vec::with_capacity(cpb_cnt),
        cbr_flag: Vec::with_capacity(cpb_cnt),
        ..Hrd::default()
    };
    for _ in 0..cpb_cnt {
        hrd.bit_rate_value
            .push(br.read_ue()?.checked_add(1).ok_or_else(|| {
                ZhenError::MalformedBitstream("H.264: bit_rate_value_minus1 溢出".into())
            })?);
        hrd.cpb_size_value
            .push(br.read_ue()?.checked_add(1).ok_or_else(|| {
                ZhenError::MalformedBitstream("H.264: cpb_size_value_minus1 溢出".into())
            })?);
        hrd.cbr_flag.push(br.read_flag()?);
    }
    hrd.initial_cpb_removal_delay_length = br.read_bits(5)? as u8 + 1;
    hrd.cpb_removal_delay_length = br.read_bits(5)? as u8 + 1;
    hrd.dpb_output_delay_length = br.read_bits(5)? as u8 + 1;
    hrd.time_offset_length = br.read_bits(5)? as u8;
    Ok(hrd)
}
