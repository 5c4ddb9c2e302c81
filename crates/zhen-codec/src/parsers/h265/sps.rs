//! H.265/HEVC SPS 解析器.
//!
//! SPS 包含编码视频序列的参数: profile/level, 分辨率, 色度格式, 位深,
//! 编码块/变换块尺寸, 量化矩阵, PCM, 参考图像集, VUI 以及 RExt/SCC 扩展.

use zhen_core::{BitCursor, Rational, ZhenError, ZhenResult};

use super::ptl::{PROFILE_MAIN_10, PROFILE_SCC, ProfileTierLevel, parse_profile_tier_level};
use super::rps::{ShortTermRps, parse_short_term_ref_pic_set};
use super::scaling_list::{ScalingList, parse_scaling_list_data};
use super::vps::{MAX_SUB_LAYERS, SubLayerOrdering, parse_sub_layer_ordering};
use super::vui::{DisplayWindow, HevcVui, VuiContext, check_window, parse_vui, scaled};
use crate::parsers::ensure_range;

const CODEC: &str = "H.265";

/// SPS ID 上限 (不含)
pub const MAX_SPS_COUNT: usize = 16;
/// SPS 中短期 RPS 的最大个数
pub const MAX_SHORT_TERM_RPS: u32 = 64;
/// SPS 中长期参考图像的最大个数
pub const MAX_LONG_TERM_REF_PICS: u32 = 32;

/// SPS 解析结果
#[derive(Debug, Clone)]
pub struct HevcSps {
    /// SPS 所引用的 VPS ID
    pub vps_id: u8,
    /// sps_max_sub_layers_minus1 + 1
    pub max_sub_layers: u8,
    /// sps_temporal_id_nesting_flag
    pub temporal_id_nesting: bool,
    /// profile_tier_level
    pub ptl: ProfileTierLevel,
    /// SPS ID
    pub sps_id: u32,
    /// 色度格式 (0=单色, 1=4:2:0, 2=4:2:2, 3=4:4:4)
    pub chroma_format_idc: u32,
    /// separate_colour_plane_flag
    pub separate_colour_plane: bool,
    /// 原始宽度 (pic_width_in_luma_samples)
    pub pic_width: u32,
    /// 原始高度 (pic_height_in_luma_samples)
    pub pic_height: u32,
    /// conformance window (亮度样本单位)
    pub conformance_window: Option<DisplayWindow>,
    /// 图像宽度 (像素, 已应用 conformance window)
    pub width: u32,
    /// 图像高度 (像素, 已应用 conformance window)
    pub height: u32,
    /// 亮度位深
    pub bit_depth_luma: u32,
    /// 色度位深
    pub bit_depth_chroma: u32,
    /// log2_max_pic_order_cnt_lsb
    pub log2_max_poc_lsb: u32,
    /// sps_sub_layer_ordering_info_present_flag
    pub sub_layer_ordering_info_present: bool,
    /// 每个子层的排序信息 (长度等于 max_sub_layers)
    pub sub_layer_ordering: Vec<SubLayerOrdering>,
    /// MinCbLog2SizeY
    pub log2_min_cb_size: u32,
    /// CtbLog2SizeY
    pub log2_ctb_size: u32,
    /// log2_min_luma_transform_block_size
    pub log2_min_tb_size: u32,
    /// log2_max_luma_transform_block_size
    pub log2_max_tb_size: u32,
    /// max_transform_hierarchy_depth_inter
    pub max_transform_hierarchy_depth_inter: u32,
    /// max_transform_hierarchy_depth_intra
    pub max_transform_hierarchy_depth_intra: u32,
    /// scaling_list_enabled_flag
    pub scaling_list_enabled: bool,
    /// sps_scaling_list_data_present_flag 置位时的量化矩阵
    pub scaling_list: Option<ScalingList>,
    /// amp_enabled_flag
    pub amp_enabled: bool,
    /// sample_adaptive_offset_enabled_flag
    pub sao_enabled: bool,
    /// PCM 参数
    pub pcm: Option<PcmParams>,
    /// 短期参考图像集
    pub short_term_rps: Vec<ShortTermRps>,
    /// 长期参考图像 (long_term_ref_pics_present_flag 置位时)
    pub long_term_ref_pics: Option<Vec<LongTermRefPic>>,
    /// sps_temporal_mvp_enabled_flag
    pub temporal_mvp_enabled: bool,
    /// strong_intra_smoothing_enabled_flag
    pub strong_intra_smoothing: bool,
    /// VUI 参数
    pub vui: Option<HevcVui>,
    /// 格式范围扩展
    pub range_extension: Option<SpsRangeExtension>,
    /// 屏幕内容编码扩展
    pub scc_extension: Option<SpsSccExtension>,
}

/// PCM 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParams {
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub log2_min_size: u32,
    pub log2_max_size: u32,
    pub loop_filter_disabled: bool,
}

/// SPS 中的一个长期参考图像候选
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermRefPic {
    /// lt_ref_pic_poc_lsb_sps
    pub poc_lsb: u32,
    /// used_by_curr_pic_lt_sps_flag
    pub used_by_curr_pic: bool,
}

/// sps_range_extension
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled: bool,
    pub transform_skip_context_enabled: bool,
    pub implicit_rdpcm_enabled: bool,
    pub explicit_rdpcm_enabled: bool,
    pub extended_precision_processing: bool,
    pub intra_smoothing_disabled: bool,
    pub high_precision_offsets_enabled: bool,
    pub persistent_rice_adaptation_enabled: bool,
    pub cabac_bypass_alignment_enabled: bool,
}

/// sps_scc_extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpsSccExtension {
    /// sps_curr_pic_ref_enabled_flag
    pub curr_pic_ref_enabled: bool,
    /// palette_mode_enabled_flag
    pub palette_mode_enabled: bool,
    /// palette_max_size
    pub palette_max_size: u32,
    /// delta_palette_max_predictor_size
    pub delta_palette_max_predictor_size: u32,
    /// 调色板预测初始值, 按分量存放 (单色时只有 1 个分量)
    pub palette_predictor_initializers: Vec<Vec<u32>>,
    /// motion_vector_resolution_control_idc
    pub motion_vector_resolution_control_idc: u8,
    /// intra_boundary_filtering_disabled_flag
    pub intra_boundary_filtering_disabled: bool,
}

impl HevcSps {
    /// general_profile_idc
    pub fn profile_idc(&self) -> u8 {
        self.ptl.general.profile_idc
    }

    /// 按位深修正后的 profile: 位深超过 8 但声明为 Main 时视为 Main 10
    pub fn effective_profile_idc(&self) -> u8 {
        let profile = self.profile_idc();
        if (self.bit_depth_luma > 8 || self.bit_depth_chroma > 8) && profile < PROFILE_MAIN_10 {
            PROFILE_MAIN_10
        } else {
            profile
        }
    }

    /// general_level_idc (原始值)
    pub fn level_idc(&self) -> u8 {
        self.ptl.general_level_idc
    }

    /// ChromaArrayType
    pub fn chroma_array_type(&self) -> u32 {
        if self.separate_colour_plane {
            0
        } else {
            self.chroma_format_idc
        }
    }

    /// 最高子层的 max_dec_pic_buffering
    pub fn max_dec_pic_buffering(&self) -> u32 {
        self.sub_layer_ordering
            .last()
            .map_or(0, |o| o.max_dec_pic_buffering)
    }

    /// 帧率 (VUI timing_info 存在时)
    pub fn fps(&self) -> Option<Rational> {
        self.vui.as_ref()?.timing?.fps()
    }

    /// 样本宽高比, 未携带时为 1:1
    pub fn sar(&self) -> Rational {
        self.vui
            .as_ref()
            .map_or(Rational::new(1, 1), |vui| vui.sar)
    }
}

/// (SubWidthC, SubHeightC)
fn chroma_subsampling(chroma_array_type: u32) -> (u32, u32) {
    match chroma_array_type {
        1 => (2, 2),
        2 => (2, 1),
        _ => (1, 1),
    }
}

/// 解析 HEVC SPS (RBSP, 不含 NAL 头)
pub fn parse_hevc_sps(rbsp: &[u8]) -> ZhenResult<HevcSps> {
    if rbsp.len() < 3 {
        return Err(ZhenError::MalformedBitstream(
            "H.265: SPS RBSP 太短".into(),
        ));
    }

    let mut br = BitCursor::new(rbsp);

    let vps_id = br.read_bits(4)? as u8;
    let max_sub_layers = ensure_range(
        CODEC,
        "sps_max_sub_layers",
        br.read_bits(3)? + 1,
        1..=MAX_SUB_LAYERS,
    )?;
    let temporal_id_nesting = br.read_flag()?;
    if max_sub_layers == 1 && !temporal_id_nesting {
        return Err(ZhenError::MalformedBitstream(
            "H.265: 单子层时 sps_temporal_id_nesting_flag 必须为 1".into(),
        ));
    }

    let ptl = parse_profile_tier_level(&mut br, max_sub_layers - 1)?;

    let sps_id = ensure_range(CODEC, "sps_id", br.read_ue()?, 0..=15)?;
    let chroma_format_idc = ensure_range(CODEC, "chroma_format_idc", br.read_ue()?, 0..=3)?;
    let separate_colour_plane = chroma_format_idc == 3 && br.read_flag()?;
    let chroma_array_type = if separate_colour_plane {
        0
    } else {
        chroma_format_idc
    };
    let (sub_width_c, sub_height_c) = chroma_subsampling(chroma_array_type);

    let pic_width = br.read_ue()?;
    let pic_height = br.read_ue()?;
    if pic_width == 0 || pic_height == 0 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: 图像尺寸非法, {}x{}",
            pic_width, pic_height
        )));
    }

    let mut conformance_window = None;
    let (mut width, mut height) = (pic_width, pic_height);
    if br.read_flag()? {
        let window = DisplayWindow {
            left: scaled(br.read_ue()?, sub_width_c),
            right: scaled(br.read_ue()?, sub_width_c),
            top: scaled(br.read_ue()?, sub_height_c),
            bottom: scaled(br.read_ue()?, sub_height_c),
        };
        check_window(&window, pic_width, pic_height, "conformance_window")?;
        width = pic_width - window.left - window.right;
        height = pic_height - window.top - window.bottom;
        conformance_window = Some(window);
    }

    let bit_depth_luma =
        ensure_range(CODEC, "bit_depth_luma", br.read_ue()? as u64 + 8, 8..=14)? as u32;
    let bit_depth_chroma =
        ensure_range(CODEC, "bit_depth_chroma", br.read_ue()? as u64 + 8, 8..=14)? as u32;
    let log2_max_poc_lsb =
        ensure_range(CODEC, "log2_max_pic_order_cnt_lsb", br.read_ue()? as u64 + 4, 4..=16)?
            as u32;

    let sub_layer_ordering_info_present = br.read_flag()?;
    let sub_layer_ordering =
        parse_sub_layer_ordering(&mut br, sub_layer_ordering_info_present, max_sub_layers)?;

    // 编码块与变换块尺寸
    let log2_min_cb_size =
        ensure_range(CODEC, "log2_min_luma_coding_block_size_minus3", br.read_ue()?, 0..=3)? + 3;
    let min_cb_size = 1u32 << log2_min_cb_size;
    if pic_width % min_cb_size != 0 || pic_height % min_cb_size != 0 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: 图像尺寸不是 MinCbSizeY 的整数倍, {}x{}, MinCbSizeY={}",
            pic_width, pic_height, min_cb_size
        )));
    }
    let log2_diff_cb =
        ensure_range(CODEC, "log2_diff_max_min_luma_coding_block_size", br.read_ue()?, 0..=3)?;
    let log2_ctb_size = ensure_range(CODEC, "CtbLog2SizeY", log2_min_cb_size + log2_diff_cb, 4..=6)?;

    let log2_min_tb_size = br.read_ue()? as u64 + 2;
    if log2_min_tb_size >= log2_min_cb_size as u64 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: log2_min_luma_transform_block_size 超出范围, value={}",
            log2_min_tb_size
        )));
    }
    let log2_min_tb_size = log2_min_tb_size as u32;
    let log2_max_tb_size = ensure_range(
        CODEC,
        "log2_max_luma_transform_block_size",
        br.read_ue()? as u64 + log2_min_tb_size as u64,
        0..=log2_ctb_size.min(5) as u64,
    )? as u32;
    let max_depth = log2_ctb_size - log2_min_tb_size;
    let max_transform_hierarchy_depth_inter = ensure_range(
        CODEC,
        "max_transform_hierarchy_depth_inter",
        br.read_ue()?,
        0..=max_depth,
    )?;
    let max_transform_hierarchy_depth_intra = ensure_range(
        CODEC,
        "max_transform_hierarchy_depth_intra",
        br.read_ue()?,
        0..=max_depth,
    )?;

    let scaling_list_enabled = br.read_flag()?;
    let scaling_list = if scaling_list_enabled && br.read_flag()? {
        Some(parse_scaling_list_data(&mut br)?)
    } else {
        None
    };

    let amp_enabled = br.read_flag()?;
    let sao_enabled = br.read_flag()?;
    let pcm = if br.read_flag()? {
        Some(parse_pcm(
            &mut br,
            bit_depth_luma,
            bit_depth_chroma,
            log2_min_cb_size,
            log2_ctb_size,
        )?)
    } else {
        None
    };

    let num_short_term_rps = ensure_range(
        CODEC,
        "num_short_term_ref_pic_sets",
        br.read_ue()?,
        0..=MAX_SHORT_TERM_RPS,
    )? as usize;
    let max_dpb = sub_layer_ordering
        .last()
        .map_or(0, |o| o.max_dec_pic_buffering);
    let mut short_term_rps = Vec::with_capacity(num_short_term_rps);
    for idx in 0..num_short_term_rps {
        let rps = parse_short_term_ref_pic_set(&mut br, idx, num_short_term_rps, &short_term_rps)?;
        if rps.num_negative > max_dpb || rps.num_positive > max_dpb - rps.num_negative {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.265: RPS[{}] 图像数超过 DPB 大小, negative={}, positive={}, dpb={}",
                idx, rps.num_negative, rps.num_positive, max_dpb
            )));
        }
        short_term_rps.push(rps);
    }

    let long_term_ref_pics = if br.read_flag()? {
        let count = ensure_range(
            CODEC,
            "num_long_term_ref_pics_sps",
            br.read_ue()?,
            0..=MAX_LONG_TERM_REF_PICS,
        )?;
        let mut pics = Vec::with_capacity(count as usize);
        for _ in 0..count {
            pics.push(LongTermRefPic {
                poc_lsb: br.read_bits(log2_max_poc_lsb)?,
                used_by_curr_pic: br.read_flag()?,
            });
        }
        Some(pics)
    } else {
        None
    };

    let temporal_mvp_enabled = br.read_flag()?;
    let strong_intra_smoothing = br.read_flag()?;

    let vui = if br.read_flag()? {
        let ctx = VuiContext {
            sub_width_c,
            sub_height_c,
            pic_width,
            pic_height,
            max_sub_layers,
        };
        Some(parse_vui(&mut br, &ctx)?)
    } else {
        None
    };

    let mut sps = HevcSps {
        vps_id,
        max_sub_layers: max_sub_layers as u8,
        temporal_id_nesting,
        ptl,
        sps_id,
        chroma_format_idc,
        separate_colour_plane,
        pic_width,
        pic_height,
        conformance_window,
        width,
        height,
        bit_depth_luma,
        bit_depth_chroma,
        log2_max_poc_lsb,
        sub_layer_ordering_info_present,
        sub_layer_ordering,
        log2_min_cb_size,
        log2_ctb_size,
        log2_min_tb_size,
        log2_max_tb_size,
        max_transform_hierarchy_depth_inter,
        max_transform_hierarchy_depth_intra,
        scaling_list_enabled,
        scaling_list,
        amp_enabled,
        sao_enabled,
        pcm,
        short_term_rps,
        long_term_ref_pics,
        temporal_mvp_enabled,
        strong_intra_smoothing,
        vui,
        range_extension: None,
        scc_extension: None,
    };

    if br.read_flag()? {
        parse_sps_extensions(&mut br, &mut sps)?;
    }

    Ok(sps)
}

fn parse_pcm(
    br: &mut BitCursor,
    bit_depth_luma: u32,
    bit_depth_chroma: u32,
    log2_min_cb_size: u32,
    log2_ctb_size: u32,
) -> ZhenResult<PcmParams> {
    let pcm_luma = ensure_range(
        CODEC,
        "pcm_sample_bit_depth_luma",
        br.read_bits(4)? + 1,
        1..=bit_depth_luma,
    )?;
    let pcm_chroma = ensure_range(
        CODEC,
        "pcm_sample_bit_depth_chroma",
        br.read_bits(4)? + 1,
        1..=bit_depth_chroma,
    )?;
    let upper = log2_ctb_size.min(5);
    let log2_min_size = ensure_range(
        CODEC,
        "log2_min_pcm_luma_coding_block_size",
        br.read_ue()? as u64 + 3,
        log2_min_cb_size.min(5) as u64..=upper as u64,
    )? as u32;
    let log2_max_size = ensure_range(
        CODEC,
        "log2_max_pcm_luma_coding_block_size",
        br.read_ue()? as u64 + log2_min_size as u64,
        0..=upper as u64,
    )? as u32;
    Ok(PcmParams {
        bit_depth_luma: pcm_luma,
        bit_depth_chroma: pcm_chroma,
        log2_min_size,
        log2_max_size,
        loop_filter_disabled: br.read_flag()?,
    })
}

/// 解析 sps_range_extension / sps_scc_extension, 其余扩展数据忽略
fn parse_sps_extensions(br: &mut BitCursor, sps: &mut HevcSps) -> ZhenResult<()> {
    let range_flag = br.read_flag()?;
    br.skip_bits(2)?; // sps_multilayer_extension_flag, sps_3d_extension_flag
    let scc_flag = br.read_flag()?;
    let _extension_4bits = br.read_bits(4)?;

    if range_flag {
        sps.range_extension = Some(SpsRangeExtension {
            transform_skip_rotation_enabled: br.read_flag()?,
            transform_skip_context_enabled: br.read_flag()?,
            implicit_rdpcm_enabled: br.read_flag()?,
            explicit_rdpcm_enabled: br.read_flag()?,
            extended_precision_processing: br.read_flag()?,
            intra_smoothing_disabled: br.read_flag()?,
            high_precision_offsets_enabled: br.read_flag()?,
            persistent_rice_adaptation_enabled: br.read_flag()?,
            cabac_bypass_alignment_enabled: br.read_flag()?,
        });
    }

    if scc_flag {
        if sps.profile_idc() != PROFILE_SCC {
            log::debug!(
                "H.265: 非 SCC profile 携带 sps_scc_extension, profile_idc={}, 忽略",
                sps.profile_idc()
            );
            return Ok(());
        }
        sps.scc_extension = Some(parse_scc_extension(br, sps)?);
    }
    Ok(())
}

fn parse_scc_extension(br: &mut BitCursor, sps: &HevcSps) -> ZhenResult<SpsSccExtension> {
    let mut ext = SpsSccExtension {
        curr_pic_ref_enabled: br.read_flag()?,
        palette_mode_enabled: br.read_flag()?,
        ..SpsSccExtension::default()
    };

    if ext.palette_mode_enabled {
        ext.palette_max_size = ensure_range(CODEC, "palette_max_size", br.read_ue()?, 0..=64)?;
        ext.delta_palette_max_predictor_size = ensure_range(
            CODEC,
            "delta_palette_max_predictor_size",
            br.read_ue()?,
            0..=128 - ext.palette_max_size,
        )?;
        if ext.palette_max_size == 0 && ext.delta_palette_max_predictor_size != 0 {
            return Err(ZhenError::MalformedBitstream(
                "H.265: palette_max_size 为 0 时 delta_palette_max_predictor_size 必须为 0".into(),
            ));
        }
        let initializer_present = br.read_flag()?;
        if initializer_present {
            let max_predictor = ext.palette_max_size + ext.delta_palette_max_predictor_size;
            if max_predictor == 0 {
                return Err(ZhenError::MalformedBitstream(
                    "H.265: palette_max_size 为 0 时不能携带调色板预测初始值".into(),
                ));
            }
            let count = ensure_range(
                CODEC,
                "sps_num_palette_predictor_initializers_minus1",
                br.read_ue()?,
                0..=max_predictor - 1,
            )? + 1;
            let num_comps = if sps.chroma_format_idc == 0 { 1 } else { 3 };
            for comp in 0..num_comps {
                let bits = if comp == 0 {
                    sps.bit_depth_luma
                } else {
                    sps.bit_depth_chroma
                };
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(br.read_bits(bits)?);
                }
                ext.palette_predictor_initializers.push(values);
            }
        }
    }

    ext.motion_vector_resolution_control_idc = ensure_range(
        CODEC,
        "motion_vector_resolution_control_idc",
        br.read_bits(2)? as u8,
        0..=2,
    )?;
    ext.intra_boundary_filtering_disabled = br.read_flag()?;
    Ok(ext)
}
