//! H.265/HEVC PPS (Picture Parameter Set) 解析器.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

use super::ptl::PROFILE_SCC;
use super::scaling_list::{ScalingList, parse_scaling_list_data};
use super::sps::HevcSps;
use super::vui::plus_one;
use crate::parsers::ensure_range;

const CODEC: &str = "H.265";

/// PPS ID 上限 (不含)
pub const MAX_PPS_COUNT: usize = 64;

/// PPS 解析结果
#[derive(Debug, Clone)]
pub struct HevcPps {
    /// pps_pic_parameter_set_id
    pub pps_id: u32,
    /// pps_seq_parameter_set_id
    pub sps_id: u32,
    pub dependent_slice_segments_enabled: bool,
    pub output_flag_present: bool,
    pub num_extra_slice_header_bits: u8,
    pub sign_data_hiding_enabled: bool,
    pub cabac_init_present: bool,
    /// num_ref_idx_l0_default_active_minus1 + 1
    pub num_ref_idx_l0_default_active: u32,
    /// num_ref_idx_l1_default_active_minus1 + 1
    pub num_ref_idx_l1_default_active: u32,
    /// init_qp_minus26 + 26
    pub init_qp: i32,
    pub constrained_intra_pred: bool,
    pub transform_skip_enabled: bool,
    /// cu_qp_delta_enabled_flag 置位时的 diff_cu_qp_delta_depth
    pub diff_cu_qp_delta_depth: Option<u32>,
    pub cb_qp_offset: i32,
    pub cr_qp_offset: i32,
    pub slice_chroma_qp_offsets_present: bool,
    pub weighted_pred: bool,
    pub weighted_bipred: bool,
    pub transquant_bypass_enabled: bool,
    pub entropy_coding_sync_enabled: bool,
    /// tiles_enabled_flag 置位时的分块信息
    pub tiles: Option<TileLayout>,
    pub loop_filter_across_slices_enabled: bool,
    /// deblocking_filter_control_present_flag 置位时的去块滤波控制
    pub deblocking: Option<DeblockingControl>,
    /// pps_scaling_list_data_present_flag 置位时的量化矩阵
    pub scaling_list: Option<ScalingList>,
    pub lists_modification_present: bool,
    /// log2_parallel_merge_level_minus2 + 2
    pub log2_parallel_merge_level: u32,
    pub slice_segment_header_extension_present: bool,
    /// 格式范围扩展
    pub range_extension: Option<PpsRangeExtension>,
    /// 屏幕内容编码扩展
    pub scc_extension: Option<PpsSccExtension>,
}

/// 分块布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    pub num_columns: u32,
    pub num_rows: u32,
    pub uniform_spacing: bool,
    /// 非均匀分块时前 num_columns - 1 列的宽度 (CTB 单位)
    pub column_widths: Vec<u32>,
    /// 非均匀分块时前 num_rows - 1 行的高度 (CTB 单位)
    pub row_heights: Vec<u32>,
    pub loop_filter_across_tiles_enabled: bool,
}

/// 去块滤波控制
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeblockingControl {
    pub override_enabled: bool,
    pub disabled: bool,
    /// pps_beta_offset_div2 * 2
    pub beta_offset: i32,
    /// pps_tc_offset_div2 * 2
    pub tc_offset: i32,
}

/// pps_range_extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsRangeExtension {
    /// transform_skip_enabled_flag 置位时的 log2_max_transform_skip_block_size_minus2
    pub log2_max_transform_skip_block_size_minus2: Option<u32>,
    pub cross_component_prediction_enabled: bool,
    /// chroma_qp_offset_list_enabled_flag 置位时的 diff_cu_chroma_qp_offset_depth
    pub diff_cu_chroma_qp_offset_depth: Option<u32>,
    /// (cb_qp_offset_list, cr_qp_offset_list), 最多 6 项
    pub chroma_qp_offset_list: Vec<(i32, i32)>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}

/// pps_scc_extension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpsSccExtension {
    pub curr_pic_ref_enabled: bool,
    /// residual_adaptive_colour_transform_enabled_flag 置位时的 ACT 参数
    pub act: Option<ActQpOffsets>,
    /// 调色板预测初始值
    pub palette_initializer: Option<PalettePredictorInitializer>,
}

/// 自适应颜色变换的 QP 偏移
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActQpOffsets {
    pub slice_act_qp_offsets_present: bool,
    pub y: i32,
    pub cb: i32,
    pub cr: i32,
}

/// PPS 中的调色板预测初始值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PalettePredictorInitializer {
    pub monochrome: bool,
    pub luma_bit_depth: u32,
    pub chroma_bit_depth: u32,
    /// 按分量存放的初始值, 个数为 0 时为空
    pub values: Vec<Vec<u32>>,
}

/// 只读取 PPS 开头的 (pps_id, sps_id)
pub fn peek_hevc_pps_ids(rbsp: &[u8]) -> ZhenResult<(u32, u32)> {
    let mut br = BitCursor::new(rbsp);
    read_ids(&mut br)
}

fn read_ids(br: &mut BitCursor) -> ZhenResult<(u32, u32)> {
    let pps_id = ensure_range(CODEC, "pps_id", br.read_ue()?, 0..=63)?;
    let sps_id = ensure_range(CODEC, "pps_seq_parameter_set_id", br.read_ue()?, 0..=15)?;
    Ok((pps_id, sps_id))
}

/// 解析 HEVC PPS (RBSP, 不含 NAL 头)
///
/// `sps` 为 PPS 引用的 SPS, 提供 init_qp 下界所需的亮度位深和 SCC 扩展的解析参数.
/// 缺失时 init_qp 按最大位深 14 的下界 -36 校验, SCC 扩展被忽略.
pub fn parse_hevc_pps(rbsp: &[u8], sps: Option<&HevcSps>) -> ZhenResult<HevcPps> {
    if rbsp.is_empty() {
        return Err(ZhenError::MalformedBitstream(
            "H.265: PPS RBSP 为空".into(),
        ));
    }

    let mut br = BitCursor::new(rbsp);
    let (pps_id, sps_id) = read_ids(&mut br)?;

    let dependent_slice_segments_enabled = br.read_flag()?;
    let output_flag_present = br.read_flag()?;
    let num_extra_slice_header_bits = br.read_bits(3)? as u8;
    let sign_data_hiding_enabled = br.read_flag()?;
    let cabac_init_present = br.read_flag()?;
    let num_ref_idx_l0_default_active = ensure_range(
        CODEC,
        "num_ref_idx_l0_default_active",
        br.read_ue()? as u64 + 1,
        1..=15,
    )? as u32;
    let num_ref_idx_l1_default_active = ensure_range(
        CODEC,
        "num_ref_idx_l1_default_active",
        br.read_ue()? as u64 + 1,
        1..=15,
    )? as u32;
    // init_qp_minus26 取值 -(26 + QpBdOffsetY)..=25
    let qp_bd_offset = 6 * (i64::from(sps.map_or(14, |s| s.bit_depth_luma)) - 8);
    let init_qp = ensure_range(
        CODEC,
        "init_qp",
        26 + i64::from(br.read_se()?),
        -qp_bd_offset..=51,
    )? as i32;
    let constrained_intra_pred = br.read_flag()?;
    let transform_skip_enabled = br.read_flag()?;
    let diff_cu_qp_delta_depth = if br.read_flag()? {
        Some(br.read_ue()?)
    } else {
        None
    };
    let cb_qp_offset = ensure_range(CODEC, "pps_cb_qp_offset", br.read_se()?, -12..=12)?;
    let cr_qp_offset = ensure_range(CODEC, "pps_cr_qp_offset", br.read_se()?, -12..=12)?;
    let slice_chroma_qp_offsets_present = br.read_flag()?;
    let weighted_pred = br.read_flag()?;
    let weighted_bipred = br.read_flag()?;
    let transquant_bypass_enabled = br.read_flag()?;
    let tiles_enabled = br.read_flag()?;
    let entropy_coding_sync_enabled = br.read_flag()?;

    let tiles = if tiles_enabled {
        Some(parse_tiles(&mut br)?)
    } else {
        None
    };

    let loop_filter_across_slices_enabled = br.read_flag()?;
    let deblocking = if br.read_flag()? {
        Some(parse_deblocking(&mut br)?)
    } else {
        None
    };

    let scaling_list = if br.read_flag()? {
        Some(parse_scaling_list_data(&mut br)?)
    } else {
        None
    };

    let lists_modification_present = br.read_flag()?;
    let log2_parallel_merge_level = ensure_range(
        CODEC,
        "log2_parallel_merge_level",
        br.read_ue()? as u64 + 2,
        2..=6,
    )? as u32;
    let slice_segment_header_extension_present = br.read_flag()?;

    let mut pps = HevcPps {
        pps_id,
        sps_id,
        dependent_slice_segments_enabled,
        output_flag_present,
        num_extra_slice_header_bits,
        sign_data_hiding_enabled,
        cabac_init_present,
        num_ref_idx_l0_default_active,
        num_ref_idx_l1_default_active,
        init_qp,
        constrained_intra_pred,
        transform_skip_enabled,
        diff_cu_qp_delta_depth,
        cb_qp_offset,
        cr_qp_offset,
        slice_chroma_qp_offsets_present,
        weighted_pred,
        weighted_bipred,
        transquant_bypass_enabled,
        entropy_coding_sync_enabled,
        tiles,
        loop_filter_across_slices_enabled,
        deblocking,
        scaling_list,
        lists_modification_present,
        log2_parallel_merge_level,
        slice_segment_header_extension_present,
        range_extension: None,
        scc_extension: None,
    };

    if br.read_flag()? {
        parse_pps_extensions(&mut br, &mut pps, sps)?;
    }

    Ok(pps)
}

fn parse_tiles(br: &mut BitCursor) -> ZhenResult<TileLayout> {
    let num_columns = plus_one(br.read_ue()?, "num_tile_columns_minus1")?;
    let num_rows = plus_one(br.read_ue()?, "num_tile_rows_minus1")?;
    if num_columns == 1 && num_rows == 1 {
        return Err(ZhenError::MalformedBitstream(
            "H.265: tiles_enabled_flag 置位时分块数不能为 1x1".into(),
        ));
    }
    let uniform_spacing = br.read_flag()?;
    let mut column_widths = Vec::new();
    let mut row_heights = Vec::new();
    if !uniform_spacing {
        for _ in 1..num_columns {
            column_widths.push(plus_one(br.read_ue()?, "column_width_minus1")?);
        }
        for _ in 1..num_rows {
            row_heights.push(plus_one(br.read_ue()?, "row_height_minus1")?);
        }
    }
    Ok(TileLayout {
        num_columns,
        num_rows,
        uniform_spacing,
        column_widths,
        row_heights,
        loop_filter_across_tiles_enabled: br.read_flag()?,
    })
}

fn parse_deblocking(br: &mut BitCursor) -> ZhenResult<DeblockingControl> {
    let mut ctl = DeblockingControl {
        override_enabled: br.read_flag()?,
        disabled: br.read_flag()?,
        ..DeblockingControl::default()
    };
    if !ctl.disabled {
        let beta = br.read_se()?.saturating_mul(2);
        let tc = br.read_se()?.saturating_mul(2);
        ctl.beta_offset = ensure_range(CODEC, "pps_beta_offset", beta, -12..=12)?;
        ctl.tc_offset = ensure_range(CODEC, "pps_tc_offset", tc, -12..=12)?;
    }
    Ok(ctl)
}

fn parse_pps_extensions(
    br: &mut BitCursor,
    pps: &mut HevcPps,
    sps: Option<&HevcSps>,
) -> ZhenResult<()> {
    let range_flag = br.read_flag()?;
    br.skip_bits(2)?; // pps_multilayer_extension_flag, pps_3d_extension_flag
    let scc_flag = br.read_flag()?;
    let _extension_4bits = br.read_bits(4)?;

    if range_flag {
        pps.range_extension = Some(parse_range_extension(br, pps.transform_skip_enabled)?);
    }

    if scc_flag {
        match sps {
            Some(sps) if sps.profile_idc() == PROFILE_SCC => {
                pps.scc_extension = Some(parse_scc_extension(br, sps)?);
            }
            _ => log::debug!("H.265: PPS {} 的 SCC 扩展缺少 SCC SPS, 忽略", pps.pps_id),
        }
    }
    Ok(())
}

fn parse_range_extension(
    br: &mut BitCursor,
    transform_skip_enabled: bool,
) -> ZhenResult<PpsRangeExtension> {
    let mut ext = PpsRangeExtension::default();
    if transform_skip_enabled {
        ext.log2_max_transform_skip_block_size_minus2 = Some(br.read_ue()?);
    }
    ext.cross_component_prediction_enabled = br.read_flag()?;
    if br.read_flag()? {
        ext.diff_cu_chroma_qp_offset_depth = Some(br.read_ue()?);
        let len = ensure_range(
            CODEC,
            "chroma_qp_offset_list_len",
            br.read_ue()? as u64 + 1,
            1..=6,
        )?;
        for _ in 0..len {
            let cb = ensure_range(CODEC, "cb_qp_offset_list", br.read_se()?, -12..=12)?;
            let cr = ensure_range(CODEC, "cr_qp_offset_list", br.read_se()?, -12..=12)?;
            ext.chroma_qp_offset_list.push((cb, cr));
        }
    }
    ext.log2_sao_offset_scale_luma = br.read_ue()?;
    ext.log2_sao_offset_scale_chroma = br.read_ue()?;
    Ok(ext)
}

fn parse_scc_extension(br: &mut BitCursor, sps: &HevcSps) -> ZhenResult<PpsSccExtension> {
    let mut ext = PpsSccExtension {
        curr_pic_ref_enabled: br.read_flag()?,
        ..PpsSccExtension::default()
    };

    if br.read_flag()? {
        let slice_act_qp_offsets_present = br.read_flag()?;
        let y = ensure_range(CODEC, "pps_act_y_qp_offset_plus5", br.read_se()?, -7..=17)? - 5;
        let cb = ensure_range(CODEC, "pps_act_cb_qp_offset_plus5", br.read_se()?, -7..=17)? - 5;
        let cr = ensure_range(CODEC, "pps_act_cr_qp_offset_plus3", br.read_se()?, -9..=15)? - 3;
        ext.act = Some(ActQpOffsets {
            slice_act_qp_offsets_present,
            y,
            cb,
            cr,
        });
    }

    if br.read_flag()? {
        let palette_enabled = sps
            .scc_extension
            .as_ref()
            .is_some_and(|e| e.palette_mode_enabled && e.palette_max_size > 0);
        if !palette_enabled {
            return Err(ZhenError::MalformedBitstream(
                "H.265: SPS 未启用调色板时 PPS 不能携带调色板预测初始值".into(),
            ));
        }
        let count = ensure_range(
            CODEC,
            "pps_num_palette_predictor_initializers",
            br.read_ue()?,
            0..=128,
        )?;
        let mut init = PalettePredictorInitializer::default();
        if count > 0 {
            init.monochrome = br.read_flag()?;
            init.luma_bit_depth =
                ensure_range(CODEC, "luma_bit_depth_entry_minus8", br.read_ue()?, 0..=6)? + 8;
            if !init.monochrome {
                init.chroma_bit_depth =
                    ensure_range(CODEC, "chroma_bit_depth_entry_minus8", br.read_ue()?, 0..=6)?
                        + 8;
            }
            let num_comps = if init.monochrome { 1 } else { 3 };
            for comp in 0..num_comps {
                let bits = if comp == 0 {
                    init.luma_bit_depth
                } else {
                    init.chroma_bit_depth
                };
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(br.read_bits(bits)?);
                }
                init.values.push(values);
            }
        }
        ext.palette_initializer = Some(init);
    }
    Ok(ext)
}
