//! HEVC VUI 与 HRD 参数解析.

use zhen_core::{BitCursor, Rational, ZhenError, ZhenResult};

use crate::parsers::ensure_range;
use crate::parsers::h264::sps::{EXTENDED_SAR, SAR_TABLE, VideoSignal, read_video_signal};

const CODEC: &str = "H.265";

/// 每个子层最多的 CPB 数
pub const MAX_CPB_COUNT: u32 = 32;

/// HRD 参数 (hrd_parameters)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HevcHrd {
    /// nal_hrd_parameters_present_flag
    pub nal_hrd_present: bool,
    /// vcl_hrd_parameters_present_flag
    pub vcl_hrd_present: bool,
    /// sub_pic_hrd_params_present_flag 置位时的子图像参数
    pub sub_pic: Option<SubPicHrdParams>,
    /// bit_rate_scale
    pub bit_rate_scale: u8,
    /// cpb_size_scale
    pub cpb_size_scale: u8,
    /// cpb_size_du_scale
    pub cpb_size_du_scale: u8,
    /// initial_cpb_removal_delay_length_minus1 + 1
    pub initial_cpb_removal_delay_length: u8,
    /// au_cpb_removal_delay_length_minus1 + 1
    pub au_cpb_removal_delay_length: u8,
    /// dpb_output_delay_length_minus1 + 1
    pub dpb_output_delay_length: u8,
    /// 每个子层的参数
    pub sub_layers: Vec<SubLayerHrd>,
}

impl Default for HevcHrd {
    fn default() -> Self {
        Self {
            nal_hrd_present: false,
            vcl_hrd_present: false,
            sub_pic: None,
            bit_rate_scale: 0,
            cpb_size_scale: 0,
            cpb_size_du_scale: 0,
            initial_cpb_removal_delay_length: 24,
            au_cpb_removal_delay_length: 24,
            dpb_output_delay_length: 24,
            sub_layers: Vec::new(),
        }
    }
}

/// 子图像级 HRD 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPicHrdParams {
    /// tick_divisor_minus2 + 2
    pub tick_divisor: u32,
    /// du_cpb_removal_delay_increment_length_minus1 + 1
    pub du_cpb_removal_delay_increment_length: u8,
    /// sub_pic_cpb_params_in_pic_timing_sei_flag
    pub cpb_params_in_pic_timing_sei: bool,
    /// dpb_output_delay_du_length_minus1 + 1
    pub dpb_output_delay_du_length: u8,
}

/// 子层 HRD 参数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerHrd {
    /// fixed_pic_rate_general_flag
    pub fixed_pic_rate_general: bool,
    /// fixed_pic_rate_within_cvs_flag
    pub fixed_pic_rate_within_cvs: bool,
    /// elemental_duration_in_tc_minus1 + 1 (固定帧率时)
    pub elemental_duration_in_tc: Option<u32>,
    /// low_delay_hrd_flag
    pub low_delay: bool,
    /// cpb_cnt_minus1 + 1
    pub cpb_cnt: u32,
    /// NAL HRD 的 CPB 参数
    pub nal: Vec<CpbParams>,
    /// VCL HRD 的 CPB 参数
    pub vcl: Vec<CpbParams>,
}

/// 单个 CPB 的参数 (sub_layer_hrd_parameters 中的一项)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpbParams {
    pub bit_rate_value: u32,
    pub cpb_size_value: u32,
    /// 子图像 HRD 存在时的 (bit_rate_du_value, cpb_size_du_value)
    pub du_values: Option<(u32, u32)>,
    pub cbr: bool,
}

/// 显示窗口偏移 (亮度样本单位)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayWindow {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// VUI / VPS 计时信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcTiming {
    /// num_units_in_tick
    pub num_units_in_tick: u32,
    /// time_scale
    pub time_scale: u32,
    /// num_ticks_poc_diff_one_minus1 + 1 (poc_proportional_to_timing_flag 置位时)
    pub num_ticks_poc_diff_one: Option<u32>,
}

impl HevcTiming {
    /// H.265 定义: fps = time_scale / num_units_in_tick
    pub fn fps(&self) -> Option<Rational> {
        if self.num_units_in_tick == 0 || self.time_scale == 0 {
            return None;
        }
        Some(Rational::new(self.time_scale, self.num_units_in_tick))
    }
}

/// 码流限制
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HevcBitstreamRestriction {
    pub tiles_fixed_structure: bool,
    pub motion_vectors_over_pic_boundaries: bool,
    pub restricted_ref_pic_lists: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}

/// HEVC VUI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HevcVui {
    /// aspect_ratio_idc (非法值视为 0, 即未指定)
    pub aspect_ratio_idc: u8,
    /// SAR, 未指定时为 1:1
    pub sar: Rational,
    /// overscan_appropriate_flag
    pub overscan_appropriate: Option<bool>,
    /// 视频信号类型
    pub video_signal: Option<VideoSignal>,
    /// chroma_sample_loc_type (顶场, 底场)
    pub chroma_sample_loc: Option<(u32, u32)>,
    /// neutral_chroma_indication_flag
    pub neutral_chroma_indication: bool,
    /// field_seq_flag
    pub field_seq: bool,
    /// frame_field_info_present_flag
    pub frame_field_info_present: bool,
    /// 默认显示窗口
    pub default_display_window: Option<DisplayWindow>,
    /// 计时信息
    pub timing: Option<HevcTiming>,
    /// HRD 参数
    pub hrd: Option<HevcHrd>,
    /// 码流限制
    pub bitstream_restriction: Option<HevcBitstreamRestriction>,
}

/// 解析 VUI 所需的 SPS 上下文
#[derive(Debug, Clone, Copy)]
pub(crate) struct VuiContext {
    pub sub_width_c: u32,
    pub sub_height_c: u32,
    pub pic_width: u32,
    pub pic_height: u32,
    pub max_sub_layers: u32,
}

/// 解析 vui_parameters()
pub(crate) fn parse_vui(br: &mut BitCursor, ctx: &VuiContext) -> ZhenResult<HevcVui> {
    let mut vui = HevcVui {
        sar: Rational::new(1, 1),
        ..HevcVui::default()
    };

    if br.read_flag()? {
        let ar_idc = br.read_bits(8)? as u8;
        if ar_idc == EXTENDED_SAR {
            let sar_w = br.read_bits(16)?;
            let sar_h = br.read_bits(16)?;
            vui.aspect_ratio_idc = ar_idc;
            if sar_w != 0 && sar_h != 0 {
                vui.sar = Rational::new(sar_w, sar_h);
            }
        } else if let Some(&(w, h)) = SAR_TABLE.get(ar_idc as usize).filter(|_| ar_idc != 0) {
            vui.aspect_ratio_idc = ar_idc;
            vui.sar = Rational::new(w, h);
        } else {
            log::debug!("H.265: 忽略非法 aspect_ratio_idc={}", ar_idc);
        }
    }

    if br.read_flag()? {
        vui.overscan_appropriate = Some(br.read_flag()?);
    }

    if br.read_flag()? {
        vui.video_signal = Some(read_video_signal(br)?);
    }

    if br.read_flag()? {
        vui.chroma_sample_loc = Some((br.read_ue()?, br.read_ue()?));
    }

    vui.neutral_chroma_indication = br.read_flag()?;
    vui.field_seq = br.read_flag()?;
    vui.frame_field_info_present = br.read_flag()?;

    if br.read_flag()? {
        let window = DisplayWindow {
            left: scaled(br.read_ue()?, ctx.sub_width_c),
            right: scaled(br.read_ue()?, ctx.sub_width_c),
            top: scaled(br.read_ue()?, ctx.sub_height_c),
            bottom: scaled(br.read_ue()?, ctx.sub_height_c),
        };
        check_window(&window, ctx.pic_width, ctx.pic_height, "default_display_window")?;
        vui.default_display_window = Some(window);
    }

    if br.read_flag()? {
        vui.timing = Some(parse_timing(br)?);
        if br.read_flag()? {
            vui.hrd = Some(parse_hrd_parameters(br, true, ctx.max_sub_layers)?);
        }
    }

    if br.read_flag()? {
        vui.bitstream_restriction = Some(HevcBitstreamRestriction {
            tiles_fixed_structure: br.read_flag()?,
            motion_vectors_over_pic_boundaries: br.read_flag()?,
            restricted_ref_pic_lists: br.read_flag()?,
            min_spatial_segmentation_idc: br.read_ue()?,
            max_bytes_per_pic_denom: br.read_ue()?,
            max_bits_per_min_cu_denom: br.read_ue()?,
            log2_max_mv_length_horizontal: br.read_ue()?,
            log2_max_mv_length_vertical: br.read_ue()?,
        });
    }

    Ok(vui)
}

/// 解析计时信息 (num_units_in_tick .. num_ticks_poc_diff_one_minus1)
pub(crate) fn parse_timing(br: &mut BitCursor) -> ZhenResult<HevcTiming> {
    let num_units_in_tick = br.read_bits(32)?;
    let time_scale = br.read_bits(32)?;
    let num_ticks_poc_diff_one = if br.read_flag()? {
        Some(plus_one(br.read_ue()?, "num_ticks_poc_diff_one_minus1")?)
    } else {
        None
    };
    Ok(HevcTiming {
        num_units_in_tick,
        time_scale,
        num_ticks_poc_diff_one,
    })
}

/// 解析 hrd_parameters(commonInfPresentFlag, maxNumSubLayersMinus1)
///
/// `max_sub_layers` 为子层数 (即 maxNumSubLayersMinus1 + 1).
pub fn parse_hrd_parameters(
    br: &mut BitCursor,
    common_inf_present: bool,
    max_sub_layers: u32,
) -> ZhenResult<HevcHrd> {
    let mut hrd = HevcHrd::default();

    if common_inf_present {
        hrd.nal_hrd_present = br.read_flag()?;
        hrd.vcl_hrd_present = br.read_flag()?;
        if hrd.nal_hrd_present || hrd.vcl_hrd_present {
            if br.read_flag()? {
                hrd.sub_pic = Some(SubPicHrdParams {
                    tick_divisor: br.read_bits(8)? + 2,
                    du_cpb_removal_delay_increment_length: br.read_bits(5)? as u8 + 1,
                    cpb_params_in_pic_timing_sei: br.read_flag()?,
                    dpb_output_delay_du_length: br.read_bits(5)? as u8 + 1,
                });
            }
            hrd.bit_rate_scale = br.read_bits(4)? as u8;
            hrd.cpb_size_scale = br.read_bits(4)? as u8;
            if hrd.sub_pic.is_some() {
                hrd.cpb_size_du_scale = br.read_bits(4)? as u8;
            }
            hrd.initial_cpb_removal_delay_length = br.read_bits(5)? as u8 + 1;
            hrd.au_cpb_removal_delay_length = br.read_bits(5)? as u8 + 1;
            hrd.dpb_output_delay_length = br.read_bits(5)? as u8 + 1;
        }
    }

    hrd.sub_layers.reserve(max_sub_layers as usize);
    for _ in 0..max_sub_layers {
        let mut sub = SubLayerHrd {
            fixed_pic_rate_general: br.read_flag()?,
            cpb_cnt: 1,
            ..SubLayerHrd::default()
        };
        sub.fixed_pic_rate_within_cvs = sub.fixed_pic_rate_general || br.read_flag()?;
        if sub.fixed_pic_rate_within_cvs {
            sub.elemental_duration_in_tc =
                Some(plus_one(br.read_ue()?, "elemental_duration_in_tc_minus1")?);
        } else {
            sub.low_delay = br.read_flag()?;
        }
        if !sub.low_delay {
            sub.cpb_cnt = ensure_range(
                CODEC,
                "cpb_cnt",
                br.read_ue()? as u64 + 1,
                1..=MAX_CPB_COUNT as u64,
            )? as u32;
        }
        if hrd.nal_hrd_present {
            sub.nal = parse_sub_layer_hrd(br, sub.cpb_cnt, hrd.sub_pic.is_some())?;
        }
        if hrd.vcl_hrd_present {
            sub.vcl = parse_sub_layer_hrd(br, sub.cpb_cnt, hrd.sub_pic.is_some())?;
        }
        hrd.sub_layers.push(sub);
    }

    Ok(hrd)
}

fn parse_sub_layer_hrd(
    br: &mut BitCursor,
    cpb_cnt: u32,
    sub_pic: bool,
) -> ZhenResult<Vec<CpbParams>> {
    let mut out = Vec::with_capacity(cpb_cnt as usize);
    for _ in 0..cpb_cnt {
        let bit_rate_value = plus_one(br.read_ue()?, "bit_rate_value_minus1")?;
        let cpb_size_value = plus_one(br.read_ue()?, "cpb_size_value_minus1")?;
        let du_values = if sub_pic {
            Some((
                plus_one(br.read_ue()?, "bit_rate_du_value_minus1")?,
                plus_one(br.read_ue()?, "cpb_size_du_value_minus1")?,
            ))
        } else {
            None
        };
        out.push(CpbParams {
            bit_rate_value,
            cpb_size_value,
            du_values,
            cbr: br.read_flag()?,
        });
    }
    Ok(out)
}

/// 检查窗口偏移不覆盖整幅图像
pub(crate) fn check_window(
    window: &DisplayWindow,
    width: u32,
    height: u32,
    name: &str,
) -> ZhenResult<()> {
    let horizontal = window.left as u64 + window.right as u64;
    let vertical = window.top as u64 + window.bottom as u64;
    if horizontal >= width as u64 || vertical >= height as u64 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: {} 超出图像范围, size={}x{}, offsets={:?}",
            name, width, height, window
        )));
    }
    Ok(())
}

pub(crate) fn scaled(value: u32, unit: u32) -> u32 {
    value.saturating_mul(unit)
}

pub(crate) fn plus_one(value: u32, name: &str) -> ZhenResult<u32> {
    value
        .checked_add(1)
        .ok_or_else(|| ZhenError::MalformedBitstream(format!("H.265: {} 溢出", name)))
}
