//! profile_tier_level 语法解析, VPS 与 SPS 共用.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

/// Main
pub const PROFILE_MAIN: u8 = 1;
/// Main 10
pub const PROFILE_MAIN_10: u8 = 2;
/// Main Still Picture
pub const PROFILE_MAIN_STILL_PICTURE: u8 = 3;
/// 格式范围扩展 (RExt)
pub const PROFILE_RANGE_EXTENSIONS: u8 = 4;
/// 屏幕内容编码扩展 (SCC)
pub const PROFILE_SCC: u8 = 9;

/// 单个 profile/tier 描述
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTier {
    /// profile_space (仅支持 0)
    pub profile_space: u8,
    /// tier_flag (false=Main tier, true=High tier)
    pub tier_flag: bool,
    /// profile_idc; 码流为 0 时取第一个置位的兼容标志
    pub profile_idc: u8,
    /// profile_compatibility_flag[32], 第 j 位对应 flag[j]
    pub compatibility_flags: u32,
    /// progressive_source_flag
    pub progressive_source: bool,
    /// interlaced_source_flag
    pub interlaced_source: bool,
    /// non_packed_constraint_flag
    pub non_packed_constraint: bool,
    /// frame_only_constraint_flag
    pub frame_only_constraint: bool,
    /// RExt / SCC 约束标志
    pub constraints: Option<RangeConstraints>,
}

impl ProfileTier {
    /// 兼容标志第 `j` 位是否置位
    pub fn is_compatible_with(&self, j: u8) -> bool {
        j < 32 && self.compatibility_flags & (1 << j) != 0
    }

    fn has_range_constraints(&self) -> bool {
        self.profile_idc == PROFILE_RANGE_EXTENSIONS
            || self.is_compatible_with(PROFILE_RANGE_EXTENSIONS)
            || self.has_scc_constraints()
    }

    fn has_scc_constraints(&self) -> bool {
        self.profile_idc == PROFILE_SCC || self.is_compatible_with(PROFILE_SCC)
    }
}

/// 格式范围扩展的约束标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeConstraints {
    pub max_12bit: bool,
    pub max_10bit: bool,
    pub max_8bit: bool,
    pub max_422chroma: bool,
    pub max_420chroma: bool,
    pub max_monochrome: bool,
    pub intra: bool,
    pub one_picture_only: bool,
    pub lower_bit_rate: bool,
    /// 仅 SCC
    pub max_14bit: bool,
}

/// 子层的 profile/level 信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubLayerPtl {
    /// sub_layer_profile_present_flag 置位时的 profile/tier
    pub profile: Option<ProfileTier>,
    /// sub_layer_level_present_flag 置位时的 level_idc
    pub level_idc: Option<u8>,
}

/// profile_tier_level 解析结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileTierLevel {
    /// general profile/tier
    pub general: ProfileTier,
    /// general_level_idc (原始值, 为级别的 30 倍, 如 93 表示 3.1)
    pub general_level_idc: u8,
    /// 子层信息, 长度为 max_sub_layers_minus1
    pub sub_layers: Vec<SubLayerPtl>,
}

/// 解析 profile_tier_level(1, max_sub_layers_minus1)
pub fn parse_profile_tier_level(
    br: &mut BitCursor,
    max_sub_layers_minus1: u32,
) -> ZhenResult<ProfileTierLevel> {
    let general = parse_profile_tier(br)?;
    let general_level_idc = br.read_bits(8)? as u8;

    let count = max_sub_layers_minus1 as usize;
    let mut present = Vec::with_capacity(count);
    for _ in 0..count {
        present.push((br.read_flag()?, br.read_flag()?));
    }

    if max_sub_layers_minus1 > 0 {
        for _ in max_sub_layers_minus1..8 {
            let reserved = br.read_bits(2)?;
            if reserved != 0 {
                return Err(ZhenError::MalformedBitstream(format!(
                    "H.265: PTL reserved_zero_2bits 非零, value={}",
                    reserved
                )));
            }
        }
    }

    let mut sub_layers = Vec::with_capacity(count);
    for (profile_present, level_present) in present {
        let mut sub = SubLayerPtl::default();
        if profile_present {
            sub.profile = Some(parse_profile_tier(br)?);
        }
        if level_present {
            sub.level_idc = Some(br.read_bits(8)? as u8);
        }
        sub_layers.push(sub);
    }

    Ok(ProfileTierLevel {
        general,
        general_level_idc,
        sub_layers,
    })
}

fn parse_profile_tier(br: &mut BitCursor) -> ZhenResult<ProfileTier> {
    let profile_space = br.read_bits(2)? as u8;
    if profile_space != 0 {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: profile_space 不支持, value={}",
            profile_space
        )));
    }
    let tier_flag = br.read_flag()?;
    let mut profile_idc = br.read_bits(5)? as u8;
    let compatibility_flags = br.read_bits(32)?.reverse_bits();

    if profile_idc == 0 {
        profile_idc = (1..32u8)
            .find(|&j| compatibility_flags & (1 << j) != 0)
            .unwrap_or(PROFILE_MAIN);
    }
    if profile_idc > PROFILE_RANGE_EXTENSIONS && profile_idc != PROFILE_SCC {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: profile_idc 不支持, value={}",
            profile_idc
        )));
    }

    let mut pt = ProfileTier {
        profile_space,
        tier_flag,
        profile_idc,
        compatibility_flags,
        progressive_source: br.read_flag()?,
        interlaced_source: br.read_flag()?,
        non_packed_constraint: br.read_flag()?,
        frame_only_constraint: br.read_flag()?,
        constraints: None,
    };

    // 43 位约束/保留位 + general_inbld_flag
    let mut reserved_bits = 44;
    if pt.has_range_constraints() {
        let mut c = RangeConstraints {
            max_12bit: br.read_flag()?,
            max_10bit: br.read_flag()?,
            max_8bit: br.read_flag()?,
            max_422chroma: br.read_flag()?,
            max_420chroma: br.read_flag()?,
            max_monochrome: br.read_flag()?,
            intra: br.read_flag()?,
            one_picture_only: br.read_flag()?,
            lower_bit_rate: br.read_flag()?,
            max_14bit: false,
        };
        if pt.has_scc_constraints() {
            c.max_14bit = br.read_flag()?;
            reserved_bits = 34;
        } else {
            reserved_bits = 35;
        }
        pt.constraints = Some(c);
    }
    br.skip_bits(reserved_bits)?;

    Ok(pt)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use zhen_core::BitWriter;

    use crate::parsers::h264::sps::tests::rbsp_writer;

    /// 写入 general profile_tier_level, 不含子层
    pub(crate) fn write_general_ptl(bw: &mut BitWriter, profile_idc: u8, level_idc: u8) {
        bw.write_bits(0, 2).unwrap(); // profile_space
        bw.write_flag(false).unwrap(); // tier
        bw.write_bits(profile_idc as u32, 5).unwrap();
        // compatibility_flag[profile_idc]
        bw.write_bits(1u32 << (31 - profile_idc as u32), 32).unwrap();
        bw.write_bits(0b1001, 4).unwrap(); // progressive, frame_only
        bw.write_bits_u64(0, 44).unwrap();
        bw.write_bits(level_idc as u32, 8).unwrap();
    }

    #[test]
    fn test_general_ptl_main() {
        let mut bw = rbsp_writer();
        write_general_ptl(&mut bw, PROFILE_MAIN, 93);
        bw.write_trailing_bits().unwrap();
        let data = bw.finish();

        let mut br = BitCursor::new(&data);
        let ptl = parse_profile_tier_level(&mut br, 0).unwrap();
        assert_eq!(ptl.general.profile_idc, PROFILE_MAIN);
        assert!(ptl.general.is_compatible_with(1));
        assert!(ptl.general.progressive_source);
        assert!(ptl.general.frame_only_constraint);
        assert!(ptl.general.constraints.is_none());
        assert_eq!(ptl.general_level_idc, 93);
        assert!(ptl.sub_layers.is_empty());
        assert_eq!(br.bits_read(), 96);
    }

    #[test]
    fn test_profile_zero_falls_back_to_compatibility() {
        let mut bw = rbsp_writer();
        bw.write_bits(0, 2).unwrap();
        bw.write_flag(true).unwrap();
        bw.write_bits(0, 5).unwrap(); // profile_idc = 0
        bw.write_bits(1u32 << (31 - 2), 32).unwrap(); // Main 10 兼容
        bw.write_bits(0, 4).unwrap();
        bw.write_bits_u64(0, 44).unwrap();
        bw.write_bits(120, 8).unwrap();
        let data = bw.finish();

        let ptl = parse_profile_tier_level(&mut BitCursor::new(&data), 0).unwrap();
        assert_eq!(ptl.general.profile_idc, PROFILE_MAIN_10);
        assert!(ptl.general.tier_flag);
    }

    #[test]
    fn test_range_extension_constraints_and_sub_layers() {
        let mut bw = rbsp_writer();
        bw.write_bits(0, 2).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_bits(PROFILE_RANGE_EXTENSIONS as u32, 5).unwrap();
        bw.write_bits(1u32 << (31 - 4), 32).unwrap();
        bw.write_bits(0, 4).unwrap();
        bw.write_bits(0b010_000_000, 9).unwrap(); // max_10bit
        bw.write_bits_u64(0, 35).unwrap();
        bw.write_bits(150, 8).unwrap();
        // 两个子层: 仅第 2 个子层携带 level
        bw.write_bits(0b00, 2).unwrap();
        bw.write_bits(0b01, 2).unwrap();
        for _ in 2..8 {
            bw.write_bits(0, 2).unwrap();
        }
        bw.write_bits(90, 8).unwrap();
        let data = bw.finish();

        let ptl = parse_profile_tier_level(&mut BitCursor::new(&data), 2).unwrap();
        let c = ptl.general.constraints.expect("RExt 应携带约束标志");
        assert!(c.max_10bit);
        assert!(!c.max_12bit);
        assert_eq!(ptl.sub_layers.len(), 2);
        assert_eq!(ptl.sub_layers[0], SubLayerPtl::default());
        assert_eq!(ptl.sub_layers[1].level_idc, Some(90));
    }

    #[test]
    fn test_unsupported_profile_rejected() {
        let mut bw = rbsp_writer();
        write_general_ptl(&mut bw, 5, 93);
        let data = bw.finish();
        let err = parse_profile_tier_level(&mut BitCursor::new(&data), 0).unwrap_err();
        assert!(err.is_malformed());

        let mut bw = rbsp_writer();
        bw.write_bits(1, 2).unwrap(); // profile_space = 1
        bw.write_bits(0, 30).unwrap();
        bw.write_bits_u64(0, 64).unwrap();
        let data = bw.finish();
        assert!(parse_profile_tier_level(&mut BitCursor::new(&data), 0).is_err());
    }
}
