//! H.265/HEVC NAL (Network Abstraction Layer) 单元解析.
//!
//! HEVC NAL 头部为 2 字节 (比 H.264 多一字节):
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)
//!
//! 只支持单层码流, `nuh_layer_id` 必须为 0.

use zhen_core::emulation::remove_emulation_prevention;
use zhen_core::{ZhenError, ZhenResult};

use crate::parsers::h264::nal::trim_trailing_zeros;
use crate::scanner::{AnnexBUnits, HevcSyntax};

/// HEVC NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum HevcNalUnitType {
    /// TRAIL_N (非参考尾随图像)
    TrailN,
    /// TRAIL_R (参考尾随图像)
    TrailR,
    /// TSA_N
    TsaN,
    /// TSA_R
    TsaR,
    /// STSA_N
    StsaN,
    /// STSA_R
    StsaR,
    /// RADL_N
    RadlN,
    /// RADL_R
    RadlR,
    /// RASL_N
    RaslN,
    /// RASL_R
    RaslR,
    /// BLA_W_LP (Broken Link Access)
    BlaWLp,
    /// BLA_W_RADL
    BlaWRadl,
    /// BLA_N_LP
    BlaNLp,
    /// IDR_W_RADL (Instantaneous Decoding Refresh)
    IdrWRadl,
    /// IDR_N_LP
    IdrNLp,
    /// CRA_NUT (Clean Random Access)
    Cra,
    /// VPS (Video Parameter Set)
    Vps,
    /// SPS (Sequence Parameter Set)
    Sps,
    /// PPS (Picture Parameter Set)
    Pps,
    /// AUD (Access Unit Delimiter)
    Aud,
    /// EOS (End of Sequence)
    Eos,
    /// EOB (End of Bitstream)
    Eob,
    /// FD (Filler Data)
    FillerData,
    /// PREFIX_SEI
    PrefixSei,
    /// SUFFIX_SEI
    SuffixSei,
    /// 保留或未定义类型
    Unknown(u8),
}

impl HevcNalUnitType {
    /// 从类型编号创建
    pub fn from_type_id(id: u8) -> Self {
        match id {
            0 => Self::TrailN,
            1 => Self::TrailR,
            2 => Self::TsaN,
            3 => Self::TsaR,
            4 => Self::StsaN,
            5 => Self::StsaR,
            6 => Self::RadlN,
            7 => Self::RadlR,
            8 => Self::RaslN,
            9 => Self::RaslR,
            16 => Self::BlaWLp,
            17 => Self::BlaWRadl,
            18 => Self::BlaNLp,
            19 => Self::IdrWRadl,
            20 => Self::IdrNLp,
            21 => Self::Cra,
            32 => Self::Vps,
            33 => Self::Sps,
            34 => Self::Pps,
            35 => Self::Aud,
            36 => Self::Eos,
            37 => Self::Eob,
            38 => Self::FillerData,
            39 => Self::PrefixSei,
            40 => Self::SuffixSei,
            _ => Self::Unknown(id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::TrailN => 0,
            Self::TrailR => 1,
            Self::TsaN => 2,
            Self::TsaR => 3,
            Self::StsaN => 4,
            Self::StsaR => 5,
            Self::RadlN => 6,
            Self::RadlR => 7,
            Self::RaslN => 8,
            Self::RaslR => 9,
            Self::BlaWLp => 16,
            Self::BlaWRadl => 17,
            Self::BlaNLp => 18,
            Self::IdrWRadl => 19,
            Self::IdrNLp => 20,
            Self::Cra => 21,
            Self::Vps => 32,
            Self::Sps => 33,
            Self::Pps => 34,
            Self::Aud => 35,
            Self::Eos => 36,
            Self::Eob => 37,
            Self::FillerData => 38,
            Self::PrefixSei => 39,
            Self::SuffixSei => 40,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL NAL (类型 0..=31, 含保留类型)
    pub fn is_vcl(&self) -> bool {
        self.type_id() < 32
    }

    /// 是否为已定义的切片类型
    pub fn is_slice(&self) -> bool {
        matches!(self.type_id(), 0..=9 | 16..=21)
    }

    /// 是否为 IRAP (Intra Random Access Point) NAL
    pub fn is_irap(&self) -> bool {
        matches!(self.type_id(), 16..=21)
    }

    /// 是否为 IDR NAL
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 是否为 SEI (前缀或后缀)
    pub fn is_sei(&self) -> bool {
        matches!(self, Self::PrefixSei | Self::SuffixSei)
    }
}

impl std::fmt::Display for HevcNalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vps => write!(f, "VPS"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::Eos => write!(f, "EOS"),
            Self::Eob => write!(f, "EOB"),
            Self::FillerData => write!(f, "FD"),
            Self::PrefixSei => write!(f, "PREFIX_SEI"),
            Self::SuffixSei => write!(f, "SUFFIX_SEI"),
            Self::IdrWRadl => write!(f, "IDR_W_RADL"),
            Self::IdrNLp => write!(f, "IDR_N_LP"),
            Self::Cra => write!(f, "CRA"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
            other => write!(f, "VCL({})", other.type_id()),
        }
    }
}

/// HEVC NAL 单元
#[derive(Debug, Clone)]
pub struct HevcNalUnit {
    /// NAL 类型
    pub nal_type: HevcNalUnitType,
    /// nuh_layer_id
    pub layer_id: u8,
    /// nuh_temporal_id_plus1
    pub temporal_id_plus1: u8,
    /// NAL 数据 (不含起始码, 含 2 字节 NAL 头)
    pub data: Vec<u8>,
}

impl HevcNalUnit {
    /// 从原始 NAL 数据 (含 2 字节头) 解析
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        let Some(&[byte0, byte1]) = data.first_chunk::<2>() else {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.265: NAL 数据太短, len={}",
                data.len()
            )));
        };
        if byte0 & 0x80 != 0 {
            return Err(ZhenError::MalformedBitstream(
                "H.265: forbidden_zero_bit 非法, value=1".into(),
            ));
        }
        let layer_id = ((byte0 & 1) << 5) | (byte1 >> 3);
        if layer_id != 0 {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.265: nuh_layer_id 不支持, value={}",
                layer_id
            )));
        }
        let temporal_id_plus1 = byte1 & 0x07;
        if temporal_id_plus1 == 0 {
            return Err(ZhenError::MalformedBitstream(
                "H.265: nuh_temporal_id_plus1 不能为 0".into(),
            ));
        }

        Ok(Self {
            nal_type: HevcNalUnitType::from_type_id((byte0 >> 1) & 0x3F),
            layer_id,
            temporal_id_plus1,
            data: data.to_vec(),
        })
    }

    /// TemporalId
    pub fn temporal_id(&self) -> u8 {
        self.temporal_id_plus1 - 1
    }

    /// 获取 RBSP 数据 (去除 2 字节头与防竞争字节)
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[2..])
    }
}

/// 从 Annex B 格式分割 HEVC NAL 单元
///
/// 头部非法的单元 (含多层码流中 layer_id 非 0 的单元) 被跳过.
pub fn split_hevc_annex_b(data: &[u8]) -> Vec<HevcNalUnit> {
    AnnexBUnits::<HevcSyntax>::new(data)
        .filter_map(|unit| HevcNalUnit::parse(trim_trailing_zeros(unit.payload())).ok())
        .collect()
}
