//! H.264 NAL (Network Abstraction Layer) 单元解析.
//!
//! # Annex B 格式
//!
//! Annex B 使用起始码 (start code) 分隔 NAL 单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! # NAL 头部 (1 字节)
//! ```text
//! ┌─────────────────────────────────┐
//! │ forbidden(1) | ref_idc(2) | type(5) │
//! └─────────────────────────────────┘
//! ```

use zhen_core::emulation::remove_emulation_prevention;
use zhen_core::{ZhenError, ZhenResult};

use crate::scanner::{AnnexBUnits, AvcSyntax};

/// NAL 单元类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum NalUnitType {
    /// 非 IDR 图像切片 (P/B slice)
    Slice,
    /// 数据分区 A (DPA)
    SliceDpa,
    /// 数据分区 B (DPB)
    SliceDpb,
    /// 数据分区 C (DPC)
    SliceDpc,
    /// IDR 图像切片 (关键帧)
    SliceIdr,
    /// 增补增强信息 (SEI)
    Sei,
    /// 序列参数集 (SPS)
    Sps,
    /// 图像参数集 (PPS)
    Pps,
    /// 访问单元分隔符 (AUD)
    Aud,
    /// 序列结束
    EndOfSequence,
    /// 流结束
    EndOfStream,
    /// 填充数据
    FillerData,
    /// SPS 扩展
    SpsExtension,
    /// 未知类型
    Unknown(u8),
}

impl NalUnitType {
    /// 从 NAL 类型编号创建
    pub fn from_type_id(type_id: u8) -> Self {
        match type_id {
            1 => Self::Slice,
            2 => Self::SliceDpa,
            3 => Self::SliceDpb,
            4 => Self::SliceDpc,
            5 => Self::SliceIdr,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            _ => Self::Unknown(type_id),
        }
    }

    /// 获取类型编号
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Slice => 1,
            Self::SliceDpa => 2,
            Self::SliceDpb => 3,
            Self::SliceDpc => 4,
            Self::SliceIdr => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::Unknown(id) => *id,
        }
    }

    /// 是否为 VCL (Video Coding Layer) NAL
    pub fn is_vcl(&self) -> bool {
        matches!(
            self,
            Self::Slice | Self::SliceDpa | Self::SliceDpb | Self::SliceDpc | Self::SliceIdr
        )
    }

    /// 是否为关键帧 (IDR)
    pub fn is_idr(&self) -> bool {
        matches!(self, Self::SliceIdr)
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Slice => write!(f, "Slice"),
            Self::SliceDpa => write!(f, "SliceDPA"),
            Self::SliceDpb => write!(f, "SliceDPB"),
            Self::SliceDpc => write!(f, "SliceDPC"),
            Self::SliceIdr => write!(f, "IDR"),
            Self::Sei => write!(f, "SEI"),
            Self::Sps => write!(f, "SPS"),
            Self::Pps => write!(f, "PPS"),
            Self::Aud => write!(f, "AUD"),
            Self::EndOfSequence => write!(f, "EndOfSeq"),
            Self::EndOfStream => write!(f, "EndOfStream"),
            Self::FillerData => write!(f, "Filler"),
            Self::SpsExtension => write!(f, "SPSExt"),
            Self::Unknown(id) => write!(f, "Unknown({id})"),
        }
    }
}

/// 解析后的 NAL 单元
#[derive(Debug, Clone)]
pub struct NalUnit {
    /// NAL 单元类型
    pub nal_type: NalUnitType,
    /// nal_ref_idc (参考重要性, 0-3)
    pub ref_idc: u8,
    /// NAL 单元原始数据 (不含起始码, 含 NAL 头部字节)
    pub data: Vec<u8>,
}

impl NalUnit {
    /// 从 NAL 数据 (含头部字节) 解析
    pub fn parse(data: &[u8]) -> ZhenResult<Self> {
        let Some(&header) = data.first() else {
            return Err(ZhenError::MalformedBitstream(
                "H.264: NAL 单元数据为空".into(),
            ));
        };

        let forbidden = (header >> 7) & 1;
        if forbidden != 0 {
            return Err(ZhenError::MalformedBitstream(format!(
                "H.264: forbidden_zero_bit 非法, value={}",
                forbidden
            )));
        }

        Ok(Self {
            nal_type: NalUnitType::from_type_id(header & 0x1F),
            ref_idc: (header >> 5) & 0x03,
            data: data.to_vec(),
        })
    }

    /// 获取 RBSP (Raw Byte Sequence Payload) 数据
    ///
    /// 移除 NAL 头部字节和防竞争字节 (0x03).
    pub fn rbsp(&self) -> Vec<u8> {
        remove_emulation_prevention(&self.data[1..])
    }
}

/// 从 Annex B 字节流中分割出所有 NAL 单元
///
/// 返回的 NAL 单元不含起始码, 尾部的 trailing_zero_8bits 已去除.
/// 头部非法的单元被跳过.
pub fn split_annex_b(data: &[u8]) -> Vec<NalUnit> {
    AnnexBUnits::<AvcSyntax>::new(data)
        .filter_map(|unit| {
            let payload = trim_trailing_zeros(unit.payload());
            NalUnit::parse(payload).ok()
        })
        .collect()
}

pub(crate) fn trim_trailing_zeros(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
    &data[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nal_type_roundtrip_and_flags() {
        for id in 0..32u8 {
            assert_eq!(NalUnitType::from_type_id(id).type_id(), id);
        }
        assert!(NalUnitType::SliceIdr.is_idr());
        assert!(NalUnitType::SliceIdr.is_vcl());
        assert!(!NalUnitType::Sps.is_vcl());
        assert_eq!(format!("{}", NalUnitType::Unknown(30)), "Unknown(30)");
    }

    #[test]
    fn test_nal_parse_rejects_forbidden_bit() {
        let err = NalUnit::parse(&[0xE7, 0x42]).expect_err("forbidden_zero_bit=1 应失败");
        assert!(err.is_malformed(), "错误类型应为码流格式错误");
        assert!(NalUnit::parse(&[]).is_err(), "空 NAL 应失败");
    }

    #[test]
    fn test_split_annex_b_mixed_start_codes() {
        let data = [
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, // SPS + 尾部零
            0x00, 0x00, 0x01, 0x68, 0xCE, // PPS
            0x00, 0x00, 0x01, 0x65, 0x88, 0x00, 0x00, 0x03, 0x01, // IDR
        ];
        let nalus = split_annex_b(&data);
        assert_eq!(nalus.len(), 3, "应分割出 3 个 NAL");
        assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
        assert_eq!(nalus[0].data, vec![0x67, 0x42], "SPS 尾部零字节应去除");
        assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
        assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
        assert_eq!(nalus[2].ref_idc, 3);
        assert_eq!(nalus[2].rbsp(), vec![0x88, 0x00, 0x00, 0x01], "RBSP 应去除防竞争字节");
    }
}
