//! H.265/HEVC 码流解析器.
//!
//! 提供对 H.265 码流的解析能力:
//! - NAL 单元分割与类型识别 (2 字节 NAL 头)
//! - VPS / SPS / PPS 解析, 含 profile_tier_level、VUI / HRD、量化矩阵、短期参考图像集
//! - 格式范围扩展与屏幕内容编码 (SCC) 扩展
//! - HDR 静态元数据 SEI
//!
//! 与 [`super::h264`] 相同, 参数集解析函数接收去除 NAL 头与防竞争字节后的 RBSP.

pub mod nal;
pub mod pps;
pub mod ptl;
pub mod rps;
pub mod scaling_list;
pub mod sei;
pub mod sps;
pub mod vps;
pub mod vui;

pub use nal::{HevcNalUnit, HevcNalUnitType, split_hevc_annex_b};
pub use pps::{HevcPps, MAX_PPS_COUNT, parse_hevc_pps, peek_hevc_pps_ids};
pub use ptl::ProfileTierLevel;
pub use sei::{HdrMetadata, parse_hdr_metadata};
pub use sps::{HevcSps, MAX_SPS_COUNT, parse_hevc_sps};
pub use vps::{HevcVps, MAX_VPS_COUNT, parse_hevc_vps};
