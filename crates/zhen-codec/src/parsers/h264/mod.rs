//! H.264/AVC 码流解析器.
//!
//! 提供对 H.264 码流的解析能力:
//! - NAL 单元分割与类型识别 (1 字节 NAL 头)
//! - SPS (Sequence Parameter Set) 解析, 含 VUI / HRD
//! - PPS (Picture Parameter Set) 解析
//! - SEI 消息拆分
//!
//! 所有解析函数接收去除 NAL 头与防竞争字节后的 RBSP.

pub mod nal;
pub mod pps;
pub mod sei;
pub mod sps;

pub use nal::{NalUnit, NalUnitType, split_annex_b};
pub use pps::{MAX_PPS_COUNT, Pps, parse_pps, peek_pps_ids};
pub use sei::parse_sei;
pub use sps::{MAX_SPS_COUNT, Sps, parse_sps};
