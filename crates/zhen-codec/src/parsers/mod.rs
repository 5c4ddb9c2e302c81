//! 码流解析器.
//!
//! - [`h264`]: AVC NAL 头、SPS / PPS / SEI
//! - [`h265`]: HEVC NAL 头、VPS / SPS / PPS / SEI (含 HDR 静态元数据)
//! - [`sei`]: 两种格式共用的 SEI 消息拆分

use std::fmt::Display;
use std::ops::RangeInclusive;

use zhen_core::{ZhenError, ZhenResult};

pub mod h264;
pub mod h265;
pub mod sei;

/// 校验语法元素取值范围, 越界时返回码流格式错误
pub(crate) fn ensure_range<T>(
    codec: &str,
    name: &str,
    value: T,
    range: RangeInclusive<T>,
) -> ZhenResult<T>
where
    T: PartialOrd + Display + Copy,
{
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ZhenError::MalformedBitstream(format!(
            "{}: {} 超出范围, value={}",
            codec, name, value
        )))
    }
}
