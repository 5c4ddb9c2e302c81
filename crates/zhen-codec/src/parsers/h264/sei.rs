//! H.264 SEI 解析.
//!
//! 帧组装只需要识别消息边界, 这里额外解析两种常用负载:
//! recovery_point (类型 6) 和 user_data_unregistered (类型 5).

use zhen_core::{BitCursor, ZhenError, ZhenResult};

use crate::parsers::sei::{SeiMessage, split_sei_messages};

/// user_data_unregistered
pub const SEI_USER_DATA_UNREGISTERED: u32 = 5;
/// recovery_point
pub const SEI_RECOVERY_POINT: u32 = 6;

/// recovery_point 负载
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    /// recovery_frame_cnt
    pub recovery_frame_cnt: u32,
    /// exact_match_flag
    pub exact_match: bool,
    /// broken_link_flag
    pub broken_link: bool,
    /// changing_slice_group_idc
    pub changing_slice_group_idc: u8,
}

/// user_data_unregistered 负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataUnregistered {
    /// uuid_iso_iec_11578
    pub uuid: [u8; 16],
    /// 其余字节
    pub data: Vec<u8>,
}

/// 拆分 SEI NAL 的 RBSP
pub fn parse_sei(rbsp: &[u8]) -> ZhenResult<Vec<SeiMessage<'_>>> {
    split_sei_messages(rbsp)
}

/// 解析 recovery_point 负载
pub fn parse_recovery_point(payload: &[u8]) -> ZhenResult<RecoveryPoint> {
    let mut br = BitCursor::new(payload);
    Ok(RecoveryPoint {
        recovery_frame_cnt: br.read_ue()?,
        exact_match: br.read_flag()?,
        broken_link: br.read_flag()?,
        changing_slice_group_idc: br.read_bits(2)? as u8,
    })
}

/// 解析 user_data_unregistered 负载
pub fn parse_user_data_unregistered(payload: &[u8]) -> ZhenResult<UserDataUnregistered> {
    let Some((uuid, data)) = payload.split_first_chunk::<16>() else {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.264: user_data_unregistered 太短, len={}",
            payload.len()
        )));
    };
    Ok(UserDataUnregistered {
        uuid: *uuid,
        data: data.to_vec(),
    })
}
