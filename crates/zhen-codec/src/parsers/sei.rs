//! SEI 消息拆分, H.264 与 H.265 共用.
//!
//! 每条消息的 payloadType 与 payloadSize 都编码为若干个 `0xFF` 加一个结束字节,
//! 值为所有字节之和.

use zhen_core::{ZhenError, ZhenResult};

/// 单条 SEI 消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeiMessage<'a> {
    /// payloadType
    pub payload_type: u32,
    /// 负载字节 (已去除防竞争字节)
    pub payload: &'a [u8],
}

impl SeiMessage<'_> {
    /// 负载位长度
    pub fn bit_length(&self) -> usize {
        self.payload.len() * 8
    }
}

/// 拆分 SEI RBSP (不含 NAL 头) 中的全部消息
///
/// 遇到 rbsp_trailing_bits (`0x80` 及其后的零) 即停止.
/// 声明长度超出剩余数据时返回码流格式错误.
pub fn split_sei_messages(rbsp: &[u8]) -> ZhenResult<Vec<SeiMessage<'_>>> {
    let mut messages = Vec::new();
    let mut pos = 0usize;
    while pos < rbsp.len() && !is_trailing(&rbsp[pos..]) {
        let payload_type = read_ff_coded(rbsp, &mut pos, "payloadType")?;
        let payload_size = read_ff_coded(rbsp, &mut pos, "payloadSize")? as usize;
        let end = pos
            .checked_add(payload_size)
            .filter(|&end| end <= rbsp.len())
            .ok_or_else(|| {
                ZhenError::MalformedBitstream(format!(
                    "SEI: payloadSize 超出剩余数据, type={}, size={}, left={}",
                    payload_type,
                    payload_size,
                    rbsp.len() - pos
                ))
            })?;
        messages.push(SeiMessage {
            payload_type,
            payload: &rbsp[pos..end],
        });
        pos = end;
    }
    Ok(messages)
}

/// 查找指定类型的第一条消息
pub fn find_sei_message(rbsp: &[u8], payload_type: u32) -> ZhenResult<Option<SeiMessage<'_>>> {
    Ok(split_sei_messages(rbsp)?
        .into_iter()
        .find(|m| m.payload_type == payload_type))
}

fn read_ff_coded(data: &[u8], pos: &mut usize, name: &str) -> ZhenResult<u32> {
    let mut value = 0u32;
    loop {
        let Some(&byte) = data.get(*pos) else {
            return Err(ZhenError::MalformedBitstream(format!(
                "SEI: {} 被截断",
                name
            )));
        };
        *pos += 1;
        value = value.checked_add(byte as u32).ok_or_else(|| {
            ZhenError::MalformedBitstream(format!("SEI: {} 溢出", name))
        })?;
        if byte != 0xFF {
            return Ok(value);
        }
    }
}

fn is_trailing(rest: &[u8]) -> bool {
    rest[0] == 0x80 && rest[1..].iter().all(|&b| b == 0)
}
