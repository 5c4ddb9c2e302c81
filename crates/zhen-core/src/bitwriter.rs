//! 比特流写入器.
//!
//! 位游标的逆操作: 按位写入定长值、指数哥伦布码和原始字节.
//! 开启防竞争 (emulation prevention) 时, 每当输出将出现 `00 00 0x` (x <= 3),
//! 就在第三个字节前插入 `0x03`.
//!
//! 按大端位序写入 (MSB first), 与 [`BitCursor`](crate::bitreader::BitCursor) 对应.

use crate::{ZhenError, ZhenResult};

/// 比特流写入器
///
/// 可选的容量上限模拟固定大小的目标缓冲区, 写满时返回
/// [`ZhenError::BufferExhausted`], 该次写入不可重试.
///
/// # 示例
/// ```
/// use zhen_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4).unwrap();
/// bw.write_bits(0b0001, 4).unwrap();
/// bw.write_ue(3).unwrap();
/// bw.write_trailing_bits().unwrap();
/// assert_eq!(bw.finish(), vec![0b1011_0001, 0b0010_0100]);
/// ```
#[derive(Debug, Clone)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
    /// 最大可写字节数, None 表示不限
    limit: Option<usize>,
    /// 是否插入防竞争字节
    emulation_prevention: bool,
    /// 已插入的防竞争字节数
    emulation_bytes: usize,
}

impl BitWriter {
    /// 创建不限容量、开启防竞争的写入器
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            current_byte: 0,
            bit_count: 0,
            limit: None,
            emulation_prevention: true,
            emulation_bytes: 0,
        }
    }

    /// 创建最多写入 `limit` 字节的写入器
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::with_capacity(limit),
            limit: Some(limit),
            ..Self::new()
        }
    }

    /// 开启或关闭防竞争字节插入
    pub fn set_emulation_prevention(&mut self, enabled: bool) {
        self.emulation_prevention = enabled;
    }

    /// 获取已写入的总位数 (含防竞争字节)
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 已插入的防竞争字节数
    pub fn emulation_bytes(&self) -> usize {
        self.emulation_bytes
    }

    /// 当前是否在字节边界上
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) -> ZhenResult<()> {
        if self.bit_count == 0 {
            self.ensure_room(1)?;
        }
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            let byte = self.current_byte;
            self.current_byte = 0;
            self.bit_count = 0;
            self.push_byte(byte)?;
        }
        Ok(())
    }

    /// 写入 N 个位 (最多 32 位)
    ///
    /// 值的低 N 位被写入, 高位在前 (大端).
    pub fn write_bits(&mut self, value: u32, n: u32) -> ZhenResult<()> {
        if n > 32 {
            return Err(ZhenError::InvalidArgument(format!(
                "write_bits: n={} 超过 32 位",
                n
            )));
        }
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1)?;
        }
        Ok(())
    }

    /// 写入 N 个位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) -> ZhenResult<()> {
        if n <= 32 {
            return self.write_bits(value as u32, n);
        }
        if n > 64 {
            return Err(ZhenError::InvalidArgument(format!(
                "write_bits_u64: n={} 超过 64 位",
                n
            )));
        }
        self.write_bits((value >> 32) as u32, n - 32)?;
        self.write_bits(value as u32, 32)
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) -> ZhenResult<()> {
        self.write_bit(u32::from(flag))
    }

    /// 写入无符号指数哥伦布码 ue(v)
    pub fn write_ue(&mut self, value: u32) -> ZhenResult<()> {
        self.write_exp_golomb_code(u64::from(value))
    }

    /// 写入有符号指数哥伦布码 se(v)
    pub fn write_se(&mut self, value: i32) -> ZhenResult<()> {
        let value = i64::from(value);
        let code = if value <= 0 { -2 * value } else { 2 * value - 1 };
        self.write_exp_golomb_code(code as u64)
    }

    /// 写入 rbsp_trailing_bits: 一个 1, 然后用 0 补齐字节
    pub fn write_trailing_bits(&mut self) -> ZhenResult<()> {
        self.write_bit(1)?;
        while self.bit_count != 0 {
            self.write_bit(0)?;
        }
        Ok(())
    }

    /// 写入原始字节, 不做防竞争处理
    ///
    /// 仅在字节对齐时可用.
    pub fn write_raw_bytes(&mut self, bytes: &[u8]) -> ZhenResult<()> {
        if !self.is_byte_aligned() {
            return Err(ZhenError::InvalidArgument(
                "write_raw_bytes 需要字节对齐".into(),
            ));
        }
        self.ensure_room(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// 写入 `count` 个填充字节, 不做防竞争处理
    pub fn write_filler_bytes(&mut self, filler: u8, count: usize) -> ZhenResult<()> {
        if !self.is_byte_aligned() {
            return Err(ZhenError::InvalidArgument(
                "write_filler_bytes 需要字节对齐".into(),
            ));
        }
        self.ensure_room(count)?;
        self.data.resize(self.data.len() + count, filler);
        Ok(())
    }

    /// 对齐到字节边界 (用 0 填充)
    pub fn align_to_byte(&mut self) -> ZhenResult<()> {
        while self.bit_count != 0 {
            self.write_bit(0)?;
        }
        Ok(())
    }

    /// 获取当前已完成的字节数据引用
    ///
    /// 注意: 不包括正在填充的当前字节.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 完成写入, 返回字节数据
    ///
    /// 如果当前不在字节边界, 用 0 填充最后一个字节. 该字节的空间在写入
    /// 其首位时已经预留, 因此这里不会超出容量.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            let pad = 8 - self.bit_count;
            self.data.push(self.current_byte << pad);
        }
        self.data
    }

    // ============================================================
    // 内部工具函数
    // ============================================================

    fn write_exp_golomb_code(&mut self, code: u64) -> ZhenResult<()> {
        let code_plus1 = code + 1;
        let len = 64 - code_plus1.leading_zeros();
        for _ in 0..len - 1 {
            self.write_bit(0)?;
        }
        self.write_bits_u64(code_plus1, len)
    }

    /// 追加一个完整字节, 必要时先插入 0x03
    fn push_byte(&mut self, byte: u8) -> ZhenResult<()> {
        let len = self.data.len();
        let needs_escape = self.emulation_prevention
            && len >= 2
            && self.data[len - 1] == 0
            && self.data[len - 2] == 0
            && byte & 0xFC == 0;
        if needs_escape {
            // 当前字节的空间已预留, 只需再多一个字节
            self.ensure_room(2)?;
            self.data.push(0x03);
            self.emulation_bytes += 1;
        }
        self.data.push(byte);
        Ok(())
    }

    fn ensure_room(&self, additional: usize) -> ZhenResult<()> {
        if let Some(limit) = self.limit {
            if self.data.len() + additional > limit {
                return Err(ZhenError::BufferExhausted(format!(
                    "需要 {} 字节, 剩余 {} 字节",
                    additional,
                    limit - self.data.len()
                )));
            }
        }
        Ok(())
    }
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}
