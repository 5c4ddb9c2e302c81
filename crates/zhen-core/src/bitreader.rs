//! 位游标与指数哥伦布解码.
//!
//! 按大端位序 (MSB first) 从字节缓冲区读取数据. 游标以 32 位字为单位推进,
//! 内部保存 "当前字序号 + 字内位偏移 (0-31)", 与参数集解析器的访问模式一致.
//!
//! 除了定长读取外, 还提供 ue(v)/se(v) 指数哥伦布解码, 以及
//! 解析 RBSP 时常用的 `more_rbsp_data` 判断.

use crate::{ZhenError, ZhenResult};

/// 单个 ue(v) 前缀允许的最大前导零个数.
///
/// 32 个前导零足以表示 `u32::MAX`, 再多就是损坏的码字.
const MAX_LEADING_ZEROS: u32 = 32;

/// 位游标
///
/// 从字节缓冲区中按位读取数据. 读取越过缓冲区边界时返回
/// [`ZhenError::MalformedBitstream`], 调用方应停止解析当前单元.
///
/// # 示例
/// ```
/// use zhen_core::bitreader::BitCursor;
///
/// let data = [0b1011_0001, 0b0101_0101];
/// let mut bc = BitCursor::new(&data);
/// assert_eq!(bc.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(bc.read_bits(4).unwrap(), 0b0001);
/// assert_eq!(bc.read_bits(8).unwrap(), 0b0101_0101);
/// ```
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前 32 位字序号
    word_pos: usize,
    /// 当前字内已消耗的位数 (0-31, 0 表示字的最高位)
    bit_offset: u32,
}

impl<'a> BitCursor<'a> {
    /// 创建新的位游标
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            word_pos: 0,
            bit_offset: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.word_pos * 32 + self.bit_offset as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bits_read())
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 已完整解码的字节数 (不足一字节的部分不计)
    pub fn bytes_decoded(&self) -> usize {
        self.word_pos * 4 + (self.bit_offset / 8) as usize
    }

    /// 剩余未解码的字节数
    pub fn bytes_left(&self) -> usize {
        self.data.len().saturating_sub(self.bytes_decoded())
    }

    /// 当前是否在字节边界上
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset % 8 == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> ZhenResult<u32> {
        self.read_bits(1)
    }

    /// 读取 1 个位并转换为布尔值
    pub fn read_flag(&mut self) -> ZhenResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// 读取 N 个位 (1-32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> ZhenResult<u32> {
        let value = self.peek_bits(n)?;
        self.advance(n as usize);
        Ok(value)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> ZhenResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(ZhenError::InvalidArgument(format!(
                "read_bits_u64: n={} 超过 64 位",
                n
            )));
        }
        let high = u64::from(self.read_bits(n - 32)?);
        let low = u64::from(self.read_bits(32)?);
        Ok((high << 32) | low)
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&self, n: u32) -> ZhenResult<u32> {
        if n == 0 || n > 32 {
            return Err(ZhenError::InvalidArgument(format!(
                "peek_bits: n={} 不在 1..=32 范围内",
                n
            )));
        }
        if n as usize > self.bits_left() {
            return Err(ZhenError::MalformedBitstream(format!(
                "读取越界: 需要 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }

        // 当前字与下一个字拼成 64 位窗口, 再截取所需的位
        let window = (u64::from(self.word_at(self.word_pos)) << 32)
            | u64::from(self.word_at(self.word_pos + 1));
        let value = (window << self.bit_offset) >> (64 - n);
        Ok(value as u32)
    }

    /// 回退 N 个位
    pub fn unget_bits(&mut self, n: u32) -> ZhenResult<()> {
        let n = n as usize;
        if n > self.bits_read() {
            return Err(ZhenError::InvalidArgument(format!(
                "unget_bits: 回退 {} 位超过已读取的 {} 位",
                n,
                self.bits_read()
            )));
        }
        self.seek_bits(self.bits_read() - n);
        Ok(())
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> ZhenResult<()> {
        if n > self.bits_left() {
            return Err(ZhenError::MalformedBitstream(format!(
                "跳过越界: 需要 {} 位, 剩余 {} 位",
                n,
                self.bits_left()
            )));
        }
        self.advance(n);
        Ok(())
    }

    /// 对齐到下一个字节边界
    ///
    /// 如果当前已在字节边界, 则不做任何事.
    pub fn align_to_byte(&mut self) {
        let rem = self.bit_offset % 8;
        if rem != 0 {
            self.advance((8 - rem) as usize);
        }
    }

    /// 读取无符号指数哥伦布码 ue(v)
    ///
    /// 前缀为 `len` 个 0 加一个 1, 后缀为 `len` 位, 值为 `(1 << len) + suffix - 1`.
    pub fn read_ue(&mut self) -> ZhenResult<u32> {
        let code = self.read_exp_golomb_code()?;
        u32::try_from(code).map_err(|_| {
            ZhenError::MalformedBitstream(format!("ue(v) 超出 32 位范围, code={}", code))
        })
    }

    /// 读取有符号指数哥伦布码 se(v)
    ///
    /// 奇数码字映射为正数, 偶数码字映射为负数: 1, -1, 2, -2, ...
    pub fn read_se(&mut self) -> ZhenResult<i32> {
        let code = self.read_exp_golomb_code()?;
        let magnitude = code.div_ceil(2) as i64;
        let value = if code & 1 == 1 { magnitude } else { -magnitude };
        i32::try_from(value).map_err(|_| {
            ZhenError::MalformedBitstream(format!("se(v) 超出 32 位范围, code={}", code))
        })
    }

    /// 判断 RBSP 是否仍有有效语法数据 (排除 rbsp_trailing_bits 和尾部填充零)
    pub fn more_rbsp_data(&self) -> bool {
        let start = self.bits_read();
        let total = self.data.len() * 8;
        if start >= total {
            return false;
        }
        // 找到最后一个 1 (rbsp_stop_one_bit) 的位置
        let Some(last_byte) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let stop_bit_pos = last_byte * 8 + 7 - self.data[last_byte].trailing_zeros() as usize;
        start < stop_bit_pos
    }

    /// 获取底层数据的引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// 从当前位置读取原始字节切片
    ///
    /// 仅在字节对齐时可用.
    pub fn read_bytes(&mut self, n: usize) -> ZhenResult<&'a [u8]> {
        if !self.is_byte_aligned() {
            return Err(ZhenError::InvalidArgument("read_bytes 需要字节对齐".into()));
        }
        let start = self.bytes_decoded();
        let end = start + n;
        if end > self.data.len() {
            return Err(ZhenError::MalformedBitstream(format!(
                "读取越界: 需要 {} 字节, 剩余 {} 字节",
                n,
                self.bytes_left()
            )));
        }
        self.advance(n * 8);
        Ok(&self.data[start..end])
    }

    // ============================================================
    // 内部工具函数
    // ============================================================

    /// 读取指数哥伦布码字, 以 u64 返回以便容纳 32 个前导零的情况
    fn read_exp_golomb_code(&mut self) -> ZhenResult<u64> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > MAX_LEADING_ZEROS {
                // 跳过剩余的整段零前缀, 让游标停在可疑区域之后
                let skipped = self.skip_zero_run();
                return Err(ZhenError::MalformedBitstream(format!(
                    "指数哥伦布码前缀过长, 前导零至少 {} 个",
                    leading_zeros as usize + skipped
                )));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let suffix = self.read_bits_u64(leading_zeros)?;
        Ok((1u64 << leading_zeros) + suffix - 1)
    }

    /// 跳过连续的零位, 返回跳过的位数
    fn skip_zero_run(&mut self) -> usize {
        let mut skipped = 0usize;
        while self.bits_left() > 0 {
            // 整字为零时按字跳过
            if self.bit_offset == 0 && self.bits_left() >= 32 && self.word_at(self.word_pos) == 0 {
                self.word_pos += 1;
                skipped += 32;
                continue;
            }
            match self.peek_bits(1) {
                Ok(0) => {
                    self.advance(1);
                    skipped += 1;
                }
                _ => break,
            }
        }
        skipped
    }

    /// 读取第 idx 个 32 位字, 越界部分补零
    fn word_at(&self, idx: usize) -> u32 {
        let start = idx * 4;
        let mut bytes = [0u8; 4];
        for (i, slot) in bytes.iter_mut().enumerate() {
            if let Some(&b) = self.data.get(start + i) {
                *slot = b;
            }
        }
        u32::from_be_bytes(bytes)
    }

    fn advance(&mut self, n: usize) {
        self.seek_bits(self.bits_read() + n);
    }

    fn seek_bits(&mut self, pos: usize) {
        self.word_pos = pos / 32;
        self.bit_offset = (pos % 32) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 将布尔位序列打包为字节 (MSB first, 末尾补零)
    fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
        let mut out = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                out[i / 8] |= 1 << (7 - (i % 8));
            }
        }
        out
    }

    fn push_ue(bits: &mut Vec<bool>, value: u32) {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        for _ in 0..len - 1 {
            bits.push(false);
        }
        for i in (0..len).rev() {
            bits.push((code >> i) & 1 == 1);
        }
    }

    #[test]
    fn test_read_bits_basic() {
        let data = [0b1011_0001, 0b0101_0101];
        let mut bc = BitCursor::new(&data);

        assert_eq!(bc.read_bits(1).unwrap(), 1);
        assert_eq!(bc.read_bits(1).unwrap(), 0);
        assert_eq!(bc.read_bits(2).unwrap(), 0b11);
        assert_eq!(bc.read_bits(4).unwrap(), 0b0001);
        assert_eq!(bc.read_bits(8).unwrap(), 0b0101_0101);
        assert!(bc.is_eof());
    }

    #[test]
    fn test_read_bits_across_word_boundary() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];
        let mut bc = BitCursor::new(&data);

        assert_eq!(bc.read_bits(28).unwrap(), 0x0123_4567);
        assert_eq!(bc.read_bits(12).unwrap(), 0x89A);
        assert_eq!(bc.read_bits(8).unwrap(), 0xBC);
    }

    #[test]
    fn test_read_bits_32_bit() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_bits(32).unwrap(), 0xFF00_FF00);
    }

    #[test]
    fn test_read_bits_invalid_count() {
        let data = [0xFF; 8];
        let mut bc = BitCursor::new(&data);
        assert!(matches!(bc.read_bits(0), Err(ZhenError::InvalidArgument(_))));
        assert!(matches!(bc.read_bits(33), Err(ZhenError::InvalidArgument(_))));
    }

    #[test]
    fn test_read_past_end_is_malformed() {
        let data = [0xAB];
        let mut bc = BitCursor::new(&data);
        bc.read_bits(6).unwrap();
        let err = bc.read_bits(3).expect_err("越界读取应失败");
        assert!(err.is_malformed(), "越界读取应返回码流错误");
        // 失败的读取不移动游标
        assert_eq!(bc.bits_read(), 6);
    }

    #[test]
    fn test_peek_and_unget() {
        let data = [0b1011_0001];
        let mut bc = BitCursor::new(&data);

        assert_eq!(bc.peek_bits(4).unwrap(), 0b1011);
        assert_eq!(bc.peek_bits(4).unwrap(), 0b1011);
        assert_eq!(bc.read_bits(4).unwrap(), 0b1011);
        bc.unget_bits(2).unwrap();
        assert_eq!(bc.read_bits(6).unwrap(), 0b11_0001);
        assert!(bc.unget_bits(9).is_err());
    }

    #[test]
    fn test_bytes_decoded_and_left() {
        let data = [0u8; 10];
        let mut bc = BitCursor::new(&data);

        bc.read_bits(12).unwrap();
        assert_eq!(bc.bytes_decoded(), 1);
        assert_eq!(bc.bytes_left(), 9);
        bc.read_bits(32).unwrap();
        bc.read_bits(20).unwrap();
        assert_eq!(bc.bytes_decoded(), 8);
        assert_eq!(bc.bytes_left(), 2);
    }

    #[test]
    fn test_read_ue_se_small_values() {
        // ue: 0 -> 1, 1 -> 010, 2 -> 011, 3 -> 00100
        let data = [0b1010_0110, 0b0100_0000];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_ue().unwrap(), 0);
        assert_eq!(bc.read_ue().unwrap(), 1);
        assert_eq!(bc.read_ue().unwrap(), 2);
        assert_eq!(bc.read_ue().unwrap(), 3);

        // se: 010 -> 1, 011 -> -1, 00100 -> 2, 00101 -> -2
        let data = [0b0100_1100, 0b1000_0101];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_se().unwrap(), 1);
        assert_eq!(bc.read_se().unwrap(), -1);
        assert_eq!(bc.read_se().unwrap(), 2);
        assert_eq!(bc.read_se().unwrap(), -2);
    }

    #[test]
    fn test_read_ue_u32_max() {
        let mut bits = Vec::new();
        push_ue(&mut bits, u32::MAX);
        push_ue(&mut bits, 7);
        let data = bits_to_bytes(&bits);
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_ue().unwrap(), u32::MAX);
        assert_eq!(bc.read_ue().unwrap(), 7);
    }

    #[test]
    fn test_overlong_exp_golomb_prefix() {
        // 40 个前导零后才出现 1
        let mut data = vec![0u8; 5];
        data.push(0x80);
        data.extend_from_slice(&[0xFF; 8]);
        let mut bc = BitCursor::new(&data);
        let err = bc.read_ue().expect_err("过长前缀应失败");
        let msg = format!("{err}");
        assert!(msg.contains("前缀过长"), "错误信息应说明前缀过长, 实际: {msg}");
        // 游标已越过整段零前缀
        assert_eq!(bc.bits_read(), 40);
        assert_eq!(bc.read_bit().unwrap(), 1);
    }

    #[test]
    fn test_more_rbsp_data() {
        // 语法位 101, 然后是 stop bit 1 和对齐零
        let data = [0b1011_0000];
        let mut bc = BitCursor::new(&data);
        assert!(bc.more_rbsp_data());
        bc.read_bits(3).unwrap();
        assert!(!bc.more_rbsp_data());

        // 尾部带 cabac_zero_word 的情况
        let data = [0b1100_0000, 0x00, 0x00];
        let mut bc = BitCursor::new(&data);
        bc.read_bits(1).unwrap();
        assert!(!bc.more_rbsp_data());
    }

    #[test]
    fn test_read_bytes_requires_alignment() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut bc = BitCursor::new(&data);
        assert_eq!(bc.read_bytes(2).unwrap(), &[0x01, 0x02]);
        bc.read_bits(1).unwrap();
        assert!(bc.read_bytes(1).is_err());
        bc.align_to_byte();
        assert_eq!(bc.read_bytes(1).unwrap(), &[0x04]);
    }
}
