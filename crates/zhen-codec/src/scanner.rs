//! Annex B 单元扫描器.
//!
//! 在一段原始字节中查找起始码 (`00 00 01`, 前面允许再有一个 `00`),
//! 并按编码格式从起始码后的首字节提取单元类型.
//!
//! 找不到完整的起始码时返回 [`ScanOutcome::NeedMoreData`],
//! 其中 `retain` 表示尾部需要保留到下一块数据再扫描的字节数 (0..=3),
//! 因为起始码可能跨越两个数据块.

use std::marker::PhantomData;

use zhen_core::emulation::count_emulation_prevention;

/// 编码格式相关的单元语法
///
/// 由零大小类型实现, 在构造帧组装器时静态选定.
pub trait UnitSyntax {
    /// 格式名称, 用于日志
    const NAME: &'static str;
    /// 获得参数集后是否还需等待 SEI
    const WAITS_FOR_SUPPLEMENTAL: bool;

    /// 从起始码后的首字节提取单元类型
    fn unit_type(first_byte: u8) -> u8;
    /// 序列级参数集 (SPS)
    fn is_sequence_header(unit_type: u8) -> bool;
    /// 图像级参数集 (PPS)
    fn is_picture_header(unit_type: u8) -> bool;
    /// 视频级参数集 (VPS), 仅 HEVC 存在
    fn is_video_header(_unit_type: u8) -> bool {
        false
    }
    /// 增补增强信息 (SEI)
    fn is_supplemental(unit_type: u8) -> bool;
    /// 编码切片
    fn is_coded_slice(unit_type: u8) -> bool;
    /// IDR 切片
    fn is_idr(unit_type: u8) -> bool;
}

/// H.264 单元语法: 类型占首字节低 5 位
#[derive(Debug, Clone, Copy, Default)]
pub struct AvcSyntax;

impl UnitSyntax for AvcSyntax {
    const NAME: &'static str = "H.264";
    const WAITS_FOR_SUPPLEMENTAL: bool = false;

    fn unit_type(first_byte: u8) -> u8 {
        first_byte & 0x1F
    }

    fn is_sequence_header(unit_type: u8) -> bool {
        unit_type == 7
    }

    fn is_picture_header(unit_type: u8) -> bool {
        unit_type == 8
    }

    fn is_supplemental(unit_type: u8) -> bool {
        unit_type == 6
    }

    fn is_coded_slice(unit_type: u8) -> bool {
        (1..=5).contains(&unit_type)
    }

    fn is_idr(unit_type: u8) -> bool {
        unit_type == 5
    }
}

/// H.265 单元语法: 类型占首字节的第 1..=6 位
#[derive(Debug, Clone, Copy, Default)]
pub struct HevcSyntax;

impl UnitSyntax for HevcSyntax {
    const NAME: &'static str = "H.265";
    const WAITS_FOR_SUPPLEMENTAL: bool = true;

    fn unit_type(first_byte: u8) -> u8 {
        (first_byte >> 1) & 0x3F
    }

    fn is_sequence_header(unit_type: u8) -> bool {
        unit_type == 33
    }

    fn is_picture_header(unit_type: u8) -> bool {
        unit_type == 34
    }

    fn is_video_header(unit_type: u8) -> bool {
        unit_type == 32
    }

    fn is_supplemental(unit_type: u8) -> bool {
        matches!(unit_type, 39 | 40)
    }

    fn is_coded_slice(unit_type: u8) -> bool {
        matches!(unit_type, 0..=9 | 16..=21)
    }

    fn is_idr(unit_type: u8) -> bool {
        matches!(unit_type, 19 | 20)
    }
}

/// 单元边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitBoundary {
    /// 起始码第一个字节的偏移
    pub offset: usize,
    /// 起始码长度 (3 或 4)
    pub start_code_len: usize,
    /// 单元类型
    pub unit_type: u8,
}

/// 扫描结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// 找到完整的起始码与类型字节
    Found(UnitBoundary),
    /// 未找到, 尾部 `retain` 个字节可能是起始码的一部分
    NeedMoreData { retain: usize },
}

/// 查找下一个起始码
///
/// 起始码前超过 3 个的零字节视为上一个单元的 trailing_zero_8bits.
pub fn find_start_code<S: UnitSyntax>(data: &[u8]) -> ScanOutcome {
    let mut zeros = 0usize;
    for (i, &byte) in data.iter().enumerate() {
        if byte == 0 {
            zeros += 1;
            continue;
        }
        if byte == 1 && zeros >= 2 {
            let Some(&first) = data.get(i + 1) else {
                // 起始码已完整但类型字节还没到
                return ScanOutcome::NeedMoreData {
                    retain: zeros.min(3) + 1,
                };
            };
            let lead = zeros.min(3);
            return ScanOutcome::Found(UnitBoundary {
                offset: i - lead,
                start_code_len: lead + 1,
                unit_type: S::unit_type(first),
            });
        }
        zeros = 0;
    }
    ScanOutcome::NeedMoreData {
        retain: zeros.min(3),
    }
}

/// 扫描得到的单元 (含起始码)
#[derive(Debug, Clone, Copy)]
pub struct ScannedUnit<'a> {
    /// 起始码在原数据中的偏移
    pub offset: usize,
    /// 起始码长度
    pub start_code_len: usize,
    /// 单元类型
    pub unit_type: u8,
    /// 从起始码到下一个起始码之前的全部字节
    pub bytes: &'a [u8],
}

impl<'a> ScannedUnit<'a> {
    /// 去掉起始码后的数据 (含 NAL 头)
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[self.start_code_len..]
    }

    /// 单元内的防竞争字节数
    pub fn emulation_bytes(&self) -> usize {
        count_emulation_prevention(self.payload())
    }
}

/// Annex B 单元迭代器
///
/// 第一个起始码之前的字节被忽略.
pub struct AnnexBUnits<'a, S: UnitSyntax> {
    data: &'a [u8],
    next: Option<UnitBoundary>,
    emulation_bytes: usize,
    _syntax: PhantomData<S>,
}

impl<'a, S: UnitSyntax> AnnexBUnits<'a, S> {
    /// 创建迭代器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            next: locate::<S>(data, 0),
            emulation_bytes: 0,
            _syntax: PhantomData,
        }
    }

    /// 已产出单元中累计的防竞争字节数
    pub fn emulation_bytes(&self) -> usize {
        self.emulation_bytes
    }
}

impl<'a, S: UnitSyntax> Iterator for AnnexBUnits<'a, S> {
    type Item = ScannedUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        // 跳过类型字节后继续查找, 保证前进
        let type_pos = current.offset + current.start_code_len;
        self.next = locate::<S>(self.data, type_pos + 1);
        let end = self.next.map_or(self.data.len(), |b| b.offset);

        let unit = ScannedUnit {
            offset: current.offset,
            start_code_len: current.start_code_len,
            unit_type: current.unit_type,
            bytes: &self.data[current.offset..end],
        };
        self.emulation_bytes += unit.emulation_bytes();
        Some(unit)
    }
}

fn locate<S: UnitSyntax>(data: &[u8], from: usize) -> Option<UnitBoundary> {
    if from >= data.len() {
        return None;
    }
    match find_start_code::<S>(&data[from..]) {
        ScanOutcome::Found(mut boundary) => {
            boundary.offset += from;
            Some(boundary)
        }
        ScanOutcome::NeedMoreData { .. } => None,
    }
}
