//! 集成测试共用的码流构造工具.
//!
//! 参数集按语法逐位写出 (写入器自动插入防竞争字节), 条带只需类型正确且不含起始码.

#![allow(dead_code)]

use zhen::codec::scanner::{AnnexBUnits, AvcSyntax, HevcSyntax};
use zhen::core::BitWriter;

/// 构造好的测试码流
pub struct TestStream {
    pub data: Vec<u8>,
    /// 每个参数集单元 (含起始码) 在 `data` 中的范围, 按出现顺序
    pub headers: Vec<std::ops::Range<usize>>,
}

impl TestStream {
    /// 最后一个参数集结束的位置
    pub fn header_end(&self) -> usize {
        self.headers.last().map_or(0, |r| r.end)
    }

    /// 参数集字节按顺序拼接
    pub fn header_bytes(&self) -> Vec<u8> {
        self.headers
            .iter()
            .flat_map(|r| self.data[r.clone()].iter().copied())
            .collect()
    }

    /// 数据块是否与参数集区域相交
    pub fn intersects_header(&self, range: &std::ops::Range<usize>) -> bool {
        self.headers
            .iter()
            .any(|h| range.start < h.end && h.start < range.end)
    }
}

fn start_code(out: &mut Vec<u8>) {
    out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
}

/// 写出一个 NAL 单元: 起始码 + NAL 头 + 带防竞争字节的 RBSP
fn nal(header: &[u8], write: impl FnOnce(&mut BitWriter)) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write(&mut bw);
    bw.write_trailing_bits().unwrap();
    let mut out = Vec::new();
    start_code(&mut out);
    out.extend_from_slice(header);
    out.extend(bw.finish());
    out
}

/// 条带负载: 非零字节, 不会出现起始码
fn slice_payload(index: usize, len: usize) -> impl Iterator<Item = u8> {
    (0..len).map(move |i| (((index * 31 + i * 7) % 0xEF) as u8) | 0x10)
}

// ============================================================
// H.264
// ============================================================

/// H.264 SPS
pub fn avc_sps(sps_id: u32, profile_idc: u8, chroma_format_idc: u32) -> Vec<u8> {
    nal(&[0x67], |bw| {
        bw.write_bits(profile_idc as u32, 8).unwrap();
        bw.write_bits(0, 8).unwrap(); // constraint_set_flags
        bw.write_bits(30, 8).unwrap(); // level_idc
        bw.write_ue(sps_id).unwrap();
        if matches!(profile_idc, 100 | 110 | 122 | 244) {
            bw.write_ue(chroma_format_idc).unwrap();
            if chroma_format_idc == 3 {
                bw.write_flag(false).unwrap();
            }
            bw.write_ue(0).unwrap(); // bit_depth_luma_minus8
            bw.write_ue(0).unwrap(); // bit_depth_chroma_minus8
            bw.write_flag(false).unwrap();
            bw.write_flag(false).unwrap(); // seq_scaling_matrix_present_flag
        }
        bw.write_ue(0).unwrap(); // log2_max_frame_num_minus4
        bw.write_ue(2).unwrap(); // pic_order_cnt_type
        bw.write_ue(1).unwrap(); // max_num_ref_frames
        bw.write_flag(false).unwrap();
        bw.write_ue(19).unwrap(); // pic_width_in_mbs_minus1
        bw.write_ue(14).unwrap(); // pic_height_in_map_units_minus1
        bw.write_flag(true).unwrap(); // frame_mbs_only_flag
        bw.write_flag(true).unwrap(); // direct_8x8_inference_flag
        bw.write_flag(false).unwrap(); // frame_cropping_flag
        bw.write_flag(false).unwrap(); // vui_parameters_present_flag
    })
}

/// H.264 PPS
pub fn avc_pps(pps_id: u32, sps_id: u32) -> Vec<u8> {
    nal(&[0x68], |bw| {
        bw.write_ue(pps_id).unwrap();
        bw.write_ue(sps_id).unwrap();
        bw.write_flag(false).unwrap(); // entropy_coding_mode_flag
        bw.write_flag(false).unwrap();
        bw.write_ue(0).unwrap(); // num_slice_groups_minus1
        bw.write_ue(0).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_flag(false).unwrap(); // weighted_pred_flag
        bw.write_bits(0, 2).unwrap(); // weighted_bipred_idc
        bw.write_se(0).unwrap(); // pic_init_qp_minus26
        bw.write_se(0).unwrap();
        bw.write_se(0).unwrap(); // chroma_qp_index_offset
        bw.write_flag(true).unwrap(); // deblocking_filter_control_present_flag
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
    })
}

/// H.264 条带, 第一个为 IDR
pub fn avc_slice(index: usize, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    start_code(&mut out);
    out.push(if index == 0 { 0x65 } else { 0x41 });
    out.extend(slice_payload(index, len));
    out
}

/// SPS + PPS + `frames` 个条带
pub fn avc_stream(frames: usize, slice_len: usize) -> TestStream {
    let mut data = Vec::new();
    let mut headers = Vec::new();
    for unit in [avc_sps(0, 66, 1), avc_pps(0, 0)] {
        headers.push(data.len()..data.len() + unit.len());
        data.extend(unit);
    }
    for i in 0..frames {
        data.extend(avc_slice(i, slice_len));
    }
    TestStream { data, headers }
}

// ============================================================
// H.265
// ============================================================

fn hevc_header(unit_type: u8) -> [u8; 2] {
    [unit_type << 1, 0x01]
}

/// general profile_tier_level, Main profile
fn write_ptl(bw: &mut BitWriter, level_idc: u8) {
    bw.write_bits(0, 2).unwrap(); // profile_space
    bw.write_flag(false).unwrap(); // tier
    bw.write_bits(1, 5).unwrap(); // profile_idc
    bw.write_bits(1 << 30, 32).unwrap(); // compatibility_flag[1]
    bw.write_bits(0b1001, 4).unwrap();
    bw.write_bits_u64(0, 44).unwrap();
    bw.write_bits(level_idc as u32, 8).unwrap();
}

/// H.265 VPS
pub fn hevc_vps(vps_id: u8) -> Vec<u8> {
    nal(&hevc_header(32), |bw| {
        bw.write_bits(vps_id as u32, 4).unwrap();
        bw.write_flag(true).unwrap();
        bw.write_flag(true).unwrap();
        bw.write_bits(0, 6).unwrap(); // max_layers_minus1
        bw.write_bits(0, 3).unwrap(); // max_sub_layers_minus1
        bw.write_flag(true).unwrap(); // temporal_id_nesting
        bw.write_bits(0xFFFF, 16).unwrap();
        write_ptl(bw, 93);
        bw.write_flag(true).unwrap(); // sub_layer_ordering_info_present
        bw.write_ue(4).unwrap();
        bw.write_ue(2).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_bits(0, 6).unwrap(); // max_layer_id
        bw.write_ue(0).unwrap(); // num_layer_sets_minus1
        bw.write_flag(false).unwrap(); // timing_info_present
        bw.write_flag(false).unwrap(); // vps_extension_flag
    })
}

/// H.265 SPS, 1280x720, 4:2:0
pub fn hevc_sps(sps_id: u32, bit_depth: u32) -> Vec<u8> {
    nal(&hevc_header(33), |bw| {
        bw.write_bits(0, 4).unwrap(); // vps_id
        bw.write_bits(0, 3).unwrap();
        bw.write_flag(true).unwrap();
        write_ptl(bw, 93);
        bw.write_ue(sps_id).unwrap();
        bw.write_ue(1).unwrap(); // chroma_format_idc
        bw.write_ue(1280).unwrap();
        bw.write_ue(720).unwrap();
        bw.write_flag(false).unwrap(); // conformance_window_flag
        bw.write_ue(bit_depth - 8).unwrap();
        bw.write_ue(bit_depth - 8).unwrap();
        bw.write_ue(4).unwrap(); // log2_max_pic_order_cnt_lsb_minus4
        bw.write_flag(true).unwrap();
        bw.write_ue(4).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_ue(0).unwrap(); // log2_min_luma_coding_block_size_minus3
        bw.write_ue(2).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_ue(3).unwrap();
        bw.write_ue(1).unwrap();
        bw.write_ue(1).unwrap();
        bw.write_flag(false).unwrap(); // scaling_list_enabled_flag
        bw.write_flag(true).unwrap(); // amp
        bw.write_flag(true).unwrap(); // sao
        bw.write_flag(false).unwrap(); // pcm
        bw.write_ue(0).unwrap(); // num_short_term_ref_pic_sets
        bw.write_flag(false).unwrap(); // long_term_ref_pics_present_flag
        bw.write_flag(true).unwrap();
        bw.write_flag(true).unwrap();
        bw.write_flag(false).unwrap(); // vui_parameters_present_flag
        bw.write_flag(false).unwrap(); // sps_extension_present_flag
    })
}

/// H.265 PPS
pub fn hevc_pps(pps_id: u32, sps_id: u32) -> Vec<u8> {
    nal(&hevc_header(34), |bw| {
        bw.write_ue(pps_id).unwrap();
        bw.write_ue(sps_id).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_bits(0, 3).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_ue(0).unwrap();
        bw.write_se(0).unwrap(); // init_qp_minus26
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap(); // cu_qp_delta_enabled_flag
        bw.write_se(0).unwrap();
        bw.write_se(0).unwrap();
        for _ in 0..5 {
            bw.write_flag(false).unwrap();
        }
        bw.write_flag(false).unwrap(); // entropy_coding_sync_enabled_flag
        bw.write_flag(true).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap();
        bw.write_ue(0).unwrap(); // log2_parallel_merge_level_minus2
        bw.write_flag(false).unwrap();
        bw.write_flag(false).unwrap(); // pps_extension_present_flag
    })
}

/// HDR10 前缀 SEI: mastering_display_colour_volume + content_light_level_info
pub fn hevc_hdr_sei(max_cll: u16, max_fall: u16) -> Vec<u8> {
    nal(&hevc_header(39), |bw| {
        bw.write_bits(137, 8).unwrap();
        bw.write_bits(24, 8).unwrap();
        for v in [13250u32, 34500, 7500, 3000, 34000, 16000, 15635, 16450] {
            bw.write_bits(v, 16).unwrap();
        }
        bw.write_bits(10_000_000, 32).unwrap();
        bw.write_bits(50, 32).unwrap();
        bw.write_bits(144, 8).unwrap();
        bw.write_bits(4, 8).unwrap();
        bw.write_bits(max_cll as u32, 16).unwrap();
        bw.write_bits(max_fall as u32, 16).unwrap();
    })
}

/// H.265 条带, 第一个为 IDR_W_RADL, 其余为 TRAIL_R
pub fn hevc_slice(index: usize, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    start_code(&mut out);
    out.extend_from_slice(&hevc_header(if index == 0 { 19 } else { 1 }));
    out.extend(slice_payload(index, len));
    out
}

/// VPS + SPS + PPS + `frames` 个条带
pub fn hevc_stream(frames: usize, slice_len: usize) -> TestStream {
    let mut data = Vec::new();
    let mut headers = Vec::new();
    for unit in [hevc_vps(0), hevc_sps(0, 8), hevc_pps(0, 0)] {
        headers.push(data.len()..data.len() + unit.len());
        data.extend(unit);
    }
    for i in 0..frames {
        data.extend(hevc_slice(i, slice_len));
    }
    TestStream { data, headers }
}

// ============================================================
// 切块
// ============================================================

/// 切块方式
#[derive(Debug, Clone, Copy)]
pub enum Slicing {
    /// 固定大小
    Fixed(usize),
    /// 每个 NAL 单元一块
    PerUnit,
}

/// 按切块方式生成数据块范围
pub fn slice_ranges(data: &[u8], slicing: Slicing, hevc: bool) -> Vec<std::ops::Range<usize>> {
    match slicing {
        Slicing::Fixed(size) => (0..data.len())
            .step_by(size)
            .map(|start| start..(start + size).min(data.len()))
            .collect(),
        Slicing::PerUnit if hevc => AnnexBUnits::<HevcSyntax>::new(data)
            .map(|u| u.offset..u.offset + u.bytes.len())
            .collect(),
        Slicing::PerUnit => AnnexBUnits::<AvcSyntax>::new(data)
            .map(|u| u.offset..u.offset + u.bytes.len())
            .collect(),
    }
}
