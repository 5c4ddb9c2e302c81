//! H.264 码流解析器集成测试

mod common;

use common::{avc_pps, avc_sps};
use zhen::codec::parsers::h264::{
    NalUnit, NalUnitType, parse_pps, parse_sps, peek_pps_ids, split_annex_b,
};
use zhen::codec::{Chunk, ChunkFlags, CodecFamily, ConstructorConfig, create_constructor};
use zhen::core::ZhenError;

// ============================================================
// NAL 分割测试
// ============================================================

/// 构造典型的 H.264 Annex B 码流 (SPS + PPS + IDR + P)
fn build_typical_annex_b() -> Vec<u8> {
    let mut data = Vec::new();

    // SPS (4字节起始码)
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
    data.extend_from_slice(&[0x67, 0x42, 0x00, 0x1E, 0xAB, 0xCD]);

    // PPS (3字节起始码)
    data.extend_from_slice(&[0x00, 0x00, 0x01]);
    data.extend_from_slice(&[0x68, 0xCE, 0x38, 0x80]);

    // IDR 切片 (4字节起始码), 尾部带 trailing_zero_8bits
    data.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
    data.extend_from_slice(&[0x65, 0x88, 0x80, 0x40, 0x00, 0xFF, 0xFE, 0x00, 0x00]);

    // P 切片 (3字节起始码)
    data.extend_from_slice(&[0x00, 0x00, 0x01]);
    data.extend_from_slice(&[0x41, 0x9A, 0x01, 0x02, 0x03]);

    data
}

#[test]
fn test_annex_b_full_parse() {
    let data = build_typical_annex_b();
    let nalus = split_annex_b(&data);

    assert_eq!(nalus.len(), 4, "应该有 4 个 NAL 单元");
    assert_eq!(nalus[0].nal_type, NalUnitType::Sps);
    assert_eq!(nalus[1].nal_type, NalUnitType::Pps);
    assert_eq!(nalus[2].nal_type, NalUnitType::SliceIdr);
    assert_eq!(nalus[3].nal_type, NalUnitType::Slice);

    // IDR 是关键帧, 尾部零字节已去除
    assert!(nalus[2].nal_type.is_idr());
    assert!(nalus[2].nal_type.is_vcl());
    assert_eq!(nalus[2].data.last(), Some(&0xFE));

    // P slice 不是关键帧
    assert!(!nalus[3].nal_type.is_idr());
    assert!(nalus[3].nal_type.is_vcl());
}

#[test]
fn test_ref_idc_extract() {
    // nal_ref_idc=3, type=7 (SPS): 0b0_11_00111 = 0x67
    let nalu = NalUnit::parse(&[0x67, 0x42]).unwrap();
    assert_eq!(nalu.ref_idc, 3);

    // nal_ref_idc=0, type=6 (SEI): 0b0_00_00110 = 0x06
    let nalu = NalUnit::parse(&[0x06, 0xAA]).unwrap();
    assert_eq!(nalu.ref_idc, 0);

    // forbidden_zero_bit=1
    assert!(NalUnit::parse(&[0xE7]).unwrap_err().is_malformed());
}

// ============================================================
// SPS 解析集成测试
// ============================================================

/// 构造 Baseline Profile SPS 的 RBSP 数据 (使用位流编码)
fn build_sps_rbsp(width: u32, height: u32) -> Vec<u8> {
    let mut bits = Vec::new();

    // profile_idc=66 (Baseline)
    push_u8(&mut bits, 66);
    // constraint_set_flags=0xC0
    push_u8(&mut bits, 0xC0);
    // level_idc=31
    push_u8(&mut bits, 31);

    // sps_id=0
    write_ue(&mut bits, 0);
    // log2_max_frame_num_minus4=0
    write_ue(&mut bits, 0);
    // pic_order_cnt_type=0
    write_ue(&mut bits, 0);
    // log2_max_pic_order_cnt_lsb_minus4=0
    write_ue(&mut bits, 0);
    // max_num_ref_frames=4
    write_ue(&mut bits, 4);
    // gaps=0
    bits.push(false);

    let mbs_w = width.div_ceil(16);
    let mbs_h = height.div_ceil(16);
    write_ue(&mut bits, mbs_w - 1);
    write_ue(&mut bits, mbs_h - 1);
    // frame_mbs_only=1
    bits.push(true);
    // direct_8x8=0
    bits.push(false);

    // Cropping
    let raw_w = mbs_w * 16;
    let raw_h = mbs_h * 16;
    if raw_w != width || raw_h != height {
        bits.push(true);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, (raw_w - width) / 2);
        write_ue(&mut bits, 0);
        write_ue(&mut bits, (raw_h - height) / 2);
    } else {
        bits.push(false);
    }

    // VUI=0
    bits.push(false);
    // rbsp_stop_one_bit
    bits.push(true);

    bits_to_bytes(&bits)
}

fn push_u8(bits: &mut Vec<bool>, val: u8) {
    for i in (0..8).rev() {
        bits.push(((val >> i) & 1) != 0);
    }
}

fn write_ue(bits: &mut Vec<bool>, val: u32) {
    if val == 0 {
        bits.push(true);
        return;
    }
    let code = val + 1;
    let n = 32 - code.leading_zeros();
    for _ in 0..n - 1 {
        bits.push(false);
    }
    for i in (0..n).rev() {
        bits.push(((code >> i) & 1) != 0);
    }
}

fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for chunk in bits.chunks(8) {
        let mut byte = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            if bit {
                byte |= 1 << (7 - i);
            }
        }
        bytes.push(byte);
    }
    bytes
}

#[test]
fn test_sps_common_resolution_1280x720() {
    let rbsp = build_sps_rbsp(1280, 720);
    let sps = parse_sps(&rbsp).unwrap();

    assert_eq!(sps.profile_idc, 66);
    assert_eq!(sps.level_idc, 31);
    assert_eq!(sps.width, 1280);
    assert_eq!(sps.height, 720);
    // 720 是 16 的整数倍, 不需要 cropping
    assert_eq!(sps.crop, [0, 0, 0, 0]);
    assert_eq!(sps.chroma_format_idc, 1); // 4:2:0
    assert_eq!(sps.max_num_ref_frames, 4);
}

#[test]
fn test_sps_need_cropping_1920x1080() {
    let rbsp = build_sps_rbsp(1920, 1080);
    let sps = parse_sps(&rbsp).unwrap();

    // 1080 不是 16 的整数倍: ceil(1080/16)=68, 68*16=1088
    // crop_bottom = (1088-1080)/2 = 4
    assert_eq!(sps.pic_height_in_map_units, 68);
    assert_eq!(sps.crop[3], 4);
    assert_eq!(sps.width, 1920);
    assert_eq!(sps.height, 1080);
    assert!(sps.frame_mbs_only);
}

#[test]
fn test_full_pipeline_annex_b_extract_sps_and_pps() {
    let mut annexb = avc_sps(2, 100, 1);
    annexb.extend(avc_pps(5, 2));

    let nalus = split_annex_b(&annexb);
    assert_eq!(nalus.len(), 2);

    let sps_nalu = nalus.iter().find(|n| n.nal_type == NalUnitType::Sps).unwrap();
    let sps = parse_sps(&sps_nalu.rbsp()).unwrap();
    assert_eq!(sps.sps_id, 2);
    assert_eq!(sps.profile_idc, 100);
    assert_eq!((sps.width, sps.height), (320, 240));

    let pps_rbsp = nalus[1].rbsp();
    assert_eq!(peek_pps_ids(&pps_rbsp).unwrap(), (5, 2));
    let pps = parse_pps(&pps_rbsp, Some(&sps)).unwrap();
    assert_eq!(pps.pps_id, 5);
    assert_eq!(pps.sps_id, 2);
}

// ============================================================
// 越界拒绝
// ============================================================

#[test]
fn test_chroma_format_idc_4_rejected() {
    let unit = avc_sps(0, 100, 4);
    let nalus = split_annex_b(&unit);
    let err = parse_sps(&nalus[0].rbsp()).unwrap_err();
    assert!(matches!(err, ZhenError::MalformedBitstream(_)), "err={err}");
    assert!(err.to_string().contains("chroma_format_idc"));
}

#[test]
fn test_rejected_sps_keeps_cached_record() {
    let good = avc_sps(0, 100, 2);
    let bad = avc_sps(0, 100, 4);
    let mut fc = create_constructor(CodecFamily::Avc, ConstructorConfig::default());

    for unit in [&good, &bad] {
        let mut cycle = fc.load(Chunk::new(unit, 0, ChunkFlags::HEADER)).unwrap();
        cycle.consume(unit.len()).unwrap();
    }

    let avc = fc.as_avc().unwrap().handler();
    let cached = avc.sps_set().get(0).expect("SPS 0 应仍在缓存中");
    assert_eq!(cached.chroma_format_idc, 2);
    assert_eq!(avc.raw_headers().sequence(), Some(&good[..]));
}
