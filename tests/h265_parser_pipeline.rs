//! H.265 码流解析器与 HEVC 帧组装器集成测试

mod common;

use common::{hevc_hdr_sei, hevc_pps, hevc_slice, hevc_sps, hevc_stream, hevc_vps};
use zhen::codec::parsers::h265::sei::SEI_MASTERING_DISPLAY_COLOUR_VOLUME;
use zhen::codec::parsers::h265::{
    HevcNalUnitType, parse_hdr_metadata, parse_hevc_pps, parse_hevc_sps, parse_hevc_vps,
    split_hevc_annex_b,
};
use zhen::codec::parsers::h265::ptl::{PROFILE_MAIN, PROFILE_MAIN_10};
use zhen::codec::{Chunk, ChunkFlags, CodecFamily, ConstructorConfig, ConstructorState, create_constructor};

// ============================================================
// 参数集解析
// ============================================================

#[test]
fn test_split_and_parse_parameter_sets() {
    let stream = hevc_stream(2, 20);
    let nalus = split_hevc_annex_b(&stream.data);
    assert_eq!(nalus.len(), 5);
    assert_eq!(nalus[0].nal_type, HevcNalUnitType::Vps);
    assert_eq!(nalus[1].nal_type, HevcNalUnitType::Sps);
    assert_eq!(nalus[2].nal_type, HevcNalUnitType::Pps);
    assert!(nalus[3].nal_type.is_idr());
    assert!(nalus[4].nal_type.is_slice());

    let vps = parse_hevc_vps(&nalus[0].rbsp()).unwrap();
    assert_eq!(vps.vps_id, 0);
    assert_eq!(vps.profile_idc(), PROFILE_MAIN);

    let sps = parse_hevc_sps(&nalus[1].rbsp()).unwrap();
    assert_eq!((sps.width, sps.height), (1280, 720));
    assert_eq!(sps.level_idc(), 93);
    assert_eq!(sps.chroma_format_idc, 1);
    assert!(sps.short_term_rps.is_empty());

    let pps = parse_hevc_pps(&nalus[2].rbsp(), Some(&sps)).unwrap();
    assert_eq!(pps.pps_id, 0);
    assert_eq!(pps.init_qp, 26);
    assert_eq!(pps.log2_parallel_merge_level, 2);
}

#[test]
fn test_main10_reported_from_bit_depth() {
    let nalus = split_hevc_annex_b(&hevc_sps(1, 10));
    let sps = parse_hevc_sps(&nalus[0].rbsp()).unwrap();
    assert_eq!(sps.sps_id, 1);
    assert_eq!(sps.bit_depth_luma, 10);
    assert_eq!(sps.effective_profile_idc(), PROFILE_MAIN_10);
}

#[test]
fn test_hdr_metadata_from_sei_unit() {
    let nalus = split_hevc_annex_b(&hevc_hdr_sei(1000, 400));
    assert_eq!(nalus[0].nal_type, HevcNalUnitType::PrefixSei);
    let hdr = parse_hdr_metadata(&nalus[0].rbsp()).unwrap();

    let md = hdr.mastering_display.unwrap();
    assert_eq!(md.display_primaries[0], (13250, 34500));
    assert_eq!(md.white_point, (15635, 16450));
    assert_eq!(md.max_luminance, 10_000_000);
    assert_eq!(md.min_luminance, 50, "防竞争字节去除后值应正确");
    let cll = hdr.content_light_level.unwrap();
    assert_eq!((cll.max_cll, cll.max_fall), (1000, 400));
}

// ============================================================
// 帧组装器: SEI 等待与缓存
// ============================================================

fn load_all(fc: &mut zhen::codec::AnyFrameConstructor, data: &[u8], flags: ChunkFlags) {
    let mut cycle = fc.load(Chunk::new(data, 0, flags)).unwrap();
    cycle.consume(data.len()).unwrap();
}

#[test]
fn test_constructor_waits_for_hdr_sei() {
    let header = [hevc_vps(0), hevc_sps(0, 10), hevc_pps(0, 0)].concat();
    let mut fc = create_constructor(CodecFamily::Hevc, ConstructorConfig::default());

    load_all(&mut fc, &header, ChunkFlags::HEADER);
    assert_eq!(fc.state(), ConstructorState::HeaderWaitingSupplemental);
    assert!(fc.hdr_metadata().is_empty());

    load_all(&mut fc, &hevc_hdr_sei(800, 200), ChunkFlags::empty());
    assert_eq!(fc.state(), ConstructorState::HeaderObtained);

    let hdr = fc.hdr_metadata();
    assert_eq!(hdr.content_light_level.unwrap().max_cll, 800);
    let payload = fc
        .supplemental_payload(SEI_MASTERING_DISPLAY_COLOUR_VOLUME)
        .expect("mastering display SEI 应被缓存");
    assert_eq!(payload.bit_length, 24 * 8);
    assert_eq!(payload.bytes.len(), 24);

    let sps = fc.as_hevc().unwrap().handler().active_sps().unwrap();
    assert_eq!(sps.bit_depth_luma, 10);
}

#[test]
fn test_slice_ends_sei_wait() {
    let header = [hevc_vps(0), hevc_sps(0, 8), hevc_pps(0, 0)].concat();
    let mut fc = create_constructor(CodecFamily::Hevc, ConstructorConfig::default());
    load_all(&mut fc, &header, ChunkFlags::HEADER);
    assert_eq!(fc.state(), ConstructorState::HeaderWaitingSupplemental);

    load_all(&mut fc, &hevc_slice(0, 30), ChunkFlags::empty());
    assert_eq!(fc.state(), ConstructorState::HeaderObtained);
    assert!(fc.supplemental_payload(137).is_none());
}

#[test]
fn test_wait_disabled_by_config() {
    let header = [hevc_vps(0), hevc_sps(0, 8), hevc_pps(0, 0)].concat();
    let config = ConstructorConfig {
        wait_for_supplemental: false,
        ..ConstructorConfig::default()
    };
    let mut fc = create_constructor(CodecFamily::Hevc, config);
    load_all(&mut fc, &header, ChunkFlags::HEADER);
    assert_eq!(fc.state(), ConstructorState::HeaderObtained);
}

#[test]
fn test_newer_sei_replaces_cached_payload() {
    let mut fc = create_constructor(CodecFamily::Hevc, ConstructorConfig::default());
    load_all(&mut fc, &hevc_hdr_sei(1000, 400), ChunkFlags::HEADER);
    load_all(&mut fc, &hevc_hdr_sei(4000, 1000), ChunkFlags::HEADER);
    let cll = fc.hdr_metadata().content_light_level.unwrap();
    assert_eq!((cll.max_cll, cll.max_fall), (4000, 1000));
}
