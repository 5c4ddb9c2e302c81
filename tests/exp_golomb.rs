//! 指数哥伦布编解码集成测试
//!
//! 写入器关闭防竞争后输出纯 RBSP, 位游标按相同位序读回.

use zhen::core::{BitCursor, BitWriter, ZhenError};

fn rbsp_writer() -> BitWriter {
    let mut bw = BitWriter::new();
    bw.set_emulation_prevention(false);
    bw
}

#[test]
fn test_known_codewords() {
    // ue: 0 -> 1, 1 -> 010, 2 -> 011, 3 -> 00100
    let data = [0b1010_0110, 0b0100_0000];
    let mut bc = BitCursor::new(&data);
    assert_eq!(bc.read_ue().unwrap(), 0);
    assert_eq!(bc.read_ue().unwrap(), 1);
    assert_eq!(bc.read_ue().unwrap(), 2);
    assert_eq!(bc.read_ue().unwrap(), 3);
    assert_eq!(bc.bits_read(), 11);

    // se: 码字 1 -> 1, 2 -> -1, 3 -> 2, 4 -> -2
    let data = [0b0100_1100, 0b1000_0101];
    let mut bc = BitCursor::new(&data);
    assert_eq!(bc.read_se().unwrap(), 1);
    assert_eq!(bc.read_se().unwrap(), -1);
    assert_eq!(bc.read_se().unwrap(), 2);
    assert_eq!(bc.read_se().unwrap(), -2);
}

#[test]
fn test_unsigned_round_trip_across_powers_of_two() {
    let mut values = vec![0u32, 1, u32::MAX - 1, u32::MAX];
    for k in 1..32 {
        values.push((1u32 << k) - 1);
        values.push(1u32 << k);
    }

    let mut bw = rbsp_writer();
    for &v in &values {
        bw.write_ue(v).unwrap();
    }
    bw.write_trailing_bits().unwrap();
    let data = bw.finish();

    let mut bc = BitCursor::new(&data);
    for &v in &values {
        assert_eq!(bc.read_ue().unwrap(), v, "v={v}");
    }
    assert!(!bc.more_rbsp_data());
}

#[test]
fn test_signed_round_trip_interleaved_with_fixed_fields() {
    let values = [0i32, 1, -1, 7, -8, 1 << 20, -(1 << 20), i32::MAX, i32::MIN, i32::MIN + 1];

    let mut bw = rbsp_writer();
    for (i, &v) in values.iter().enumerate() {
        bw.write_se(v).unwrap();
        bw.write_bits(i as u32, 3).unwrap();
    }
    let data = bw.finish();

    let mut bc = BitCursor::new(&data);
    for (i, &v) in values.iter().enumerate() {
        assert_eq!(bc.read_se().unwrap(), v);
        assert_eq!(bc.read_bits(3).unwrap(), i as u32 & 0b111);
    }
}

#[test]
fn test_overlong_prefix_is_malformed() {
    let mut data = vec![0u8; 8];
    data.push(0x80);
    let mut bc = BitCursor::new(&data);
    let err = bc.read_ue().unwrap_err();
    assert!(matches!(err, ZhenError::MalformedBitstream(_)), "err={err}");
    // 游标越过整段零前缀, 停在第一个 1 之前
    assert_eq!(bc.bits_read(), 64);
    assert_eq!(bc.read_bit().unwrap(), 1);
}

#[test]
fn test_truncated_suffix_is_malformed() {
    // 前缀 8 个零加 1, 后缀只剩 7 位
    let data = [0x00, 0xFF];
    let mut bc = BitCursor::new(&data);
    assert!(bc.read_ue().unwrap_err().is_malformed());
}

#[test]
fn test_emulation_prevention_is_transparent_after_removal() {
    let mut bw = BitWriter::new();
    for _ in 0..4 {
        bw.write_bits(0, 23).unwrap();
        bw.write_ue(0).unwrap();
    }
    bw.write_trailing_bits().unwrap();
    assert_eq!(bw.emulation_bytes(), 4);
    let escaped = bw.finish();

    let rbsp = zhen::core::emulation::remove_emulation_prevention(&escaped);
    let mut bc = BitCursor::new(&rbsp);
    for _ in 0..4 {
        assert_eq!(bc.read_bits(23).unwrap(), 0);
        assert_eq!(bc.read_ue().unwrap(), 0);
    }
}
