//! HEVC scaling_list_data 解析.
//!
//! 4 种尺寸 (4x4, 8x8, 16x16, 32x32), 每种尺寸 6/6/6/2 个矩阵.
//! 系数以光栅顺序存储, 16x16 与 32x32 只存 8x8 的基础矩阵, 另带 DC 系数.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

use crate::parsers::ensure_range;

const CODEC: &str = "H.265";

/// 尺寸种类数
pub const SIZE_COUNT: usize = 4;
/// 每种尺寸的矩阵数
pub const MATRIX_COUNT: [usize; SIZE_COUNT] = [6, 6, 6, 2];

/// 4x4 对角扫描 (扫描序号 → 光栅位置)
const SCAN_DIAG_4X4: [u8; 16] = [0, 4, 1, 8, 5, 2, 12, 9, 6, 3, 13, 10, 7, 14, 11, 15];

/// 8x8 对角扫描 (扫描序号 → 光栅位置)
const SCAN_DIAG_8X8: [u8; 64] = [
    0, 8, 1, 16, 9, 2, 24, 17, 10, 3, 32, 25, 18, 11, 4, 40, 33, 26, 19, 12, 5, 48, 41, 34, 27, 20,
    13, 6, 56, 49, 42, 35, 28, 21, 14, 7, 57, 50, 43, 36, 29, 22, 15, 58, 51, 44, 37, 30, 23, 59,
    52, 45, 38, 31, 60, 53, 46, 39, 61, 54, 47, 62, 55, 63,
];

const DEFAULT_INTRA_8X8: [u8; 64] = [
    16, 16, 16, 16, 17, 18, 21, 24, 16, 16, 16, 16, 17, 19, 22, 25, 16, 16, 17, 18, 20, 22, 25, 29,
    16, 16, 18, 21, 24, 27, 31, 36, 17, 17, 20, 24, 30, 35, 41, 47, 18, 19, 22, 27, 35, 44, 54, 65,
    21, 22, 25, 31, 41, 54, 70, 88, 24, 25, 29, 36, 47, 65, 88, 115,
];

const DEFAULT_INTER_8X8: [u8; 64] = [
    16, 16, 16, 16, 17, 18, 20, 24, 16, 16, 16, 17, 18, 20, 24, 25, 16, 16, 17, 18, 20, 24, 25, 28,
    16, 17, 18, 20, 24, 25, 28, 33, 17, 18, 20, 24, 25, 28, 33, 41, 18, 20, 24, 25, 28, 33, 41, 54,
    20, 24, 25, 28, 33, 41, 54, 71, 24, 25, 28, 33, 41, 54, 71, 91,
];

/// 默认 DC 系数
const DEFAULT_DC: u8 = 16;

/// 量化矩阵集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingList {
    /// `coefficients[size_id][matrix_id]`, 4x4 只使用前 16 项
    pub coefficients: [[[u8; 64]; 6]; SIZE_COUNT],
    /// 16x16 / 32x32 的 DC 系数, 其余尺寸恒为 16
    pub dc: [[u8; 6]; SIZE_COUNT],
}

impl Default for ScalingList {
    fn default() -> Self {
        let mut list = Self {
            coefficients: [[[0; 64]; 6]; SIZE_COUNT],
            dc: [[DEFAULT_DC; 6]; SIZE_COUNT],
        };
        for size_id in 0..SIZE_COUNT {
            for matrix_id in 0..MATRIX_COUNT[size_id] {
                list.coefficients[size_id][matrix_id] = default_matrix(size_id, matrix_id);
            }
        }
        list
    }
}

impl ScalingList {
    /// 指定矩阵的有效系数 (4x4 为 16 项, 其余为 64 项)
    pub fn matrix(&self, size_id: usize, matrix_id: usize) -> &[u8] {
        &self.coefficients[size_id][matrix_id][..coef_count(size_id)]
    }
}

fn coef_count(size_id: usize) -> usize {
    if size_id == 0 { 16 } else { 64 }
}

/// 默认矩阵: 4x4 全 16, 8x8/16x16 前 3 个为帧内, 32x32 第 1 个为帧内
fn default_matrix(size_id: usize, matrix_id: usize) -> [u8; 64] {
    let intra_count = if size_id == 3 { 1 } else { 3 };
    match size_id {
        0 => [DEFAULT_DC; 64],
        _ if matrix_id < intra_count => DEFAULT_INTRA_8X8,
        _ => DEFAULT_INTER_8X8,
    }
}

/// 解析 scaling_list_data()
pub fn parse_scaling_list_data(br: &mut BitCursor) -> ZhenResult<ScalingList> {
    let mut list = ScalingList::default();
    for size_id in 0..SIZE_COUNT {
        for matrix_id in 0..MATRIX_COUNT[size_id] {
            let pred_mode = br.read_flag()?;
            if pred_mode {
                decode_dpcm(br, &mut list, size_id, matrix_id)?;
                continue;
            }

            let delta = br.read_ue()? as usize;
            if delta > matrix_id {
                return Err(ZhenError::MalformedBitstream(format!(
                    "H.265: scaling_list_pred_matrix_id_delta 超出范围, value={}",
                    delta
                )));
            }
            let ref_id = matrix_id - delta;
            if ref_id == matrix_id {
                list.coefficients[size_id][matrix_id] = default_matrix(size_id, matrix_id);
                list.dc[size_id][matrix_id] = DEFAULT_DC;
            } else {
                list.coefficients[size_id][matrix_id] = list.coefficients[size_id][ref_id];
                list.dc[size_id][matrix_id] = list.dc[size_id][ref_id];
            }
        }
    }
    Ok(list)
}

fn decode_dpcm(
    br: &mut BitCursor,
    list: &mut ScalingList,
    size_id: usize,
    matrix_id: usize,
) -> ZhenResult<()> {
    let mut next_coef = 8i32;
    if size_id > 1 {
        let dc = ensure_range(CODEC, "scaling_list_dc_coef_minus8", br.read_se()?, -7..=247)? + 8;
        list.dc[size_id][matrix_id] = dc as u8;
        next_coef = dc;
    }

    let scan: &[u8] = if size_id == 0 {
        &SCAN_DIAG_4X4
    } else {
        &SCAN_DIAG_8X8
    };
    let dst = &mut list.coefficients[size_id][matrix_id];
    for &pos in scan {
        let delta = ensure_range(CODEC, "scaling_list_delta_coef", br.read_se()?, -128..=127)?;
        next_coef = (next_coef + delta + 256) % 256;
        dst[pos as usize] = next_coef as u8;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::h264::sps::tests::rbsp_writer;

    #[test]
    fn test_all_default_via_self_reference() {
        let mut bw = rbsp_writer();
        for count in MATRIX_COUNT {
            for _ in 0..count {
                bw.write_flag(false).unwrap(); // copy mode
                bw.write_ue(0).unwrap(); // 引用自身 → 默认矩阵
            }
        }
        bw.write_trailing_bits().unwrap();
        let data = bw.finish();

        let list = parse_scaling_list_data(&mut BitCursor::new(&data)).unwrap();
        assert_eq!(list, ScalingList::default());
        assert_eq!(list.matrix(0, 0), &[16u8; 16]);
        assert_eq!(list.matrix(1, 2)[63], 115, "8x8 帧内默认矩阵");
        assert_eq!(list.matrix(3, 1)[63], 91, "32x32 第 2 个矩阵为帧间默认");
    }

    #[test]
    fn test_dpcm_and_copy() {
        let mut bw = rbsp_writer();
        // 4x4 matrix 0: DPCM, 第一个系数 8+2=10, 其余不变
        bw.write_flag(true).unwrap();
        bw.write_se(2).unwrap();
        for _ in 1..16 {
            bw.write_se(0).unwrap();
        }
        // 4x4 matrix 1: 复制 matrix 0
        bw.write_flag(false).unwrap();
        bw.write_ue(1).unwrap();
        for _ in 2..6 {
            bw.write_flag(false).unwrap();
            bw.write_ue(0).unwrap();
        }
        for _ in 0..6 {
            bw.write_flag(false).unwrap();
            bw.write_ue(0).unwrap();
        }
        // 16x16 matrix 0: DPCM, DC = 8 + 12 = 20, 系数全为 20 + 1 = 21
        bw.write_flag(true).unwrap();
        bw.write_se(12).unwrap();
        bw.write_se(1).unwrap();
        for _ in 1..64 {
            bw.write_se(0).unwrap();
        }
        // 16x16 matrix 1: 复制 matrix 0 (含 DC)
        bw.write_flag(false).unwrap();
        bw.write_ue(1).unwrap();
        for _ in 2..6 {
            bw.write_flag(false).unwrap();
            bw.write_ue(0).unwrap();
        }
        for _ in 0..2 {
            bw.write_flag(false).unwrap();
            bw.write_ue(0).unwrap();
        }
        let data = bw.finish();

        let list = parse_scaling_list_data(&mut BitCursor::new(&data)).unwrap();
        assert_eq!(list.matrix(0, 0), &[10u8; 16]);
        assert_eq!(list.matrix(0, 1), &[10u8; 16]);
        assert_eq!(list.dc[2][0], 20);
        assert_eq!(list.matrix(2, 0), &[21u8; 64]);
        assert_eq!(list.dc[2][1], 20);
        assert_eq!(list.matrix(2, 1), &[21u8; 64]);
        assert_eq!(list.dc[2][2], 16);
    }

    #[test]
    fn test_invalid_delta_rejected() {
        let mut bw = rbsp_writer();
        bw.write_flag(false).unwrap();
        bw.write_ue(1).unwrap(); // matrix 0 不能引用 -1
        let data = bw.finish();
        assert!(
            parse_scaling_list_data(&mut BitCursor::new(&data))
                .unwrap_err()
                .is_malformed()
        );

        let mut bw = rbsp_writer();
        bw.write_flag(true).unwrap();
        bw.write_se(128).unwrap(); // delta_coef 越界
        let data = bw.finish();
        assert!(parse_scaling_list_data(&mut BitCursor::new(&data)).is_err());
    }
}
