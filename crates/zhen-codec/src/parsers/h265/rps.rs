//! 短期参考图像集 (st_ref_pic_set) 解析.
//!
//! SPS 中第 `idx` 个 RPS 可以由前一个 RPS 预测得到 (inter_ref_pic_set_prediction).
//! 切片头中的 RPS 编号等于 SPS 中的 RPS 个数, 此时额外携带 delta_idx_minus1.

use zhen_core::{BitCursor, ZhenError, ZhenResult};

/// 单个 RPS 的最大图像数 (不含)
pub const MAX_NUM_REF_PICS: u32 = 16;

/// 短期参考图像集
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortTermRps {
    /// inter_ref_pic_set_prediction_flag
    pub inter_rps_pred: bool,
    /// NumNegativePics
    pub num_negative: u32,
    /// NumPositivePics
    pub num_positive: u32,
    /// 与当前图像的 POC 差值; 前 num_negative 项为负数且由近及远, 之后为正数由近及远
    pub delta_poc: Vec<i32>,
    /// used_by_curr_pic 标志, 与 delta_poc 一一对应
    pub used_by_curr_pic: Vec<bool>,
}

impl ShortTermRps {
    /// NumDeltaPocs
    pub fn num_pics(&self) -> usize {
        self.delta_poc.len()
    }

    /// 被当前图像使用的参考图像数
    pub fn num_used(&self) -> usize {
        self.used_by_curr_pic.iter().filter(|&&u| u).count()
    }

    /// 按 POC 差值升序排列, 再把负数部分反转为由近及远
    fn sort_delta_poc(&mut self) {
        let mut pairs: Vec<(i32, bool)> = self
            .delta_poc
            .iter()
            .copied()
            .zip(self.used_by_curr_pic.iter().copied())
            .collect();
        pairs.sort_by_key(|&(delta, _)| delta);
        pairs[..self.num_negative as usize].reverse();
        (self.delta_poc, self.used_by_curr_pic) = pairs.into_iter().unzip();
    }
}

/// 解析第 `idx` 个 st_ref_pic_set
///
/// `previous` 为已解析的 SPS RPS 列表, `num_sets` 为 SPS 中的 RPS 个数.
pub fn parse_short_term_ref_pic_set(
    br: &mut BitCursor,
    idx: usize,
    num_sets: usize,
    previous: &[ShortTermRps],
) -> ZhenResult<ShortTermRps> {
    let inter_rps_pred = idx > 0 && br.read_flag()?;
    if inter_rps_pred {
        parse_predicted(br, idx, num_sets, previous)
    } else {
        parse_explicit(br)
    }
}

fn parse_predicted(
    br: &mut BitCursor,
    idx: usize,
    num_sets: usize,
    previous: &[ShortTermRps],
) -> ZhenResult<ShortTermRps> {
    let delta_idx_minus1 = if idx == num_sets {
        br.read_ue()? as usize
    } else {
        0
    };
    let ref_rps = idx
        .checked_sub(delta_idx_minus1 + 1)
        .and_then(|ref_idx| previous.get(ref_idx))
        .ok_or_else(|| {
            ZhenError::MalformedBitstream(format!(
                "H.265: delta_idx_minus1 超出范围, idx={}, value={}",
                idx, delta_idx_minus1
            ))
        })?;

    let delta_rps_sign = br.read_flag()?;
    let abs_delta_rps = br.read_ue()? as i64 + 1;
    let delta_rps = if delta_rps_sign {
        -abs_delta_rps
    } else {
        abs_delta_rps
    };

    let mut rps = ShortTermRps {
        inter_rps_pred: true,
        ..ShortTermRps::default()
    };
    for j in 0..=ref_rps.num_pics() {
        let used = br.read_flag()?;
        let use_delta = used || br.read_flag()?;
        if !use_delta {
            continue;
        }
        let base = ref_rps.delta_poc.get(j).copied().unwrap_or(0) as i64;
        let delta_poc = i32::try_from(delta_rps + base).map_err(|_| {
            ZhenError::MalformedBitstream(format!(
                "H.265: RPS deltaPoc 溢出, delta_rps={}",
                delta_rps
            ))
        })?;
        if delta_poc < 0 {
            rps.num_negative += 1;
        } else {
            rps.num_positive += 1;
        }
        rps.delta_poc.push(delta_poc);
        rps.used_by_curr_pic.push(used);
    }
    rps.sort_delta_poc();
    Ok(rps)
}

fn parse_explicit(br: &mut BitCursor) -> ZhenResult<ShortTermRps> {
    let num_negative = br.read_ue()?;
    let num_positive = br.read_ue()?;
    if num_negative >= MAX_NUM_REF_PICS
        || num_positive >= MAX_NUM_REF_PICS
        || num_negative + num_positive >= MAX_NUM_REF_PICS
    {
        return Err(ZhenError::MalformedBitstream(format!(
            "H.265: RPS 图像数超出范围, negative={}, positive={}",
            num_negative, num_positive
        )));
    }

    let total = (num_negative + num_positive) as usize;
    let mut rps = ShortTermRps {
        inter_rps_pred: false,
        num_negative,
        num_positive,
        delta_poc: Vec::with_capacity(total),
        used_by_curr_pic: Vec::with_capacity(total),
    };

    let mut prev = 0i64;
    for _ in 0..num_negative {
        prev -= br.read_ue()? as i64 + 1;
        rps.delta_poc.push(clamp_poc(prev)?);
        rps.used_by_curr_pic.push(br.read_flag()?);
    }
    prev = 0;
    for _ in 0..num_positive {
        prev += br.read_ue()? as i64 + 1;
        rps.delta_poc.push(clamp_poc(prev)?);
        rps.used_by_curr_pic.push(br.read_flag()?);
    }
    Ok(rps)
}

fn clamp_poc(value: i64) -> ZhenResult<i32> {
    i32::try_from(value).map_err(|_| {
        ZhenError::MalformedBitstream(format!("H.265: RPS deltaPoc 溢出, value={}", value))
    })
}
