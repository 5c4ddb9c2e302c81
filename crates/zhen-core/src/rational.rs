//! 有理数类型, 用于帧率与样本宽高比 (SAR).
//!
//! VUI 中的计时信息和宽高比都以无符号分子/分母给出, 因此这里使用 u32.

use std::fmt;

/// 有理数, 由分子和分母组成
///
/// 例如: 帧率 30000/1001 表示 29.97fps, SAR 16/11 表示非方形像素.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rational {
    /// 分子
    pub num: u32,
    /// 分母
    pub den: u32,
}

impl Rational {
    /// 创建新的有理数
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64 浮点数
    ///
    /// 如果分母为 0, 返回 `f64::NAN`.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 对有理数进行约分
    pub fn reduce(self) -> Self {
        let g = gcd(self.num, self.den);
        if g <= 1 {
            return self;
        }
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(u32, u32)> for Rational {
    fn from((num, den): (u32, u32)) -> Self {
        Self { num, den }
    }
}

/// 求最大公约数 (欧几里得算法)
fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_reduce() {
        assert_eq!(Rational::new(60000, 2002).reduce(), Rational::new(30000, 1001));
        assert_eq!(Rational::new(0, 0).reduce(), Rational::UNDEFINED);
    }

    #[test]
    fn test_rational_invalid_value() {
        let r = Rational::UNDEFINED;
        assert!(!r.is_valid());
        assert!(r.to_f64().is_nan());
    }

    #[test]
    fn test_rational_display() {
        assert_eq!(format!("{}", Rational::new(30000, 1001)), "30000/1001");
    }
}
