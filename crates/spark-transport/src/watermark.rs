use core::fmt;

/// 写缓冲高/低水位线。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 通道以“已排队未发送字节数”驱动可写性：越过高水位变为不可写，回落到低水位之下
///   才恢复可写；两条线之间的区间即滞回带，避免在阈值附近反复翻转。
///
/// ## 契约（What）
/// - `low <= high`，由 [`WriteBufferWaterMark::new`] 与反序列化共同保证；
/// - 默认值为 `low = 32 KiB`、`high = 64 KiB`；
/// - 判定使用严格比较：`outstanding > high` 触发不可写，`outstanding < low` 恢复可写。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(try_from = "RawWaterMark")]
pub struct WriteBufferWaterMark {
    low: usize,
    high: usize,
}

#[derive(serde::Deserialize)]
struct RawWaterMark {
    low: usize,
    high: usize,
}

impl TryFrom<RawWaterMark> for WriteBufferWaterMark {
    type Error = WaterMarkError;

    fn try_from(raw: RawWaterMark) -> Result<Self, Self::Error> {
        Self::new(raw.low, raw.high)
    }
}

impl WriteBufferWaterMark {
    /// 默认低水位。
    pub const DEFAULT_LOW: usize = 32 * 1024;
    /// 默认高水位。
    pub const DEFAULT_HIGH: usize = 64 * 1024;

    /// 构造水位线，`low > high` 时返回错误。
    pub const fn new(low: usize, high: usize) -> Result<Self, WaterMarkError> {
        if low > high {
            return Err(WaterMarkError { low, high });
        }
        Ok(Self { low, high })
    }

    /// 低水位。
    pub const fn low(&self) -> usize {
        self.low
    }

    /// 高水位。
    pub const fn high(&self) -> usize {
        self.high
    }
}

impl Default for WriteBufferWaterMark {
    fn default() -> Self {
        Self {
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
        }
    }
}

/// 水位线参数非法。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaterMarkError {
    pub low: usize,
    pub high: usize,
}

impl fmt::Display for WaterMarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "write buffer low water mark {} exceeds high water mark {}",
            self.low, self.high
        )
    }
}

#[cfg(feature = "std")]
impl std::error::Error for WaterMarkError {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_matches_documented_marks() {
        let marks = WriteBufferWaterMark::default();
        assert_eq!((marks.low(), marks.high()), (32 * 1024, 64 * 1024));
    }

    proptest! {
        #[test]
        fn construction_accepts_exactly_ordered_pairs(low in 0usize..1_000_000, high in 0usize..1_000_000) {
            let result = WriteBufferWaterMark::new(low, high);
            prop_assert_eq!(result.is_ok(), low <= high);
        }
    }
}
