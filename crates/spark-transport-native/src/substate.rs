use crate::error::ChannelError;

/// 激活状态内部的半关闭子状态。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 读、写两个方向可以独立关闭；子状态只在连接处于激活态时存在，
///   因此它被嵌入生命周期枚举的 `Active` 变体，而不是作为游离的布尔字段。
/// - “双向均已关闭”不单独建模：转换函数报告 [`HalfCloseOutcome::BothClosed`]，
///   由外层生命周期负责执行完整关闭。
///
/// ## 契约 (What)
/// - `close_input`：仅在 `Open`/`OutputClosed` 合法，否则返回 [`ChannelError::InputClosed`]；
/// - `close_output`：仅在 `Open`/`InputClosed` 合法，否则返回 [`ChannelError::OutputClosed`]；
/// - 转换失败时子状态保持不变；两者都是纯状态转换，不触发 IO。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub(crate) enum ActiveSubstate {
    #[default]
    Open,
    InputClosed,
    OutputClosed,
}

/// 半关闭转换的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum HalfCloseOutcome {
    /// 另一方向仍然打开。
    OtherSideOpen,
    /// 两个方向都已关闭，需要外层执行完整关闭。
    BothClosed,
}

impl ActiveSubstate {
    pub(crate) fn close_input(&mut self) -> Result<HalfCloseOutcome, ChannelError> {
        match self {
            ActiveSubstate::Open => {
                *self = ActiveSubstate::InputClosed;
                Ok(HalfCloseOutcome::OtherSideOpen)
            }
            ActiveSubstate::OutputClosed => Ok(HalfCloseOutcome::BothClosed),
            ActiveSubstate::InputClosed => Err(ChannelError::InputClosed),
        }
    }

    pub(crate) fn close_output(&mut self) -> Result<HalfCloseOutcome, ChannelError> {
        match self {
            ActiveSubstate::Open => {
                *self = ActiveSubstate::OutputClosed;
                Ok(HalfCloseOutcome::OtherSideOpen)
            }
            ActiveSubstate::InputClosed => Ok(HalfCloseOutcome::BothClosed),
            ActiveSubstate::OutputClosed => Err(ChannelError::OutputClosed),
        }
    }

    pub(crate) fn is_input_closed(self) -> bool {
        matches!(self, ActiveSubstate::InputClosed)
    }

    pub(crate) fn is_output_closed(self) -> bool {
        matches!(self, ActiveSubstate::OutputClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sides_close_independently() {
        let mut substate = ActiveSubstate::default();
        assert_eq!(substate.close_output(), Ok(HalfCloseOutcome::OtherSideOpen));
        assert!(substate.is_output_closed());
        assert!(!substate.is_input_closed());
        assert_eq!(substate.close_input(), Ok(HalfCloseOutcome::BothClosed));
    }

    #[test]
    fn repeated_close_fails_without_changing_state() {
        let mut substate = ActiveSubstate::InputClosed;
        assert_eq!(substate.close_input(), Err(ChannelError::InputClosed));
        assert_eq!(substate, ActiveSubstate::InputClosed);

        let mut substate = ActiveSubstate::OutputClosed;
        assert_eq!(substate.close_output(), Err(ChannelError::OutputClosed));
        assert_eq!(substate, ActiveSubstate::OutputClosed);
    }
}
