//! 原生通道的错误词汇表：把原生传输的错误码与通道状态错误统一映射为 [`ChannelError`]。

use std::fmt;

use thiserror::Error;

/// 原生错误所属的域。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NativeErrorDomain {
    /// POSIX `errno` 风格错误（连接被拒、重置、超时等）。
    Posix,
    /// 名称解析失败。
    Dns,
    /// 安全层握手或记录层失败。
    Tls,
}

impl fmt::Display for NativeErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NativeErrorDomain::Posix => "posix",
            NativeErrorDomain::Dns => "dns",
            NativeErrorDomain::Tls => "tls",
        };
        f.write_str(label)
    }
}

/// 原生传输上报的错误值。
///
/// # 契约（What）
/// - `domain` + `code` 唯一标识错误来源，`message` 仅供日志展示；
/// - 原生层在 `Waiting`/`Failed` 状态、收发完成回调中携带该值；
/// - 适配器从不构造新的 `NativeError`，只负责转交。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{domain} error {code}: {message}")]
pub struct NativeError {
    pub domain: NativeErrorDomain,
    pub code: i32,
    pub message: String,
}

impl NativeError {
    /// 构造 POSIX 域错误。
    pub fn posix(code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: NativeErrorDomain::Posix,
            code,
            message: message.into(),
        }
    }

    /// 构造 DNS 域错误。
    pub fn dns(code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: NativeErrorDomain::Dns,
            code,
            message: message.into(),
        }
    }

    /// 构造 TLS 域错误。
    pub fn tls(code: i32, message: impl Into<String>) -> Self {
        Self {
            domain: NativeErrorDomain::Tls,
            code,
            message: message.into(),
        }
    }
}

/// 错误对连接生命周期的影响等级。
///
/// - `State`：协议/状态错误，仅失败当次操作的 Promise 或向 Pipeline 报告，连接保持原状；
/// - `Transport`：传输错误，总是升级为完整关闭。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    State,
    Transport,
}

/// 通道层统一错误。
///
/// # 教案式说明
/// - **意图 (Why)**：Pipeline 只理解一套错误词汇；原生层错误、半关闭冲突、选项非法等
///   需要在同一枚举中表达，并附带稳定错误码以便日志与告警聚合。
/// - **契约 (What)**：
///   - [`ChannelError::code`] 返回 `spark.transport.native.*` 形式的稳定错误码；
///   - [`ChannelError::class`] 决定错误是否导致连接拆除；
///   - 所有变体可 `Clone`，同一错误可以同时失败多个待发写入与建连 Promise。
/// - **设计权衡 (Trade-offs)**：原生错误整体嵌入而非拆平，保留域与错误码原貌，代价是
///   `ChannelError` 体积略大。
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ChannelError {
    /// 在未激活或已关闭的通道上执行 IO。
    #[error("I/O on closed channel")]
    ClosedChannel,

    /// 重复关闭。
    #[error("channel already closed")]
    AlreadyClosed,

    /// 写方向已经半关闭。
    #[error("output already closed")]
    OutputClosed,

    /// 读方向已经半关闭。
    #[error("input already closed")]
    InputClosed,

    /// 通道不支持该操作或事件。
    #[error("operation unsupported")]
    OperationUnsupported,

    /// 原生传输无法表达的套接字选项类别。
    #[error("unsupported socket option: level {level}, name {name}")]
    UnsupportedSocketOption { level: i32, name: i32 },

    /// 当前生命周期阶段不允许该操作（例如重复发起建连）。
    #[error("inappropriate operation for state `{state}`")]
    InappropriateState { state: &'static str },

    /// 选项在激活开始后不可再修改。
    #[error("option `{option}` cannot change after activation began")]
    OptionLocked { option: &'static str },

    /// 水位线参数非法。
    #[error(transparent)]
    InvalidWaterMark(#[from] spark_transport::WaterMarkError),

    /// 读到 EOF 且未开启远端半关闭支持。
    #[error("end of file")]
    Eof,

    /// 连接尚无当前网络路径，无法查询端点。
    #[error("connection has no current network path")]
    NoCurrentPath,

    /// 路径端点不是 IP 端点，无法折算为套接字地址。
    #[error("endpoint `{endpoint}` cannot be expressed as a socket address")]
    UnsupportedEndpoint { endpoint: String },

    /// 原生传输上报的错误。
    #[error("native transport failure: {0}")]
    Transport(#[from] NativeError),

    /// 未经本地关闭就收到了原生层的取消确认。
    #[error("native connection reported cancellation without a local close")]
    UnexpectedCancellation,

    /// 驱动任务已退出，命令无法送达。
    #[error("channel driver is gone")]
    DriverGone,

    /// 配置文本无法解析。
    #[error("invalid channel configuration: {detail}")]
    InvalidConfiguration { detail: String },
}

impl ChannelError {
    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::ClosedChannel => "spark.transport.native.closed_channel",
            ChannelError::AlreadyClosed => "spark.transport.native.already_closed",
            ChannelError::OutputClosed => "spark.transport.native.output_closed",
            ChannelError::InputClosed => "spark.transport.native.input_closed",
            ChannelError::OperationUnsupported => "spark.transport.native.operation_unsupported",
            ChannelError::UnsupportedSocketOption { .. } => {
                "spark.transport.native.unsupported_socket_option"
            }
            ChannelError::InappropriateState { .. } => "spark.transport.native.inappropriate_state",
            ChannelError::OptionLocked { .. } => "spark.transport.native.option_locked",
            ChannelError::InvalidWaterMark(_) => "spark.transport.native.invalid_water_mark",
            ChannelError::Eof => "spark.transport.native.eof",
            ChannelError::NoCurrentPath => "spark.transport.native.no_current_path",
            ChannelError::UnsupportedEndpoint { .. } => {
                "spark.transport.native.unsupported_endpoint"
            }
            ChannelError::Transport(_) => "spark.transport.native.transport_failed",
            ChannelError::UnexpectedCancellation => {
                "spark.transport.native.unexpected_cancellation"
            }
            ChannelError::DriverGone => "spark.transport.native.driver_gone",
            ChannelError::InvalidConfiguration { .. } => {
                "spark.transport.native.invalid_configuration"
            }
        }
    }

    /// 返回错误等级。
    pub fn class(&self) -> ErrorClass {
        match self {
            ChannelError::Eof | ChannelError::Transport(_) | ChannelError::UnexpectedCancellation => {
                ErrorClass::Transport
            }
            _ => ErrorClass::State,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_class_covers_escalating_errors() {
        assert_eq!(ChannelError::Eof.class(), ErrorClass::Transport);
        assert_eq!(
            ChannelError::from(NativeError::posix(54, "connection reset")).class(),
            ErrorClass::Transport
        );
        assert_eq!(ChannelError::OutputClosed.class(), ErrorClass::State);
        assert_eq!(
            ChannelError::UnsupportedSocketOption { level: 17, name: 1 }.class(),
            ErrorClass::State
        );
    }

    #[test]
    fn codes_are_namespaced_and_display_keeps_native_detail() {
        let err = ChannelError::from(NativeError::dns(-65554, "no such record"));
        assert_eq!(err.code(), "spark.transport.native.transport_failed");
        assert_eq!(
            err.to_string(),
            "native transport failure: dns error -65554: no such record"
        );
        assert!(ChannelError::ClosedChannel.code().starts_with("spark.transport.native."));
    }
}
