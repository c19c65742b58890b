//! Pipeline 契约：通道向 Pipeline 触发的入站事件，以及 Pipeline 递交给通道的出站事件。

use bytes::{Bytes, BytesMut};
use spark_transport::Endpoint;

use crate::{error::ChannelError, native::NetworkPath};

/// 通道触发给 Pipeline 的用户入站事件。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum InboundEvent {
    /// 安全层握手完成，附带协商出的应用层协议。
    SecureHandshakeCompleted { negotiated_protocol: Option<String> },
    /// 对端结束发送，读方向已半关闭；写方向仍可用。
    InputClosed,
    /// 原生层报告是否存在更优网络路径。
    BetterPath { available: bool },
    /// 当前网络路径发生变化。
    PathChanged(NetworkPath),
}

/// Pipeline 递交给通道的用户出站事件。
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum OutboundEvent {
    /// 连接到指定端点，等价于发起激活。
    ConnectTo(Endpoint),
    /// 其它自定义事件，原生通道一律不支持。
    Custom(String),
}

/// 通道向 Pipeline 触发事件的接口。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 通道只依赖“触发事件”这一最小能力，而不关心 Pipeline 内部如何编排 Handler；
///   测试可注入记录型实现，宿主可把事件桥接到任意 Handler 链。
///
/// ## 契约 (What)
/// - 所有方法都在通道的串行上下文中同步调用，实现不得阻塞，也不得重入通道；
///   需要回写时应经由 [`ChannelHandle`](crate::ChannelHandle) 异步提交；
/// - `allocate` 是缓冲分配设施，读路径用它承载从原生层复制来的数据。
pub trait ChannelPipeline: Send + 'static {
    fn fire_channel_active(&mut self);

    fn fire_channel_inactive(&mut self);

    fn fire_channel_read(&mut self, data: Bytes);

    fn fire_channel_read_complete(&mut self);

    fn fire_user_inbound_event(&mut self, event: InboundEvent);

    fn fire_error_caught(&mut self, error: ChannelError);

    fn fire_writability_changed(&mut self, writable: bool);

    fn allocate(&mut self, capacity: usize) -> BytesMut {
        BytesMut::with_capacity(capacity)
    }
}
