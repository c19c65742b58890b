//! 原生传输契约：连接对象、状态通知、收发完成回调以及派发队列绑定。
//!
//! # 教案级导览
//!
//! ## 意图（Why）
//! - 原生网络子系统以“回调 + 专属派发队列”的方式交付状态变化与数据；Pipeline 则要求
//!   在单一串行上下文中按序处理事件。本模块定义两侧交汇处的最小接口。
//! - 所有回调都被包装为 [`NativeEvent`] 投递进 [`DispatchQueue`]，由通道在自己的串行
//!   上下文中消费，因此通道内部无需任何锁。
//!
//! ## 契约（What）
//! - [`NativeConnection`]：启动、取消、发送、接收、路径与安全元数据查询，以及三类通知
//!   回调的安装与清除；
//! - [`NativeConnector`]：按端点与参数创建连接；
//! - 所有原生操作都是“发出即返回”，结果只经由回调异步到达。
//!
//! ## 风险提示（Trade-offs）
//! - 回调持有的是派发队列而非通道本身，通道销毁后迟到的回调只会投递失败，不会访问
//!   已释放的状态。

use std::{fmt, sync::Arc};

use bytes::Bytes;
use spark_transport::Endpoint;
use tokio::sync::mpsc;

use crate::{error::NativeError, options::ConnectionParameters, promise::ChannelPromise};

/// 原生连接报告的状态。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeState {
    Setup,
    Preparing,
    /// 暂时不可用（例如无网络），附带原因。
    Waiting(NativeError),
    Ready,
    Failed(NativeError),
    /// 取消已确认；只应出现在本地关闭之后。
    Cancelled,
}

/// 当前网络路径。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkPath {
    pub local_endpoint: Option<Endpoint>,
    pub remote_endpoint: Option<Endpoint>,
    /// 路径所用网络接口的名称，例如 `en0`。
    pub interface: Option<String>,
}

/// 连接就绪后可查询的安全层信息。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityMetadata {
    /// 协商得到的应用层协议（ALPN）。
    pub negotiated_protocol: Option<String>,
}

/// 一次接收请求的完成结果。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReceivedContent {
    pub content: Option<Bytes>,
    /// 对端已结束发送（EOF）。
    pub is_complete: bool,
    pub error: Option<NativeError>,
}

impl ReceivedContent {
    /// 仅携带数据的结果。
    pub fn data(content: impl Into<Bytes>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// 对端结束发送的结果。
    pub fn eof() -> Self {
        Self {
            is_complete: true,
            ..Self::default()
        }
    }

    /// 接收失败的结果。
    pub fn failed(error: NativeError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

pub type StateUpdateHandler = Arc<dyn Fn(NativeState) + Send + Sync>;
pub type BetterPathHandler = Arc<dyn Fn(bool) + Send + Sync>;
pub type PathChangedHandler = Arc<dyn Fn(NetworkPath) + Send + Sync>;
pub type SendCompletion = Box<dyn FnOnce(Option<NativeError>) + Send>;
pub type ReceiveCompletion = Box<dyn FnOnce(ReceivedContent) + Send>;

/// 原生连接对象。
///
/// # 契约（What）
/// - `set_*_handler`：安装通知回调，传入 `None` 即清除；
/// - `start`：在给定派发队列上启动连接，之后状态经由状态回调到达；
/// - `cancel`：幂等；取消确认以 [`NativeState::Cancelled`] 异步到达；
/// - `send`：`content = None` 且 `is_final = true` 表示写方向的终结标记；
/// - `batch`：把闭包内的多次发送合并为一次网络层提交，默认直接执行闭包；
/// - `receive`：请求至少 `min`、至多 `max` 字节；
/// - **前置条件**：所有方法只在通道的串行上下文中调用。
pub trait NativeConnection: Send + 'static {
    fn set_state_update_handler(&mut self, handler: Option<StateUpdateHandler>);

    fn set_better_path_handler(&mut self, handler: Option<BetterPathHandler>);

    fn set_path_changed_handler(&mut self, handler: Option<PathChangedHandler>);

    fn start(&mut self, queue: DispatchQueue);

    fn cancel(&mut self);

    fn send(&mut self, content: Option<Bytes>, is_final: bool, completion: SendCompletion);

    fn batch<F>(&mut self, submit: F)
    where
        F: FnOnce(&mut Self),
        Self: Sized,
    {
        submit(self)
    }

    fn receive(&mut self, min: usize, max: usize, completion: ReceiveCompletion);

    fn current_path(&self) -> Option<NetworkPath>;

    fn security_metadata(&self) -> Option<SecurityMetadata>;

    /// 一次性清除全部通知回调，释放句柄前调用。
    fn clear_handlers(&mut self) {
        self.set_state_update_handler(None);
        self.set_better_path_handler(None);
        self.set_path_changed_handler(None);
    }
}

/// 原生连接工厂。
pub trait NativeConnector: Send + 'static {
    type Connection: NativeConnection;

    /// 创建尚未启动的连接。
    fn connect(
        &mut self,
        endpoint: &Endpoint,
        parameters: ConnectionParameters,
    ) -> Result<Self::Connection, NativeError>;
}

/// 原生回调投递到通道串行上下文的事件。
#[derive(Debug)]
pub enum NativeEvent {
    StateUpdate(NativeState),
    BetterPath(bool),
    PathChanged(NetworkPath),
    SendCompleted {
        bytes: usize,
        promise: Option<ChannelPromise>,
        error: Option<NativeError>,
    },
    FinalMessageSent {
        promise: Option<ChannelPromise>,
        error: Option<NativeError>,
    },
    Received(ReceivedContent),
}

/// 原生派发队列与通道串行上下文的绑定。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 原生层在自己的线程上调用回调；回调只做一件事：把事件投递到通道的串行上下文。
///   这样 Pipeline 侧看到的所有效果都发生在同一执行上下文内，天然有序。
///
/// ## 逻辑 (How)
/// - 内部保存一个投递函数；[`DispatchQueue::channel`] 以无界 mpsc 实现，供无运行时
///   的测试逐个泵送；驱动层以 [`DispatchQueue::from_fn`] 把事件并入自己的命令队列。
///
/// ## 契约 (What)
/// - `post` 永不阻塞；接收端已关闭时事件被丢弃。
#[derive(Clone)]
pub struct DispatchQueue {
    label: Arc<str>,
    post: Arc<dyn Fn(NativeEvent) + Send + Sync>,
}

impl DispatchQueue {
    /// 以任意投递函数构造派发队列。
    pub fn from_fn<F>(label: impl Into<Arc<str>>, post: F) -> Self
    where
        F: Fn(NativeEvent) + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            post: Arc::new(post),
        }
    }

    /// 以无界 mpsc 构造派发队列与对应的接收端。
    pub fn channel(label: impl Into<Arc<str>>) -> (Self, DispatchReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self::from_fn(label, move |event| {
            // 接收端关闭说明通道已销毁，迟到的回调无人处理。
            let _ = sender.send(event);
        });
        (queue, DispatchReceiver { receiver })
    }

    /// 队列标签，用于日志。
    pub fn label(&self) -> &str {
        &self.label
    }

    /// 投递一个事件。
    pub fn post(&self, event: NativeEvent) {
        (self.post)(event);
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("label", &self.label)
            .finish()
    }
}

/// [`DispatchQueue::channel`] 的接收端。
#[derive(Debug)]
pub struct DispatchReceiver {
    receiver: mpsc::UnboundedReceiver<NativeEvent>,
}

impl DispatchReceiver {
    /// 非阻塞地取出下一个事件。
    pub fn try_next(&mut self) -> Option<NativeEvent> {
        self.receiver.try_recv().ok()
    }

    /// 异步等待下一个事件。
    pub async fn next(&mut self) -> Option<NativeEvent> {
        self.receiver.recv().await
    }
}
