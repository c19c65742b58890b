#![deny(unsafe_code)]
#![doc = r#"
# spark-transport-native

## 设计动机（Why）
- **定位**：把平台原生网络栈提供的“回调驱动连接”适配为 Spark Pipeline 通道，
  让上层 Handler 以统一的读写、关闭与事件语义使用原生传输（含其内建的 TLS 与路径管理）。
- **架构角色**：与 `spark-transport-tcp` 并列的传输实现层；共享 `spark-transport`
  中的端点、关闭方向与水位线类型。
- **设计理念**：状态机本身不做 IO、不持有运行时，所有原生回调先投递回通道的串行
  上下文再处理，因此内部无锁，行为可以在测试中逐事件复现。

## 核心契约（What）
- **生命周期**：`Idle → Activating → Active → Closing → Closed`，`Active` 内嵌读/写
  半关闭子状态；原生取消确认到达后才释放连接句柄；
- **写路径**：写入先入队，冲刷时在一次批量提交中按序发送；每个写入的承诺在其发送
  完成后结算；排队字节越过高水位时不可写，回落到低水位以下时恢复，每次翻转只通知一次；
- **读路径**：同一时刻至多一个在途接收；EOF 在允许远端半关闭时表现为
  [`InboundEvent::InputClosed`]，否则作为错误关闭通道；
- **错误**：所有失败以 [`ChannelError`] 表达，附稳定错误码 `spark.transport.native.*`。

## 实现策略（How）
- [`NativeChannel`]：纯状态机，调用方负责在串行上下文中调用出站操作并泵送
  [`DispatchReceiver`]；
- [`ChannelDriver`] / [`ChannelHandle`]（`runtime-tokio` 特性）：以一个 Tokio 任务充当
  串行上下文，把出站命令与原生事件合并到同一队列；
- [`ChannelOptions`]：可由 TOML 加载的配置，运行期经由 [`ChannelOption`] 读写。

## 风险与考量（Trade-offs）
- **出站背压为建议性**：忽略可写性的调用方仍可无限入队；
- **无重连策略**：`wait_for_activity` 只决定“等待”状态是否视为失败，不做退避重试。
"#]

mod backpressure;
mod channel;
#[cfg(feature = "runtime-tokio")]
mod driver;
mod error;
mod native;
mod options;
mod pending;
mod pipeline;
mod promise;
mod substate;
pub mod test_stubs;

pub use channel::{ChannelStatus, NativeChannel};
#[cfg(feature = "runtime-tokio")]
pub use driver::{ChannelDriver, ChannelHandle};
pub use error::{ChannelError, ErrorClass, NativeError, NativeErrorDomain};
pub use native::{
    BetterPathHandler, DispatchQueue, DispatchReceiver, NativeConnection, NativeConnector,
    NativeEvent, NativeState, NetworkPath, PathChangedHandler, ReceiveCompletion,
    ReceivedContent, SecurityMetadata, SendCompletion, StateUpdateHandler,
};
pub use options::{
    ChannelOption, ChannelOptionKey, ChannelOptions, ConnectionParameters,
    DEFAULT_MAX_RECEIVE_LENGTH, SocketOption, SocketOptionLevel,
};
pub use pipeline::{ChannelPipeline, InboundEvent, OutboundEvent};
pub use promise::{ChannelPromise, ChannelResult, PromiseFuture};
pub use spark_transport::{CloseMode, Endpoint, TransportSocketAddr, WriteBufferWaterMark};
