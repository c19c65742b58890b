//! Tokio 驱动层：以单个任务充当通道的串行上下文。
//!
//! # 教案级导览
//!
//! ## 意图（Why）
//! - [`NativeChannel`] 要求“出站命令”与“原生回调”在同一串行上下文中执行；
//!   驱动把两者合并进同一条无界队列，由一个任务逐条处理，调用方只需持有
//!   可克隆的 [`ChannelHandle`]。
//!
//! ## 逻辑（How）
//! - 命令携带 [`ChannelPromise`] 或 `oneshot` 回复端，任务执行完毕后经由它们回报结果；
//! - 原生回调通过 [`DispatchQueue::from_fn`] 持有队列的弱发送端，因此全部句柄被释放后
//!   队列自然关闭，任务对尚未关闭的通道执行一次完整关闭后退出，并交还 Pipeline。
//!
//! ## 契约（What）
//! - 同一句柄上提交的命令按提交顺序执行；
//! - 任务退出后，所有查询返回 [`ChannelError::DriverGone`]，所有承诺以同一错误失败。

use bytes::Bytes;
use spark_transport::{CloseMode, Endpoint, TransportSocketAddr};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::{
    channel::{ChannelStatus, NativeChannel, next_channel_id},
    error::ChannelError,
    native::{DispatchQueue, NativeConnector, NativeEvent},
    options::{ChannelOption, ChannelOptionKey, ChannelOptions},
    pipeline::{ChannelPipeline, OutboundEvent},
    promise::{ChannelPromise, ChannelResult, PromiseFuture},
};

type Reply<T> = oneshot::Sender<Result<T, ChannelError>>;

#[derive(Debug)]
enum Command {
    Connect {
        endpoint: Endpoint,
        promise: ChannelPromise,
    },
    Write {
        data: Bytes,
        promise: ChannelPromise,
    },
    Flush,
    Read,
    Close {
        mode: CloseMode,
        promise: ChannelPromise,
    },
    TriggerEvent {
        event: OutboundEvent,
        promise: ChannelPromise,
    },
    SetOption {
        option: ChannelOption,
        reply: Reply<()>,
    },
    GetOption {
        key: ChannelOptionKey,
        reply: Reply<ChannelOption>,
    },
    LocalAddr {
        reply: Reply<TransportSocketAddr>,
    },
    RemoteAddr {
        reply: Reply<TransportSocketAddr>,
    },
    Status {
        reply: oneshot::Sender<ChannelStatus>,
    },
}

#[derive(Debug)]
enum DriverMessage {
    Command(Command),
    Native(NativeEvent),
}

/// 驱动任务本体。
pub struct ChannelDriver<N: NativeConnector, P: ChannelPipeline> {
    channel: NativeChannel<N, P>,
    receiver: mpsc::UnboundedReceiver<DriverMessage>,
}

impl<N: NativeConnector, P: ChannelPipeline> ChannelDriver<N, P> {
    /// 构造驱动与句柄，但不启动任务。
    pub fn new(connector: N, pipeline: P, options: ChannelOptions) -> (Self, ChannelHandle) {
        let id = next_channel_id();
        let (sender, receiver) = mpsc::unbounded_channel();
        let weak = sender.downgrade();
        let queue = DispatchQueue::from_fn(id.clone(), move |event| {
            if let Some(sender) = weak.upgrade() {
                let _ = sender.send(DriverMessage::Native(event));
            }
        });
        let channel = NativeChannel::with_queue(id.clone(), connector, pipeline, options, queue);
        (
            Self { channel, receiver },
            ChannelHandle {
                id: id.into(),
                sender,
            },
        )
    }

    /// 在当前 Tokio 运行时上启动驱动任务。
    pub fn spawn(connector: N, pipeline: P, options: ChannelOptions) -> ChannelHandle {
        let (driver, handle) = Self::new(connector, pipeline, options);
        tokio::spawn(driver.run());
        handle
    }

    /// 处理消息直到全部句柄被释放，返回 Pipeline。
    pub async fn run(mut self) -> P {
        while let Some(message) = self.receiver.recv().await {
            match message {
                DriverMessage::Command(command) => self.execute(command),
                DriverMessage::Native(event) => self.channel.handle_native_event(event),
            }
        }
        if !self.channel.is_closed() {
            self.channel.close(CloseMode::All, None);
        }
        debug!(channel.id = %self.channel.id(), "channel driver stopped");
        self.channel.into_pipeline()
    }

    fn execute(&mut self, command: Command) {
        let channel = &mut self.channel;
        match command {
            Command::Connect { endpoint, promise } => channel.connect(endpoint, Some(promise)),
            Command::Write { data, promise } => channel.write(data, Some(promise)),
            Command::Flush => channel.flush(),
            Command::Read => channel.read(),
            Command::Close { mode, promise } => channel.close(mode, Some(promise)),
            Command::TriggerEvent { event, promise } => {
                channel.trigger_user_outbound_event(event, Some(promise))
            }
            Command::SetOption { option, reply } => {
                let _ = reply.send(channel.set_option(option));
            }
            Command::GetOption { key, reply } => {
                let _ = reply.send(channel.get_option(key));
            }
            Command::LocalAddr { reply } => {
                let _ = reply.send(channel.local_addr());
            }
            Command::RemoteAddr { reply } => {
                let _ = reply.send(channel.remote_addr());
            }
            Command::Status { reply } => {
                let _ = reply.send(channel.status());
            }
        }
    }
}

/// 驱动任务的可克隆句柄。
///
/// 返回 [`PromiseFuture`] 的方法立即提交命令，结果在等待 future 时取得；
/// 不等待也不会影响命令本身的执行。
#[derive(Clone, Debug)]
pub struct ChannelHandle {
    id: std::sync::Arc<str>,
    sender: mpsc::UnboundedSender<DriverMessage>,
}

impl ChannelHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 驱动任务是否仍在运行。
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn connect(&self, endpoint: Endpoint) -> PromiseFuture {
        self.submit(|promise| Command::Connect { endpoint, promise })
    }

    pub fn write(&self, data: impl Into<Bytes>) -> PromiseFuture {
        let data = data.into();
        self.submit(|promise| Command::Write { data, promise })
    }

    pub fn flush(&self) {
        self.send(Command::Flush);
    }

    /// 写入并立即冲刷，等待该写入完成。
    pub async fn write_and_flush(&self, data: impl Into<Bytes>) -> ChannelResult {
        let written = self.write(data);
        self.flush();
        written.await
    }

    pub fn read(&self) {
        self.send(Command::Read);
    }

    pub fn close(&self, mode: CloseMode) -> PromiseFuture {
        self.submit(|promise| Command::Close { mode, promise })
    }

    pub fn trigger_event(&self, event: OutboundEvent) -> PromiseFuture {
        self.submit(|promise| Command::TriggerEvent { event, promise })
    }

    pub async fn set_option(&self, option: ChannelOption) -> Result<(), ChannelError> {
        self.query(|reply| Command::SetOption { option, reply })
            .await?
    }

    pub async fn get_option(&self, key: ChannelOptionKey) -> Result<ChannelOption, ChannelError> {
        self.query(|reply| Command::GetOption { key, reply }).await?
    }

    pub async fn local_addr(&self) -> Result<TransportSocketAddr, ChannelError> {
        self.query(|reply| Command::LocalAddr { reply }).await?
    }

    pub async fn remote_addr(&self) -> Result<TransportSocketAddr, ChannelError> {
        self.query(|reply| Command::RemoteAddr { reply }).await?
    }

    pub async fn status(&self) -> Result<ChannelStatus, ChannelError> {
        self.query(|reply| Command::Status { reply }).await
    }

    fn submit(&self, command: impl FnOnce(ChannelPromise) -> Command) -> PromiseFuture {
        let (promise, future) = ChannelPromise::new();
        // 任务已退出时命令连同承诺一起被丢弃，future 以 DriverGone 结束。
        self.send(command(promise));
        future
    }

    async fn query<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ChannelError> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply));
        response.await.map_err(|_| ChannelError::DriverGone)
    }

    fn send(&self, command: Command) {
        if self.sender.send(DriverMessage::Command(command)).is_err() {
            debug!(channel.id = %self.id, "channel driver already stopped");
        }
    }
}
