use std::{
    mem,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use bytes::{BufMut, Bytes};
use spark_transport::{CloseMode, Endpoint, TransportSocketAddr};
use tracing::{debug, error, trace, warn};

use crate::{
    backpressure::BackpressureManager,
    error::{ChannelError, ErrorClass},
    native::{
        BetterPathHandler, DispatchQueue, DispatchReceiver, NativeConnection, NativeConnector,
        NativeEvent, NativeState, NetworkPath, PathChangedHandler, ReceivedContent,
        StateUpdateHandler,
    },
    options::{ChannelOption, ChannelOptionKey, ChannelOptions},
    pending::PendingWriteQueue,
    pipeline::{ChannelPipeline, InboundEvent, OutboundEvent},
    promise::{ChannelPromise, OptionalPromise},
    substate::{ActiveSubstate, HalfCloseOutcome},
};

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// 通道的粗粒度生命周期，连接句柄与建连承诺只存在于需要它们的变体中。
///
/// - `Idle`：尚未激活，无句柄；
/// - `Activating`：句柄已创建并启动，等待原生层报告就绪；
/// - `Active`：可读写，内嵌半关闭子状态；
/// - `Closing`：已本地取消，等待原生层确认取消后释放句柄；
/// - `Closed`：终态，无句柄。
#[derive(Debug)]
enum Lifecycle<C> {
    Idle,
    Activating {
        connection: C,
        connect_promise: Option<ChannelPromise>,
    },
    Active {
        connection: C,
        substate: ActiveSubstate,
    },
    Closing {
        connection: C,
    },
    Closed,
}

impl<C> Lifecycle<C> {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Activating { .. } => "activating",
            Lifecycle::Active { .. } => "active",
            Lifecycle::Closing { .. } => "closing",
            Lifecycle::Closed => "closed",
        }
    }

    fn connection(&self) -> Option<&C> {
        match self {
            Lifecycle::Activating { connection, .. }
            | Lifecycle::Active { connection, .. }
            | Lifecycle::Closing { connection } => Some(connection),
            Lifecycle::Idle | Lifecycle::Closed => None,
        }
    }
}

/// 通道状态快照。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    pub active: bool,
    pub writable: bool,
    pub input_closed: bool,
    pub output_closed: bool,
    pub closed: bool,
    pub outstanding_read: bool,
    pub pending_writes: usize,
    /// 已入队但尚未被原生层确认发送的字节数。
    pub buffered_bytes: usize,
}

/// 将原生连接桥接为 Pipeline 通道的状态机。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 原生连接以回调交付状态与数据，Pipeline 要求有序的事件流与基于承诺的完成通知；
///   本类型在两者之间维护唯一的真相：生命周期、待发写入、背压与在途读请求。
/// - 它本身不持有任何执行器：出站操作由调用方在串行上下文中直接调用，原生回调经由
///   [`DispatchQueue`] 回到同一上下文后交给 [`NativeChannel::handle_native_event`]。
///   [`ChannelDriver`](crate::ChannelDriver) 是基于 Tokio 的现成串行上下文。
///
/// ## 逻辑 (How)
/// - `connect`：由配置派生连接参数，安装三类通知回调，进入 `Activating` 并启动连接；
/// - 原生 `Ready`：完成建连承诺、进入 `Active`、触发 `channel_active`，若安全层完成则
///   触发握手完成事件；开启自动读时立即发出首个读请求；
/// - `write`/`flush`：入队并记账背压；冲刷时在一次批量提交中按序发送全部写入，
///   每个写入的完成各自回到串行上下文结算；
/// - `read`：同一时刻至多一个在途接收请求；完成后投递数据、处理错误与 EOF，
///   未进入终结路径且开启自动读时续发下一次读；
/// - 关闭：取消原生句柄、失败全部待发写入与未完成的建连承诺，原生取消确认到达后
///   清除回调并释放句柄。
///
/// ## 契约 (What)
/// - **前置条件**：所有方法在同一串行上下文中调用，`ChannelPipeline` 实现不得重入；
/// - **后置条件**：每个承诺恰好完成一次；关闭后迟到的接收完成被静默丢弃；
/// - 在 `Activating`/`Active` 状态再次发起激活属于编程错误，直接 panic。
///
/// ## 注意事项 (Trade-offs)
/// - 同一时刻只允许一个在途读，这是入站方向唯一的背压手段；
/// - 出站背压仅为建议，忽略可写性的调用方仍可无限入队。
pub struct NativeChannel<N: NativeConnector, P: ChannelPipeline> {
    id: String,
    connector: N,
    pipeline: P,
    options: ChannelOptions,
    state: Lifecycle<N::Connection>,
    pending: PendingWriteQueue,
    backpressure: BackpressureManager,
    outstanding_read: bool,
    queue: DispatchQueue,
}

impl<N: NativeConnector, P: ChannelPipeline> NativeChannel<N, P> {
    /// 创建通道，并返回与之绑定的派发队列接收端。
    ///
    /// 调用方负责把接收端中的事件逐个交给 [`NativeChannel::handle_native_event`]，
    /// 或直接使用 [`NativeChannel::run_pending`]。
    pub fn new(connector: N, pipeline: P, options: ChannelOptions) -> (Self, DispatchReceiver) {
        let id = next_channel_id();
        let (queue, receiver) = DispatchQueue::channel(id.clone());
        (Self::with_queue(id, connector, pipeline, options, queue), receiver)
    }

    /// 以外部提供的派发队列创建通道。
    pub fn with_queue(
        id: impl Into<String>,
        connector: N,
        pipeline: P,
        options: ChannelOptions,
        queue: DispatchQueue,
    ) -> Self {
        let id = id.into();
        let mut options = options;
        if options.max_receive_length == 0 {
            warn!(channel.id = %id, "max_receive_length of 0 raised to 1 byte");
            options.max_receive_length = 1;
        }
        let backpressure = BackpressureManager::new(options.write_buffer_water_mark);
        Self {
            id,
            connector,
            pipeline,
            options,
            state: Lifecycle::Idle,
            pending: PendingWriteQueue::new(),
            backpressure,
            outstanding_read: false,
            queue,
        }
    }

    /// 通道标识，用于日志字段。
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut P {
        &mut self.pipeline
    }

    /// 拆出 Pipeline，通道随之销毁。
    pub fn into_pipeline(self) -> P {
        self.pipeline
    }

    pub fn options(&self) -> &ChannelOptions {
        &self.options
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, Lifecycle::Active { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, Lifecycle::Closing { .. } | Lifecycle::Closed)
    }

    pub fn is_writable(&self) -> bool {
        self.backpressure.is_writable()
    }

    pub fn is_input_closed(&self) -> bool {
        matches!(&self.state, Lifecycle::Active { substate, .. } if substate.is_input_closed())
    }

    pub fn is_output_closed(&self) -> bool {
        matches!(&self.state, Lifecycle::Active { substate, .. } if substate.is_output_closed())
    }

    /// 当前状态快照。
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            active: self.is_active(),
            writable: self.is_writable(),
            input_closed: self.is_input_closed(),
            output_closed: self.is_output_closed(),
            closed: self.is_closed(),
            outstanding_read: self.outstanding_read,
            pending_writes: self.pending.len(),
            buffered_bytes: self.backpressure.outstanding_bytes(),
        }
    }

    /// 泵送接收端中已到达的全部原生事件，返回处理的事件数。
    pub fn run_pending(&mut self, receiver: &mut DispatchReceiver) -> usize {
        let mut handled = 0;
        while let Some(event) = receiver.try_next() {
            self.handle_native_event(event);
            handled += 1;
        }
        handled
    }

    /// 发起激活：创建原生连接、安装通知回调并启动。
    pub fn connect(&mut self, endpoint: Endpoint, promise: Option<ChannelPromise>) {
        match &self.state {
            Lifecycle::Idle => {}
            Lifecycle::Activating { .. } | Lifecycle::Active { .. } => {
                panic!(
                    "channel {} activated twice while state is `{}`",
                    self.id,
                    self.state.name()
                );
            }
            Lifecycle::Closing { .. } | Lifecycle::Closed => {
                promise.fail(ChannelError::InappropriateState {
                    state: self.state.name(),
                });
                return;
            }
        }

        let parameters = self.options.connection_parameters();
        let mut connection = match self.connector.connect(&endpoint, parameters) {
            Ok(connection) => connection,
            Err(err) => {
                warn!(channel.id = %self.id, %endpoint, error = %err, "native connection could not be created");
                promise.fail(ChannelError::from(err));
                return;
            }
        };

        let queue = self.queue.clone();
        let on_state: StateUpdateHandler =
            Arc::new(move |state| queue.post(NativeEvent::StateUpdate(state)));
        let queue = self.queue.clone();
        let on_better_path: BetterPathHandler =
            Arc::new(move |available| queue.post(NativeEvent::BetterPath(available)));
        let queue = self.queue.clone();
        let on_path_changed: PathChangedHandler =
            Arc::new(move |path| queue.post(NativeEvent::PathChanged(path)));
        connection.set_state_update_handler(Some(on_state));
        connection.set_better_path_handler(Some(on_better_path));
        connection.set_path_changed_handler(Some(on_path_changed));

        debug!(
            channel.id = %self.id,
            %endpoint,
            reuse = parameters.allow_local_endpoint_reuse,
            peer_to_peer = parameters.include_peer_to_peer,
            "activating native connection"
        );
        self.state = Lifecycle::Activating {
            connection,
            connect_promise: promise,
        };
        if let Lifecycle::Activating { connection, .. } = &mut self.state {
            connection.start(self.queue.clone());
        }
    }

    /// 入队一次写入；通道未激活时立即失败。
    pub fn write(&mut self, data: Bytes, promise: Option<ChannelPromise>) {
        if !self.is_active() {
            promise.fail(ChannelError::ClosedChannel);
            return;
        }
        let len = data.len();
        self.pending.push(data, promise);
        trace!(channel.id = %self.id, bytes = len, queued = self.pending.len(), "write queued");
        if self.backpressure.writability_changes_when_queueing(len) {
            self.pipeline.fire_writability_changed(false);
        }
    }

    /// 把全部待发写入以一次批量提交交给原生层。
    pub fn flush(&mut self) {
        let Lifecycle::Active {
            connection,
            substate,
        } = &mut self.state
        else {
            return;
        };
        if self.pending.is_empty() {
            return;
        }
        if substate.is_output_closed() {
            let (count, bytes) = self.pending.fail_all(&ChannelError::OutputClosed);
            debug!(channel.id = %self.id, count, "dropping writes queued after output half-close");
            if self.backpressure.writability_changes_when_sent(bytes) {
                self.pipeline.fire_writability_changed(true);
            }
            return;
        }

        trace!(
            channel.id = %self.id,
            count = self.pending.len(),
            bytes = self.pending.queued_bytes(),
            "flushing writes"
        );
        let queue = &self.queue;
        let pending = &mut self.pending;
        connection.batch(|connection| {
            for write in pending.drain() {
                let bytes = write.payload.len();
                let promise = write.promise;
                let queue = queue.clone();
                connection.send(
                    Some(write.payload),
                    false,
                    Box::new(move |error| {
                        queue.post(NativeEvent::SendCompleted {
                            bytes,
                            promise,
                            error,
                        })
                    }),
                );
            }
        });
    }

    /// 发出一次接收请求；读方向已关闭或已有在途读时为空操作。
    pub fn read(&mut self) {
        let Lifecycle::Active {
            connection,
            substate,
        } = &mut self.state
        else {
            return;
        };
        if substate.is_input_closed() || self.outstanding_read {
            return;
        }
        self.outstanding_read = true;
        let queue = self.queue.clone();
        connection.receive(
            1,
            self.options.max_receive_length,
            Box::new(move |content| queue.post(NativeEvent::Received(content))),
        );
    }

    /// 本地关闭。
    pub fn close(&mut self, mode: CloseMode, promise: Option<ChannelPromise>) {
        match mode {
            CloseMode::All => self.close_all(ChannelError::ClosedChannel, promise),
            CloseMode::Output => self.close_output(promise),
            CloseMode::Input => promise.fail(ChannelError::OperationUnsupported),
        }
    }

    /// 处理 Pipeline 递交的用户出站事件。
    pub fn trigger_user_outbound_event(
        &mut self,
        event: OutboundEvent,
        promise: Option<ChannelPromise>,
    ) {
        match event {
            OutboundEvent::ConnectTo(endpoint) => self.connect(endpoint, promise),
            other => {
                debug!(channel.id = %self.id, event = ?other, "unsupported outbound event");
                promise.fail(ChannelError::OperationUnsupported);
            }
        }
    }

    /// Pipeline 入站方向推入的数据：原生通道的读只来自原生层，此处直接丢弃。
    pub fn channel_read_inbound(&mut self, data: Bytes) {
        trace!(channel.id = %self.id, bytes = data.len(), "discarding inbound data pushed by the pipeline");
    }

    /// 修改通道选项。
    pub fn set_option(&mut self, option: ChannelOption) -> Result<(), ChannelError> {
        let activation_started = !matches!(self.state, Lifecycle::Idle);
        self.options.apply(option, activation_started)?;
        match option {
            ChannelOption::AutoRead(true) => self.read(),
            ChannelOption::WriteBufferWaterMark(marks) => {
                if self.backpressure.water_marks_changed(marks) && self.is_active() {
                    self.pipeline
                        .fire_writability_changed(self.backpressure.is_writable());
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// 读取通道选项。
    pub fn get_option(&self, key: ChannelOptionKey) -> Result<ChannelOption, ChannelError> {
        self.options.get(key)
    }

    /// 当前路径的本端地址。
    pub fn local_addr(&self) -> Result<TransportSocketAddr, ChannelError> {
        self.path_endpoint(|path| path.local_endpoint)
    }

    /// 当前路径的对端地址。
    pub fn remote_addr(&self) -> Result<TransportSocketAddr, ChannelError> {
        self.path_endpoint(|path| path.remote_endpoint)
    }

    fn path_endpoint(
        &self,
        select: impl FnOnce(NetworkPath) -> Option<Endpoint>,
    ) -> Result<TransportSocketAddr, ChannelError> {
        let endpoint = self
            .state
            .connection()
            .and_then(|connection| connection.current_path())
            .and_then(select)
            .ok_or(ChannelError::NoCurrentPath)?;
        endpoint
            .socket_addr()
            .ok_or_else(|| ChannelError::UnsupportedEndpoint {
                endpoint: endpoint.to_string(),
            })
    }

    /// 在串行上下文中处理一个原生事件。
    pub fn handle_native_event(&mut self, event: NativeEvent) {
        match event {
            NativeEvent::StateUpdate(state) => self.on_state_update(state),
            NativeEvent::BetterPath(available) => {
                if self.is_closed() {
                    return;
                }
                self.pipeline
                    .fire_user_inbound_event(InboundEvent::BetterPath { available });
            }
            NativeEvent::PathChanged(path) => {
                if self.is_closed() {
                    return;
                }
                self.pipeline
                    .fire_user_inbound_event(InboundEvent::PathChanged(path));
            }
            NativeEvent::SendCompleted {
                bytes,
                promise,
                error,
            } => {
                promise.complete(error.map_or(Ok(()), |err| Err(ChannelError::from(err))));
                if self.backpressure.writability_changes_when_sent(bytes) && self.is_active() {
                    self.pipeline.fire_writability_changed(true);
                }
            }
            NativeEvent::FinalMessageSent { promise, error } => {
                promise.complete(error.map_or(Ok(()), |err| Err(ChannelError::from(err))));
            }
            NativeEvent::Received(content) => self.on_received(content),
        }
    }

    fn on_state_update(&mut self, state: NativeState) {
        trace!(channel.id = %self.id, lifecycle = self.state.name(), native = ?state, "native state update");
        match state {
            NativeState::Setup | NativeState::Preparing => {}
            NativeState::Ready => self.on_ready(),
            NativeState::Waiting(err) => {
                if self.is_closed() {
                    return;
                }
                if self.options.wait_for_activity {
                    debug!(channel.id = %self.id, error = %err, "native connection waiting for connectivity");
                    return;
                }
                self.fail(ChannelError::from(err));
            }
            NativeState::Failed(err) => {
                if self.is_closed() {
                    return;
                }
                self.fail(ChannelError::from(err));
            }
            NativeState::Cancelled => self.on_cancelled(),
        }
    }

    fn on_ready(&mut self) {
        let Lifecycle::Activating { .. } = self.state else {
            trace!(channel.id = %self.id, lifecycle = self.state.name(), "ignoring ready outside activation");
            return;
        };
        let Lifecycle::Activating {
            connection,
            connect_promise,
        } = mem::replace(&mut self.state, Lifecycle::Closed)
        else {
            return;
        };
        let security = connection.security_metadata();
        self.state = Lifecycle::Active {
            connection,
            substate: ActiveSubstate::Open,
        };
        debug!(channel.id = %self.id, "native connection ready");
        connect_promise.succeed();
        self.pipeline.fire_channel_active();
        if let Some(metadata) = security {
            self.pipeline
                .fire_user_inbound_event(InboundEvent::SecureHandshakeCompleted {
                    negotiated_protocol: metadata.negotiated_protocol,
                });
        }
        if self.options.auto_read {
            self.read();
        }
    }

    fn on_cancelled(&mut self) {
        match mem::replace(&mut self.state, Lifecycle::Closed) {
            Lifecycle::Closing { mut connection } => {
                connection.clear_handlers();
                drop(connection);
                debug!(channel.id = %self.id, "native cancellation confirmed, handle released");
            }
            Lifecycle::Closed => {}
            Lifecycle::Idle => self.state = Lifecycle::Idle,
            unexpected @ (Lifecycle::Activating { .. } | Lifecycle::Active { .. }) => {
                error!(
                    channel.id = %self.id,
                    lifecycle = unexpected.name(),
                    "native connection cancelled without a local close"
                );
                self.state = unexpected;
                self.fail(ChannelError::UnexpectedCancellation);
                if let Lifecycle::Closing { mut connection } =
                    mem::replace(&mut self.state, Lifecycle::Closed)
                {
                    connection.clear_handlers();
                }
            }
        }
    }

    fn on_received(&mut self, content: ReceivedContent) {
        self.outstanding_read = false;
        if !self.is_active() {
            trace!(channel.id = %self.id, "discarding receive completion after close");
            return;
        }

        if let Some(data) = content.content.filter(|data| !data.is_empty()) {
            let mut buffer = self.pipeline.allocate(data.len());
            buffer.put_slice(&data);
            self.pipeline.fire_channel_read(buffer.freeze());
            self.pipeline.fire_channel_read_complete();
        }

        if let Some(err) = content.error {
            // 读错误先于 `channel_inactive` 递交。
            let error = ChannelError::from(err);
            self.pipeline.fire_error_caught(error.clone());
            self.escalate(error);
            return;
        }
        if content.is_complete {
            self.on_read_eof();
            return;
        }

        if self.options.auto_read {
            self.read();
        }
    }

    fn on_read_eof(&mut self) {
        if !self.options.allow_remote_half_closure {
            self.fail(ChannelError::Eof);
            return;
        }
        let Lifecycle::Active { substate, .. } = &mut self.state else {
            return;
        };
        match substate.close_input() {
            Ok(outcome) => {
                debug!(channel.id = %self.id, "input closed by peer");
                self.pipeline
                    .fire_user_inbound_event(InboundEvent::InputClosed);
                if outcome == HalfCloseOutcome::BothClosed {
                    self.close_all(ChannelError::ClosedChannel, None);
                }
            }
            Err(err) => self.fail(err),
        }
    }

    fn close_output(&mut self, promise: Option<ChannelPromise>) {
        let Lifecycle::Active {
            connection,
            substate,
        } = &mut self.state
        else {
            let error = match self.state {
                Lifecycle::Activating { .. } => ChannelError::InappropriateState {
                    state: self.state.name(),
                },
                _ => ChannelError::ClosedChannel,
            };
            promise.fail(error);
            return;
        };

        let outcome = match substate.close_output() {
            Ok(outcome) => outcome,
            Err(err) if err.class() == ErrorClass::Transport => {
                promise.fail(err.clone());
                self.fail(err);
                return;
            }
            Err(err) => {
                promise.fail(err);
                return;
            }
        };

        let queue = self.queue.clone();
        connection.send(
            None,
            true,
            Box::new(move |error| queue.post(NativeEvent::FinalMessageSent { promise, error })),
        );
        debug!(channel.id = %self.id, "output half-closed");
        let (_, bytes) = self.pending.fail_all(&ChannelError::OutputClosed);
        if self.backpressure.writability_changes_when_sent(bytes) {
            self.pipeline.fire_writability_changed(true);
        }
        if outcome == HalfCloseOutcome::BothClosed {
            self.close_all(ChannelError::ClosedChannel, None);
        }
    }

    /// 按错误等级处理：传输错误先完整关闭再报告给 Pipeline，状态错误只报告。
    fn fail(&mut self, error: ChannelError) {
        match error.class() {
            ErrorClass::Transport => {
                self.escalate(error.clone());
                self.pipeline.fire_error_caught(error);
            }
            ErrorClass::State => {
                debug!(channel.id = %self.id, code = error.code(), %error, "state error reported, connection kept");
                self.pipeline.fire_error_caught(error);
            }
        }
    }

    fn escalate(&mut self, error: ChannelError) {
        warn!(channel.id = %self.id, code = error.code(), %error, "closing channel after error");
        self.close_all(error, None);
    }

    /// 完整关闭：取消句柄、失败待发写入与建连承诺。
    fn close_all(&mut self, error: ChannelError, promise: Option<ChannelPromise>) {
        let was_active = match mem::replace(&mut self.state, Lifecycle::Closed) {
            Lifecycle::Idle => false,
            Lifecycle::Activating {
                mut connection,
                connect_promise,
            } => {
                connection.cancel();
                self.state = Lifecycle::Closing { connection };
                connect_promise.fail(error.clone());
                false
            }
            Lifecycle::Active { mut connection, .. } => {
                connection.cancel();
                self.state = Lifecycle::Closing { connection };
                true
            }
            closed @ (Lifecycle::Closing { .. } | Lifecycle::Closed) => {
                self.state = closed;
                promise.fail(ChannelError::AlreadyClosed);
                return;
            }
        };
        debug!(channel.id = %self.id, was_active, reason = %error, "channel closed");

        let (_, bytes) = self.pending.fail_all(&error);
        self.backpressure.writability_changes_when_sent(bytes);
        if was_active {
            self.pipeline.fire_channel_inactive();
        }
        promise.succeed();
    }
}

pub(crate) fn next_channel_id() -> String {
    format!("native-{}", NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
}
