//! 原生通道的测试桩：可脚本化的原生连接与记录型 Pipeline。
//!
//! # 设计定位（Why）
//! - 通道状态机的全部输入都来自原生回调，真实网络栈既不可控也不可重复；
//!   测试需要一个“由测试代码扮演网络层”的连接实现，以及一个把 Pipeline 事件按序记下的观察者。
//! - 集成测试与驱动层测试共用同一套桩，避免各测试文件重复实现 `NativeConnection`。
//!
//! # 使用方式（How）
//! - [`ScriptedConnector::new`] 返回连接器与 [`ConnectionScript`]；连接器交给通道，脚本留在测试中，
//!   用来上报状态、完成发送与接收、检查通道发出的请求；
//! - [`RecordingPipeline::new`] 返回 Pipeline 与 [`PipelineRecorder`]，后者读取按序记录的 [`PipelineEvent`]。
//!
//! # 契约说明（What）
//! - 脚本触发的回调与真实原生层一样只向派发队列投递事件，效果在通道泵送队列后才可见；
//! - 默认情况下 `cancel` 会立即上报 [`NativeState::Cancelled`]，可通过
//!   [`ConnectionScript::confirm_cancel_automatically`] 关闭。
//!
//! # 风险与权衡（Trade-offs）
//! - 共享状态以 `parking_lot::Mutex` 保护；回调总是在释放锁之后调用，避免与通道的同步调用形成死锁。

pub mod connection {
    //! 可脚本化的原生连接。

    use std::{collections::VecDeque, sync::Arc};

    use bytes::Bytes;
    use parking_lot::Mutex;
    use spark_transport::Endpoint;

    use crate::{
        error::NativeError,
        native::{
            BetterPathHandler, DispatchQueue, NativeConnection, NativeConnector, NativeState,
            NetworkPath, PathChangedHandler, ReceiveCompletion, ReceivedContent, SecurityMetadata,
            SendCompletion, StateUpdateHandler,
        },
        options::ConnectionParameters,
    };

    /// 连接上记录到的一次发送。
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SentMessage {
        pub content: Option<Bytes>,
        pub is_final: bool,
        /// 发送所属的批次序号，从 1 开始；批次外的发送为 0。
        pub batch: usize,
    }

    #[derive(Default)]
    struct ScriptState {
        fail_next_connect: Option<NativeError>,
        connections_created: usize,
        endpoint: Option<Endpoint>,
        parameters: Option<ConnectionParameters>,
        queue: Option<DispatchQueue>,
        manual_cancel: bool,
        cancel_count: usize,
        state_handler: Option<StateUpdateHandler>,
        better_path_handler: Option<BetterPathHandler>,
        path_changed_handler: Option<PathChangedHandler>,
        batches: usize,
        current_batch: usize,
        sent: Vec<SentMessage>,
        send_completions: VecDeque<SendCompletion>,
        receive_requests: Vec<(usize, usize)>,
        receive_completions: VecDeque<ReceiveCompletion>,
        path: Option<NetworkPath>,
        security: Option<SecurityMetadata>,
    }

    type Shared = Arc<Mutex<ScriptState>>;

    /// 为通道创建 [`ScriptedConnection`] 的连接器。
    #[derive(Clone)]
    pub struct ScriptedConnector {
        shared: Shared,
    }

    impl ScriptedConnector {
        pub fn new() -> (Self, ConnectionScript) {
            let shared = Shared::default();
            (
                Self {
                    shared: Arc::clone(&shared),
                },
                ConnectionScript { shared },
            )
        }
    }

    impl NativeConnector for ScriptedConnector {
        type Connection = ScriptedConnection;

        fn connect(
            &mut self,
            endpoint: &Endpoint,
            parameters: ConnectionParameters,
        ) -> Result<Self::Connection, NativeError> {
            let mut state = self.shared.lock();
            if let Some(error) = state.fail_next_connect.take() {
                return Err(error);
            }
            state.connections_created += 1;
            state.endpoint = Some(endpoint.clone());
            state.parameters = Some(parameters);
            Ok(ScriptedConnection {
                shared: Arc::clone(&self.shared),
            })
        }
    }

    /// 由 [`ConnectionScript`] 操控的原生连接。
    pub struct ScriptedConnection {
        shared: Shared,
    }

    impl NativeConnection for ScriptedConnection {
        fn set_state_update_handler(&mut self, handler: Option<StateUpdateHandler>) {
            self.shared.lock().state_handler = handler;
        }

        fn set_better_path_handler(&mut self, handler: Option<BetterPathHandler>) {
            self.shared.lock().better_path_handler = handler;
        }

        fn set_path_changed_handler(&mut self, handler: Option<PathChangedHandler>) {
            self.shared.lock().path_changed_handler = handler;
        }

        fn start(&mut self, queue: DispatchQueue) {
            self.shared.lock().queue = Some(queue);
        }

        fn cancel(&mut self) {
            let handler = {
                let mut state = self.shared.lock();
                state.cancel_count += 1;
                if state.manual_cancel {
                    None
                } else {
                    state.state_handler.clone()
                }
            };
            if let Some(handler) = handler {
                handler(NativeState::Cancelled);
            }
        }

        fn send(&mut self, content: Option<Bytes>, is_final: bool, completion: SendCompletion) {
            let mut state = self.shared.lock();
            let batch = state.current_batch;
            state.sent.push(SentMessage {
                content,
                is_final,
                batch,
            });
            state.send_completions.push_back(completion);
        }

        fn batch<F>(&mut self, submit: F)
        where
            F: FnOnce(&mut Self),
        {
            {
                let mut state = self.shared.lock();
                state.batches += 1;
                state.current_batch = state.batches;
            }
            submit(self);
            self.shared.lock().current_batch = 0;
        }

        fn receive(&mut self, min: usize, max: usize, completion: ReceiveCompletion) {
            let mut state = self.shared.lock();
            state.receive_requests.push((min, max));
            state.receive_completions.push_back(completion);
        }

        fn current_path(&self) -> Option<NetworkPath> {
            self.shared.lock().path.clone()
        }

        fn security_metadata(&self) -> Option<SecurityMetadata> {
            self.shared.lock().security.clone()
        }
    }

    /// 测试侧的脚本句柄：扮演原生网络层。
    #[derive(Clone)]
    pub struct ConnectionScript {
        shared: Shared,
    }

    impl ConnectionScript {
        /// 下一次建连直接失败。
        pub fn fail_next_connect(&self, error: NativeError) {
            self.shared.lock().fail_next_connect = Some(error);
        }

        /// 关闭后 `cancel` 不再自动上报取消确认，需由测试调用 `report_state`。
        pub fn confirm_cancel_automatically(&self, enabled: bool) {
            self.shared.lock().manual_cancel = !enabled;
        }

        pub fn set_path(&self, path: Option<NetworkPath>) {
            self.shared.lock().path = path;
        }

        pub fn set_security(&self, security: Option<SecurityMetadata>) {
            self.shared.lock().security = security;
        }

        /// 上报原生状态；未安装回调时返回 `false`。
        pub fn report_state(&self, state: NativeState) -> bool {
            let handler = self.shared.lock().state_handler.clone();
            handler.map(|handler| handler(state)).is_some()
        }

        pub fn report_better_path(&self, available: bool) -> bool {
            let handler = self.shared.lock().better_path_handler.clone();
            handler.map(|handler| handler(available)).is_some()
        }

        pub fn report_path_changed(&self, path: NetworkPath) -> bool {
            let handler = self.shared.lock().path_changed_handler.clone();
            handler.map(|handler| handler(path)).is_some()
        }

        /// 按发送顺序完成最早一个未完成的发送。
        pub fn complete_next_send(&self, error: Option<NativeError>) -> bool {
            let completion = self.shared.lock().send_completions.pop_front();
            completion.map(|completion| completion(error)).is_some()
        }

        /// 成功完成全部未完成的发送，返回完成的数量。
        pub fn complete_all_sends(&self) -> usize {
            let completions = std::mem::take(&mut self.shared.lock().send_completions);
            let count = completions.len();
            for completion in completions {
                completion(None);
            }
            count
        }

        /// 完成最早一个未完成的接收请求。
        pub fn complete_receive(&self, content: ReceivedContent) -> bool {
            let completion = self.shared.lock().receive_completions.pop_front();
            completion.map(|completion| completion(content)).is_some()
        }

        pub fn connections_created(&self) -> usize {
            self.shared.lock().connections_created
        }

        pub fn endpoint(&self) -> Option<Endpoint> {
            self.shared.lock().endpoint.clone()
        }

        pub fn parameters(&self) -> Option<ConnectionParameters> {
            self.shared.lock().parameters
        }

        pub fn started(&self) -> bool {
            self.shared.lock().queue.is_some()
        }

        /// 启动时收到的派发队列标签。
        pub fn queue_label(&self) -> Option<String> {
            self.shared
                .lock()
                .queue
                .as_ref()
                .map(|queue| queue.label().to_owned())
        }

        pub fn cancel_count(&self) -> usize {
            self.shared.lock().cancel_count
        }

        /// 三类通知回调是否都已安装。
        pub fn handlers_installed(&self) -> bool {
            let state = self.shared.lock();
            state.state_handler.is_some()
                && state.better_path_handler.is_some()
                && state.path_changed_handler.is_some()
        }

        /// 是否还有任何通知回调未被清除。
        pub fn any_handler_installed(&self) -> bool {
            let state = self.shared.lock();
            state.state_handler.is_some()
                || state.better_path_handler.is_some()
                || state.path_changed_handler.is_some()
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.shared.lock().sent.clone()
        }

        /// 按发送顺序返回全部非终结发送的载荷。
        pub fn sent_payloads(&self) -> Vec<Bytes> {
            self.shared
                .lock()
                .sent
                .iter()
                .filter(|message| !message.is_final)
                .filter_map(|message| message.content.clone())
                .collect()
        }

        /// 是否发送过写方向的终结标记。
        pub fn final_message_sent(&self) -> bool {
            self.shared
                .lock()
                .sent
                .iter()
                .any(|message| message.is_final && message.content.is_none())
        }

        pub fn pending_sends(&self) -> usize {
            self.shared.lock().send_completions.len()
        }

        pub fn batches(&self) -> usize {
            self.shared.lock().batches
        }

        pub fn receive_requests(&self) -> Vec<(usize, usize)> {
            self.shared.lock().receive_requests.clone()
        }

        pub fn outstanding_receives(&self) -> usize {
            self.shared.lock().receive_completions.len()
        }
    }
}

pub mod pipeline {
    //! 记录型 Pipeline。

    use std::sync::Arc;

    use bytes::Bytes;
    use parking_lot::Mutex;

    use crate::{
        error::ChannelError,
        pipeline::{ChannelPipeline, InboundEvent},
    };

    /// 通道触发的一次 Pipeline 事件。
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum PipelineEvent {
        Active,
        Inactive,
        Read(Bytes),
        ReadComplete,
        UserEvent(InboundEvent),
        Error(ChannelError),
        WritabilityChanged(bool),
    }

    /// 把事件按序记入共享列表的 Pipeline。
    pub struct RecordingPipeline {
        events: Arc<Mutex<Vec<PipelineEvent>>>,
    }

    impl RecordingPipeline {
        pub fn new() -> (Self, PipelineRecorder) {
            let events = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    events: Arc::clone(&events),
                },
                PipelineRecorder { events },
            )
        }

        fn record(&self, event: PipelineEvent) {
            self.events.lock().push(event);
        }
    }

    impl ChannelPipeline for RecordingPipeline {
        fn fire_channel_active(&mut self) {
            self.record(PipelineEvent::Active);
        }

        fn fire_channel_inactive(&mut self) {
            self.record(PipelineEvent::Inactive);
        }

        fn fire_channel_read(&mut self, data: Bytes) {
            self.record(PipelineEvent::Read(data));
        }

        fn fire_channel_read_complete(&mut self) {
            self.record(PipelineEvent::ReadComplete);
        }

        fn fire_user_inbound_event(&mut self, event: InboundEvent) {
            self.record(PipelineEvent::UserEvent(event));
        }

        fn fire_error_caught(&mut self, error: ChannelError) {
            self.record(PipelineEvent::Error(error));
        }

        fn fire_writability_changed(&mut self, writable: bool) {
            self.record(PipelineEvent::WritabilityChanged(writable));
        }
    }

    /// 读取 [`RecordingPipeline`] 记录的事件。
    #[derive(Clone)]
    pub struct PipelineRecorder {
        events: Arc<Mutex<Vec<PipelineEvent>>>,
    }

    impl PipelineRecorder {
        pub fn events(&self) -> Vec<PipelineEvent> {
            self.events.lock().clone()
        }

        /// 取出并清空已记录的事件。
        pub fn take(&self) -> Vec<PipelineEvent> {
            std::mem::take(&mut *self.events.lock())
        }

        pub fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
            self.events.lock().iter().filter(|event| predicate(event)).count()
        }

        /// 按序拼接全部读到的数据。
        pub fn read_bytes(&self) -> Vec<u8> {
            self.events
                .lock()
                .iter()
                .filter_map(|event| match event {
                    PipelineEvent::Read(data) => Some(&data[..]),
                    _ => None,
                })
                .flatten()
                .copied()
                .collect()
        }

        pub fn errors(&self) -> Vec<ChannelError> {
            self.events
                .lock()
                .iter()
                .filter_map(|event| match event {
                    PipelineEvent::Error(error) => Some(error.clone()),
                    _ => None,
                })
                .collect()
        }
    }
}

pub use connection::{ConnectionScript, ScriptedConnection, ScriptedConnector, SentMessage};
pub use pipeline::{PipelineEvent, PipelineRecorder, RecordingPipeline};
