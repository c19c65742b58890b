//! 集成测试共用的夹具：脚本化连接 + 记录型 Pipeline + 手动泵送的通道。
#![allow(dead_code)]

use spark_transport_native::{
    ChannelOptions, ChannelPromise, DispatchReceiver, Endpoint, NativeChannel, NativeState,
    PromiseFuture, TransportSocketAddr,
    test_stubs::{ConnectionScript, PipelineRecorder, RecordingPipeline, ScriptedConnector},
};

pub type TestChannel = NativeChannel<ScriptedConnector, RecordingPipeline>;

pub struct Harness {
    pub channel: TestChannel,
    pub receiver: DispatchReceiver,
    pub script: ConnectionScript,
    pub recorder: PipelineRecorder,
}

impl Harness {
    pub fn new(options: ChannelOptions) -> Self {
        let (connector, script) = ScriptedConnector::new();
        let (pipeline, recorder) = RecordingPipeline::new();
        let (channel, receiver) = NativeChannel::new(connector, pipeline, options);
        Self {
            channel,
            receiver,
            script,
            recorder,
        }
    }

    /// 建连并报告就绪，清空激活阶段产生的事件。
    pub fn active(options: ChannelOptions) -> Self {
        let mut harness = Self::new(options);
        let mut connected = harness.connect();
        assert!(harness.script.report_state(NativeState::Ready), "回调应已安装");
        harness.pump();
        assert_eq!(connected.try_outcome(), Some(Ok(())), "建连承诺应成功");
        assert!(harness.channel.is_active());
        harness.recorder.take();
        harness
    }

    pub fn connect(&mut self) -> PromiseFuture {
        let (promise, future) = ChannelPromise::new();
        self.channel.connect(endpoint(), Some(promise));
        future
    }

    pub fn write(&mut self, data: &'static [u8]) -> PromiseFuture {
        let (promise, future) = ChannelPromise::new();
        self.channel.write(bytes::Bytes::from_static(data), Some(promise));
        future
    }

    pub fn pump(&mut self) -> usize {
        self.channel.run_pending(&mut self.receiver)
    }
}

pub fn endpoint() -> Endpoint {
    Endpoint::socket(TransportSocketAddr::v4([127, 0, 0, 1], 8443))
}

pub fn options_without_auto_read() -> ChannelOptions {
    ChannelOptions {
        auto_read: false,
        ..ChannelOptions::default()
    }
}

pub fn half_closure_options() -> ChannelOptions {
    ChannelOptions {
        allow_remote_half_closure: true,
        ..ChannelOptions::default()
    }
}
