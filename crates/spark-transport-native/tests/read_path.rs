//! 读路径与半关闭测试。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：单一在途读是入站方向唯一的背压手段；EOF 与读错误的处理决定了
//!   通道是平滑半关闭还是整体失败。
//! - **合同 (What)**：
//!   - 同一时刻至多一个接收请求，自动读只在上一次完成后续发；
//!   - 空数据不投递；数据与 EOF 同时到达时先投递数据；
//!   - 允许远端半关闭时 EOF 触发 `InputClosed`，否则以 `Eof` 失败；
//!   - 两个方向都关闭后通道整体关闭。

mod support;

use spark_transport_native::{
    ChannelError, ChannelOption, ChannelPromise, CloseMode, InboundEvent, NativeError,
    ReceivedContent, test_stubs::PipelineEvent,
};
use support::{Harness, half_closure_options, options_without_auto_read};

#[test]
fn received_data_is_delivered_then_read_again() {
    let mut harness = Harness::active(Default::default());

    harness.script.complete_receive(ReceivedContent::data(&b"hello"[..]));
    harness.pump();

    assert_eq!(
        harness.recorder.events(),
        vec![
            PipelineEvent::Read(bytes::Bytes::from_static(b"hello")),
            PipelineEvent::ReadComplete,
        ]
    );
    assert_eq!(harness.script.receive_requests().len(), 2, "自动读应续发");
    assert_eq!(harness.script.outstanding_receives(), 1);
}

#[test]
fn receive_length_follows_configuration() {
    let mut harness = Harness::active(spark_transport_native::ChannelOptions {
        max_receive_length: 1500,
        ..Default::default()
    });
    assert_eq!(harness.script.receive_requests(), vec![(1, 1500)]);
    harness.channel.read();
    assert_eq!(harness.script.outstanding_receives(), 1);
}

#[test]
fn zero_receive_length_is_raised_to_one_byte() {
    let mut harness = Harness::active(spark_transport_native::ChannelOptions {
        max_receive_length: 0,
        ..Default::default()
    });
    assert_eq!(harness.script.receive_requests(), vec![(1, 1)]);
    assert_eq!(harness.channel.options().max_receive_length, 1);

    harness.script.complete_receive(ReceivedContent::data(&b"x"[..]));
    harness.pump();
    assert_eq!(harness.script.receive_requests(), vec![(1, 1), (1, 1)]);
}

#[test]
fn empty_content_is_not_delivered() {
    let mut harness = Harness::active(Default::default());

    assert!(harness.script.complete_receive(ReceivedContent::data(&b""[..])));
    harness.pump();
    assert!(harness.script.complete_receive(ReceivedContent::default()));
    harness.pump();

    assert!(harness.recorder.events().is_empty());
    assert_eq!(harness.script.receive_requests().len(), 3, "空结果后仍续发读");
    assert!(harness.channel.is_active());
}

#[test]
fn manual_reads_allow_only_one_outstanding_request() {
    let mut harness = Harness::active(options_without_auto_read());
    assert!(harness.script.receive_requests().is_empty());

    harness.channel.read();
    harness.channel.read();
    assert_eq!(harness.script.receive_requests().len(), 1);
    assert!(harness.channel.status().outstanding_read);

    harness.script.complete_receive(ReceivedContent::data(&b"x"[..]));
    harness.pump();
    assert!(!harness.channel.status().outstanding_read);
    assert_eq!(harness.script.receive_requests().len(), 1, "手动读不应自动续发");

    harness.channel.read();
    assert_eq!(harness.script.receive_requests().len(), 2);
}

#[test]
fn enabling_auto_read_while_active_issues_a_read() {
    let mut harness = Harness::active(options_without_auto_read());
    harness
        .channel
        .set_option(ChannelOption::AutoRead(true))
        .expect("自动读可随时修改");
    assert_eq!(harness.script.receive_requests().len(), 1);
}

#[test]
fn eof_without_half_closure_fails_channel() {
    let mut harness = Harness::active(Default::default());

    harness.script.complete_receive(ReceivedContent::eof());
    harness.pump();

    assert_eq!(
        harness.recorder.events(),
        vec![PipelineEvent::Inactive, PipelineEvent::Error(ChannelError::Eof)]
    );
    assert!(harness.channel.is_closed());
}

#[test]
fn eof_with_half_closure_closes_input_only() {
    let mut harness = Harness::active(half_closure_options());

    harness.script.complete_receive(ReceivedContent {
        content: Some(bytes::Bytes::from_static(b"bye")),
        is_complete: true,
        error: None,
    });
    harness.pump();

    assert_eq!(
        harness.recorder.take(),
        vec![
            PipelineEvent::Read(bytes::Bytes::from_static(b"bye")),
            PipelineEvent::ReadComplete,
            PipelineEvent::UserEvent(InboundEvent::InputClosed),
        ]
    );
    assert!(harness.channel.is_active());
    assert!(harness.channel.is_input_closed());
    assert_eq!(harness.script.outstanding_receives(), 0, "读方向关闭后不再读");

    harness.channel.read();
    assert_eq!(harness.script.outstanding_receives(), 0);

    let mut written = harness.write(b"still writable");
    harness.channel.flush();
    harness.script.complete_next_send(None);
    harness.pump();
    assert_eq!(written.try_outcome(), Some(Ok(())));
}

#[test]
fn receive_error_fails_channel_after_delivering_data() {
    let mut harness = Harness::active(Default::default());
    let reset = NativeError::posix(54, "connection reset by peer");

    harness.script.complete_receive(ReceivedContent {
        content: Some(bytes::Bytes::from_static(b"partial")),
        is_complete: false,
        error: Some(reset.clone()),
    });
    harness.pump();

    assert_eq!(
        harness.recorder.events(),
        vec![
            PipelineEvent::Read(bytes::Bytes::from_static(b"partial")),
            PipelineEvent::ReadComplete,
            PipelineEvent::Error(ChannelError::Transport(reset)),
            PipelineEvent::Inactive,
        ]
    );
}

#[test]
fn late_receive_after_close_is_discarded() {
    let mut harness = Harness::active(Default::default());
    harness.channel.close(CloseMode::All, None);
    harness.recorder.take();

    harness.script.complete_receive(ReceivedContent::data(&b"late"[..]));
    harness.pump();

    assert!(harness.recorder.events().is_empty());
    assert_eq!(harness.script.receive_requests().len(), 1);
}

#[test]
fn output_half_close_sends_final_message_and_fails_pending_writes() {
    let mut harness = Harness::active(Default::default());
    let mut queued = harness.write(b"never flushed");

    let (promise, mut closed) = ChannelPromise::new();
    harness.channel.close(CloseMode::Output, Some(promise));

    assert_eq!(queued.try_outcome(), Some(Err(ChannelError::OutputClosed)));
    assert!(harness.script.final_message_sent());
    assert!(harness.channel.is_output_closed());
    assert!(harness.channel.is_active(), "读方向仍然打开");
    assert_eq!(closed.try_outcome(), None, "终结标记确认前承诺不完成");

    harness.script.complete_next_send(None);
    harness.pump();
    assert_eq!(closed.try_outcome(), Some(Ok(())));

    let mut after = harness.write(b"after close");
    assert_eq!(after.try_outcome(), None);
    harness.channel.flush();
    assert_eq!(after.try_outcome(), Some(Err(ChannelError::OutputClosed)));
    assert_eq!(harness.script.sent().len(), 1, "只发送过终结标记");
}

#[test]
fn closing_output_twice_fails_only_the_second_promise() {
    let mut harness = Harness::active(Default::default());
    harness.channel.close(CloseMode::Output, None);

    let (promise, mut again) = ChannelPromise::new();
    harness.channel.close(CloseMode::Output, Some(promise));

    assert_eq!(again.try_outcome(), Some(Err(ChannelError::OutputClosed)));
    assert!(harness.channel.is_active());
    assert!(harness.recorder.errors().is_empty());
}

#[test]
fn both_directions_closed_closes_the_channel() {
    let mut harness = Harness::active(half_closure_options());
    harness.script.complete_receive(ReceivedContent::eof());
    harness.pump();
    harness.recorder.take();

    harness.channel.close(CloseMode::Output, None);
    harness.pump();

    assert_eq!(harness.recorder.events(), vec![PipelineEvent::Inactive]);
    assert!(harness.channel.is_closed());
    assert_eq!(harness.script.cancel_count(), 1);
}

#[test]
fn peer_eof_after_output_half_close_closes_the_channel() {
    let mut harness = Harness::active(half_closure_options());
    harness.channel.close(CloseMode::Output, None);

    harness.script.complete_receive(ReceivedContent::eof());
    harness.pump();

    assert_eq!(
        harness.recorder.events(),
        vec![
            PipelineEvent::UserEvent(InboundEvent::InputClosed),
            PipelineEvent::Inactive,
        ]
    );
    assert!(harness.channel.is_closed());
}

#[test]
fn half_close_rejections_depend_on_state() {
    let mut idle = Harness::new(Default::default());
    let (promise, mut output) = ChannelPromise::new();
    idle.channel.close(CloseMode::Output, Some(promise));
    assert_eq!(output.try_outcome(), Some(Err(ChannelError::ClosedChannel)));

    let _connected = idle.connect();
    let (promise, mut activating) = ChannelPromise::new();
    idle.channel.close(CloseMode::Output, Some(promise));
    assert!(matches!(
        activating.try_outcome(),
        Some(Err(ChannelError::InappropriateState { state: "activating" }))
    ));

    let mut active = Harness::active(Default::default());
    let (promise, mut input) = ChannelPromise::new();
    active.channel.close(CloseMode::Input, Some(promise));
    assert_eq!(input.try_outcome(), Some(Err(ChannelError::OperationUnsupported)));
    assert!(active.channel.is_active());
}
