//! 写路径测试：入队、批量冲刷、完成结算与出站背压。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：写入承诺的完成顺序、可写性通知的次数、关闭时待发写入的结局，
//!   都是上层 Handler 赖以做流控的契约；任何一处偏差都会让上层卡死或重复发送。
//! - **合同 (What)**：
//!   - 一次冲刷的全部写入在同一批次中按入队顺序交给原生层；
//!   - 排队字节越过高水位只通知一次不可写，降到低水位以下只通知一次可写；
//!   - 关闭时未冲刷的写入全部以关闭原因失败。

mod support;

use proptest::prelude::*;
use spark_transport_native::{
    ChannelError, ChannelOption, ChannelOptions, ChannelPromise, CloseMode, NativeError,
    WriteBufferWaterMark, test_stubs::PipelineEvent,
};
use support::Harness;

fn small_marks() -> ChannelOptions {
    ChannelOptions {
        write_buffer_water_mark: WriteBufferWaterMark::new(4, 8).expect("合法水位线"),
        ..ChannelOptions::default()
    }
}

#[test]
fn write_on_inactive_channel_fails_immediately() {
    let mut harness = Harness::new(Default::default());
    let mut written = harness.write(b"early");
    assert_eq!(written.try_outcome(), Some(Err(ChannelError::ClosedChannel)));

    let _connected = harness.connect();
    let mut activating = harness.write(b"still early");
    assert_eq!(activating.try_outcome(), Some(Err(ChannelError::ClosedChannel)));
}

#[test]
fn flush_sends_queued_writes_in_one_ordered_batch() {
    let mut harness = Harness::active(Default::default());
    let mut first = harness.write(b"alpha");
    let mut second = harness.write(b"beta");
    let mut third = harness.write(b"gamma");
    assert!(harness.script.sent().is_empty(), "冲刷前不应发送");

    harness.channel.flush();

    let sent = harness.script.sent();
    assert_eq!(harness.script.batches(), 1);
    assert!(sent.iter().all(|message| message.batch == 1 && !message.is_final));
    assert_eq!(
        harness.script.sent_payloads(),
        vec![&b"alpha"[..], &b"beta"[..], &b"gamma"[..]]
    );
    assert_eq!(harness.channel.status().pending_writes, 0);

    assert!(harness.script.complete_next_send(None));
    let reset = NativeError::posix(54, "connection reset by peer");
    assert!(harness.script.complete_next_send(Some(reset.clone())));
    assert!(harness.script.complete_next_send(None));
    harness.pump();

    assert_eq!(first.try_outcome(), Some(Ok(())));
    assert_eq!(second.try_outcome(), Some(Err(ChannelError::Transport(reset))));
    assert_eq!(third.try_outcome(), Some(Ok(())));
}

#[test]
fn flush_with_nothing_queued_sends_nothing() {
    let mut harness = Harness::active(Default::default());
    harness.channel.flush();
    assert_eq!(harness.script.batches(), 0);
}

#[test]
fn closing_fails_every_unflushed_write() {
    let mut harness = Harness::active(Default::default());
    let mut writes: Vec<_> = [&b"one"[..], &b"two"[..], &b"three"[..]]
        .into_iter()
        .map(|data| {
            let (promise, future) = ChannelPromise::new();
            harness
                .channel
                .write(bytes::Bytes::copy_from_slice(data), Some(promise));
            future
        })
        .collect();

    harness.channel.close(CloseMode::All, None);

    for written in &mut writes {
        assert_eq!(written.try_outcome(), Some(Err(ChannelError::ClosedChannel)));
    }
    assert!(harness.script.sent().is_empty());
}

#[test]
fn flushed_writes_still_settle_after_close() {
    let mut harness = Harness::active(Default::default());
    let mut written = harness.write(b"in flight");
    harness.channel.flush();
    harness.channel.close(CloseMode::All, None);
    harness.recorder.take();

    harness.script.complete_all_sends();
    harness.pump();

    assert_eq!(written.try_outcome(), Some(Ok(())));
    assert!(
        harness.recorder.events().is_empty(),
        "关闭后的发送完成不应触发可写性通知"
    );
}

#[test]
fn crossing_water_marks_flips_writability_once_each_way() {
    let mut harness = Harness::active(small_marks());
    let _a = harness.write(b"12345");
    assert!(harness.channel.is_writable());
    let _b = harness.write(b"12345");
    let _c = harness.write(b"12345");
    assert!(!harness.channel.is_writable());
    assert_eq!(
        harness.recorder.events(),
        vec![PipelineEvent::WritabilityChanged(false)]
    );

    harness.channel.flush();
    harness.script.complete_next_send(None);
    harness.script.complete_next_send(None);
    harness.pump();
    assert!(!harness.channel.is_writable(), "仍高于低水位");

    harness.script.complete_next_send(None);
    harness.pump();
    assert!(harness.channel.is_writable());
    assert_eq!(
        harness.recorder.events(),
        vec![
            PipelineEvent::WritabilityChanged(false),
            PipelineEvent::WritabilityChanged(true),
        ]
    );
}

#[test]
fn lowering_high_water_mark_reevaluates_writability() {
    let mut harness = Harness::active(Default::default());
    let _queued = harness.write(b"0123456789");

    harness
        .channel
        .set_option(ChannelOption::WriteBufferWaterMark(
            WriteBufferWaterMark::new(2, 4).expect("合法水位线"),
        ))
        .expect("水位线可随时修改");

    assert!(!harness.channel.is_writable());
    assert_eq!(
        harness.recorder.events(),
        vec![PipelineEvent::WritabilityChanged(false)]
    );
}

proptest! {
    /// 任意写入大小与完成顺序下，可写性通知总是严格交替，且最终排空后一定可写。
    #[test]
    fn writability_notifications_alternate(sizes in proptest::collection::vec(1usize..16, 1..24)) {
        let mut harness = Harness::active(small_marks());
        for size in &sizes {
            let data = vec![b'x'; *size];
            harness.channel.write(bytes::Bytes::from(data), None);
        }
        harness.channel.flush();
        harness.script.complete_all_sends();
        harness.pump();

        let flips: Vec<bool> = harness
            .recorder
            .events()
            .into_iter()
            .filter_map(|event| match event {
                PipelineEvent::WritabilityChanged(writable) => Some(writable),
                _ => None,
            })
            .collect();
        for pair in flips.windows(2) {
            prop_assert_ne!(pair[0], pair[1]);
        }
        if let Some(first) = flips.first() {
            prop_assert!(!first);
        }
        prop_assert!(harness.channel.is_writable());
        prop_assert_eq!(harness.channel.status().pending_writes, 0);
    }

    /// 一次冲刷中的写入按入队顺序发送，承诺也按同一顺序结算。
    #[test]
    fn flushed_writes_keep_enqueue_order(payloads in proptest::collection::vec(
        proptest::collection::vec(any::<u8>(), 1..32),
        1..16,
    )) {
        let mut harness = Harness::active(Default::default());
        let mut futures = Vec::new();
        for payload in &payloads {
            let (promise, future) = ChannelPromise::new();
            harness.channel.write(bytes::Bytes::from(payload.clone()), Some(promise));
            futures.push(future);
        }
        harness.channel.flush();

        let sent: Vec<Vec<u8>> = harness
            .script
            .sent_payloads()
            .into_iter()
            .map(|data| data.to_vec())
            .collect();
        prop_assert_eq!(&sent, &payloads);

        for index in 0..futures.len() {
            prop_assert!(harness.script.complete_next_send(None));
            harness.pump();
            prop_assert_eq!(futures[index].try_outcome(), Some(Ok(())));
            if let Some(next) = futures.get_mut(index + 1) {
                prop_assert_eq!(next.try_outcome(), None);
            }
        }
    }
}
