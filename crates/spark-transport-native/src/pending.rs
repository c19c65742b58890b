use std::collections::VecDeque;

use bytes::Bytes;

use crate::{
    error::ChannelError,
    promise::{ChannelPromise, OptionalPromise},
};

/// 一条等待冲刷的写入。
#[derive(Debug)]
pub(crate) struct PendingWrite {
    pub(crate) payload: Bytes,
    pub(crate) promise: Option<ChannelPromise>,
}

/// 按入队顺序保存待冲刷写入的 FIFO 队列。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - `write` 只负责入队，`flush` 才把数据交给原生层；两者之间的写入及其完成通知必须
///   原样保存，且冲刷顺序严格等于入队顺序。
///
/// ## 契约 (What)
/// - `push`：追加写入；
/// - `drain`：按 FIFO 顺序取出全部写入，交由调用方提交；
/// - `fail_all`：取出并以给定错误失败全部写入，用于所有关闭路径；
/// - **后置条件**：写入只会通过上述两条路径离开队列，不会重排或合并。
#[derive(Debug, Default)]
pub(crate) struct PendingWriteQueue {
    writes: VecDeque<PendingWrite>,
}

impl PendingWriteQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, payload: Bytes, promise: Option<ChannelPromise>) {
        self.writes.push_back(PendingWrite { payload, promise });
    }

    pub(crate) fn len(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// 队列中尚未冲刷的字节总数。
    pub(crate) fn queued_bytes(&self) -> usize {
        self.writes.iter().map(|write| write.payload.len()).sum()
    }

    /// 按入队顺序取出全部写入。
    pub(crate) fn drain(&mut self) -> impl Iterator<Item = PendingWrite> + '_ {
        self.writes.drain(..)
    }

    /// 以同一错误失败全部写入，返回被失败的写入数与字节数。
    pub(crate) fn fail_all(&mut self, error: &ChannelError) -> (usize, usize) {
        let mut count = 0;
        let mut bytes = 0;
        for write in self.writes.drain(..) {
            count += 1;
            bytes += write.payload.len();
            write.promise.fail(error.clone());
        }
        (count, bytes)
    }
}
