//! 一次性完成通知：建连、写入、关闭等操作的结果通过 [`ChannelPromise`] 回传给调用方。

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::error::ChannelError;

/// 操作结果。
pub type ChannelResult = Result<(), ChannelError>;

/// 只能完成一次的操作结果承诺。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 通道的每个出站操作都可能附带一个完成通知；通知可能在当前调用内完成（例如通道已关闭），
///   也可能跨越原生回调在稍后完成（例如写入被原生层确认）。
/// - “只完成一次”由所有权保证：`succeed`/`fail` 消费 `self`，重复完成在类型层面不可表达。
///
/// ## 契约 (What)
/// - [`ChannelPromise::new`] 返回承诺与对应的 [`PromiseFuture`]；
/// - 调用方丢弃 [`PromiseFuture`] 后完成承诺是合法的空操作；
/// - 承诺在未完成时被丢弃，等待方得到 [`ChannelError::DriverGone`]。
#[derive(Debug)]
pub struct ChannelPromise {
    sender: oneshot::Sender<ChannelResult>,
}

impl ChannelPromise {
    /// 创建承诺与等待端。
    pub fn new() -> (Self, PromiseFuture) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, PromiseFuture { receiver })
    }

    /// 以成功完成。
    pub fn succeed(self) {
        self.complete(Ok(()));
    }

    /// 以错误完成。
    pub fn fail(self, error: ChannelError) {
        self.complete(Err(error));
    }

    /// 以给定结果完成。
    pub fn complete(self, result: ChannelResult) {
        // 等待端可能已被丢弃，此时结果无人关心。
        let _ = self.sender.send(result);
    }
}

/// 对可选承诺的便捷操作，通道内部大量出现 `Option<ChannelPromise>`。
pub(crate) trait OptionalPromise {
    fn succeed(self);
    fn fail(self, error: ChannelError);
    fn complete(self, result: ChannelResult);
}

impl OptionalPromise for Option<ChannelPromise> {
    fn succeed(self) {
        if let Some(promise) = self {
            promise.succeed();
        }
    }

    fn fail(self, error: ChannelError) {
        if let Some(promise) = self {
            promise.fail(error);
        }
    }

    fn complete(self, result: ChannelResult) {
        if let Some(promise) = self {
            promise.complete(result);
        }
    }
}

/// [`ChannelPromise`] 的等待端。
#[derive(Debug)]
pub struct PromiseFuture {
    receiver: oneshot::Receiver<ChannelResult>,
}

impl PromiseFuture {
    /// 非阻塞地查询结果：尚未完成时返回 `None`。
    pub fn try_outcome(&mut self) -> Option<ChannelResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ChannelError::DriverGone)),
        }
    }
}

impl Future for PromiseFuture {
    type Output = ChannelResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ChannelError::DriverGone)))
    }
}
