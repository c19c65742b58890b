use spark_transport::WriteBufferWaterMark;

/// 管理原生通道写路径的背压统计。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 原生连接的发送接口没有背压反馈，只在每次发送完成时回调；适配器因此需要自行
///   记账“已排队未确认”的字节数，并把它转化为 Pipeline 可见的可写性标志。
/// - 以高/低水位线构成滞回带，避免排队量在单一阈值附近抖动时反复翻转可写性。
///
/// ## 逻辑 (How)
/// - `outstanding` 记录排队但尚未被原生层确认发送的字节数；
/// - 排队时累加，越过高水位且当前可写时翻转为不可写；
/// - 发送完成时扣减，跌破低水位且当前不可写时翻转为可写；
/// - 水位线变化时按新阈值重新判定一次。
///
/// ## 契约 (What)
/// - 三个判定方法均返回“可写性是否发生翻转”，由调用方决定是否触发
///   `writability_changed` 事件；
/// - **前置条件**：调用方需保证在串行执行上下文中调用；
/// - **后置条件**：同一方向的翻转只报告一次，重复排队不会再次报告。
///
/// ## 注意事项 (Trade-offs)
/// - 扣减使用饱和减法；若原生层重复回报同一写入的完成，计数不会下溢，但可写性判定
///   会提前恢复。
#[derive(Debug)]
pub(crate) struct BackpressureManager {
    outstanding: usize,
    writable: bool,
    marks: WriteBufferWaterMark,
}

impl BackpressureManager {
    /// 以给定水位线创建可写状态的统计。
    pub(crate) fn new(marks: WriteBufferWaterMark) -> Self {
        Self {
            outstanding: 0,
            writable: true,
            marks,
        }
    }

    /// 当前是否可写。
    pub(crate) fn is_writable(&self) -> bool {
        self.writable
    }

    /// 当前排队未确认的字节数。
    pub(crate) fn outstanding_bytes(&self) -> usize {
        self.outstanding
    }

    /// 记录新排队的字节，返回可写性是否翻转为 `false`。
    pub(crate) fn writability_changes_when_queueing(&mut self, bytes: usize) -> bool {
        self.outstanding = self.outstanding.saturating_add(bytes);
        if self.writable && self.outstanding > self.marks.high() {
            self.writable = false;
            return true;
        }
        false
    }

    /// 记录已发送的字节，返回可写性是否翻转为 `true`。
    pub(crate) fn writability_changes_when_sent(&mut self, bytes: usize) -> bool {
        self.outstanding = self.outstanding.saturating_sub(bytes);
        if !self.writable && self.outstanding < self.marks.low() {
            self.writable = true;
            return true;
        }
        false
    }

    /// 替换水位线并按新阈值重新判定。
    pub(crate) fn water_marks_changed(&mut self, marks: WriteBufferWaterMark) -> bool {
        self.marks = marks;
        if self.writable && self.outstanding > marks.high() {
            self.writable = false;
            true
        } else if !self.writable && self.outstanding < marks.low() {
            self.writable = true;
            true
        } else {
            false
        }
    }
}
