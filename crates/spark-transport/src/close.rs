/// 本地关闭请求所针对的方向。
///
/// # 契约（What）
/// - `All`：完整关闭连接，释放原生句柄；
/// - `Output`：写半关闭，向对端发送终结标记后不再传输数据；
/// - `Input`：读半关闭。是否支持由具体实现决定，不支持的实现必须以错误拒绝，
///   而不是静默降级为 `All`。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseMode {
    All,
    Output,
    Input,
}
