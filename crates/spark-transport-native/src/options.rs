//! 通道配置：不可变快照、运行期选项与派生的原生连接参数。
//!
//! # 设计要点（Why）
//! - 原生连接在启动前一次性接收参数，启动后无法再改地址复用、点对点等属性；
//!   因此这些选项在激活开始后被锁定。
//! - 自动读、远端半关闭支持、水位线属于通道自身的行为开关，可随时修改，在下一个
//!   决策点生效。
//! - 原生传输只理解少数套接字选项；其余类别（UDP、IP 层等）必须显式报错，不能静默忽略。

use serde::Deserialize;
use spark_transport::WriteBufferWaterMark;

use crate::error::ChannelError;

/// 单次接收请求的默认上限。
pub const DEFAULT_MAX_RECEIVE_LENGTH: usize = 8192;

/// 每条连接的配置快照。
///
/// # 契约（What）
/// - 默认值：`auto_read = true`、`allow_remote_half_closure = false`、
///   `wait_for_activity = true`，其余布尔项为 `false`；
/// - `write_buffer_water_mark` 默认 `32 KiB / 64 KiB`；
/// - `max_receive_length` 为单次接收的最大字节数，必须大于 0；
/// - 可由 TOML 文本加载，未知字段会被拒绝。
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelOptions {
    pub auto_read: bool,
    pub allow_remote_half_closure: bool,
    pub wait_for_activity: bool,
    pub reuse_address: bool,
    pub reuse_port: bool,
    pub enable_peer_to_peer: bool,
    pub no_delay: bool,
    pub keep_alive: bool,
    pub write_buffer_water_mark: WriteBufferWaterMark,
    pub max_receive_length: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            auto_read: true,
            allow_remote_half_closure: false,
            wait_for_activity: true,
            reuse_address: false,
            reuse_port: false,
            enable_peer_to_peer: false,
            no_delay: false,
            keep_alive: false,
            write_buffer_water_mark: WriteBufferWaterMark::default(),
            max_receive_length: DEFAULT_MAX_RECEIVE_LENGTH,
        }
    }
}

impl ChannelOptions {
    /// 从 TOML 文本加载配置。
    ///
    /// ```
    /// use spark_transport_native::ChannelOptions;
    ///
    /// let options = ChannelOptions::from_toml_str(
    ///     "allow_remote_half_closure = true\n[write_buffer_water_mark]\nlow = 1024\nhigh = 4096\n",
    /// )
    /// .expect("合法配置");
    /// assert!(options.allow_remote_half_closure);
    /// assert_eq!(options.write_buffer_water_mark.high(), 4096);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ChannelError> {
        let options: ChannelOptions =
            toml::from_str(text).map_err(|err| ChannelError::InvalidConfiguration {
                detail: err.to_string(),
            })?;
        if options.max_receive_length == 0 {
            return Err(ChannelError::InvalidConfiguration {
                detail: "max_receive_length must be at least 1".to_owned(),
            });
        }
        Ok(options)
    }

    /// 派生交给原生层的连接参数。
    pub fn connection_parameters(&self) -> ConnectionParameters {
        ConnectionParameters {
            // 原生层不区分地址复用与端口复用，两者合并为一个开关。
            allow_local_endpoint_reuse: self.reuse_address || self.reuse_port,
            include_peer_to_peer: self.enable_peer_to_peer,
            no_delay: self.no_delay,
            keep_alive: self.keep_alive,
        }
    }

    /// 应用一次选项修改。
    ///
    /// `activation_started` 为真时，连接参数类选项返回 [`ChannelError::OptionLocked`]。
    /// 副作用（补发读请求、重新判定可写性）由通道在调用成功后处理。
    pub(crate) fn apply(
        &mut self,
        option: ChannelOption,
        activation_started: bool,
    ) -> Result<(), ChannelError> {
        match option {
            ChannelOption::AutoRead(value) => self.auto_read = value,
            ChannelOption::AllowRemoteHalfClosure(value) => self.allow_remote_half_closure = value,
            ChannelOption::WaitForActivity(value) => self.wait_for_activity = value,
            ChannelOption::WriteBufferWaterMark(marks) => self.write_buffer_water_mark = marks,
            ChannelOption::EnablePeerToPeer(value) => {
                ensure_unlocked("enable_peer_to_peer", activation_started)?;
                self.enable_peer_to_peer = value;
            }
            ChannelOption::Socket { option, value } => {
                let flag = SocketFlag::resolve(option)?;
                ensure_unlocked(flag.name(), activation_started)?;
                flag.set(self, value != 0);
            }
        }
        Ok(())
    }

    /// 读取选项当前值。
    pub(crate) fn get(&self, key: ChannelOptionKey) -> Result<ChannelOption, ChannelError> {
        Ok(match key {
            ChannelOptionKey::AutoRead => ChannelOption::AutoRead(self.auto_read),
            ChannelOptionKey::AllowRemoteHalfClosure => {
                ChannelOption::AllowRemoteHalfClosure(self.allow_remote_half_closure)
            }
            ChannelOptionKey::WaitForActivity => {
                ChannelOption::WaitForActivity(self.wait_for_activity)
            }
            ChannelOptionKey::WriteBufferWaterMark => {
                ChannelOption::WriteBufferWaterMark(self.write_buffer_water_mark)
            }
            ChannelOptionKey::EnablePeerToPeer => {
                ChannelOption::EnablePeerToPeer(self.enable_peer_to_peer)
            }
            ChannelOptionKey::Socket(option) => ChannelOption::Socket {
                option,
                value: i32::from(SocketFlag::resolve(option)?.get(self)),
            },
        })
    }
}

/// 原生传输能够表达的套接字选项。
#[derive(Clone, Copy, Debug)]
enum SocketFlag {
    ReuseAddress,
    ReusePort,
    KeepAlive,
    NoDelay,
}

impl SocketFlag {
    fn resolve(option: SocketOption) -> Result<Self, ChannelError> {
        match (option.level, option.name) {
            (SocketOptionLevel::Socket, SocketOption::SO_REUSEADDR) => Ok(SocketFlag::ReuseAddress),
            (SocketOptionLevel::Socket, SocketOption::SO_REUSEPORT) => Ok(SocketFlag::ReusePort),
            (SocketOptionLevel::Socket, SocketOption::SO_KEEPALIVE) => Ok(SocketFlag::KeepAlive),
            (SocketOptionLevel::Tcp, SocketOption::TCP_NODELAY) => Ok(SocketFlag::NoDelay),
            _ => Err(ChannelError::UnsupportedSocketOption {
                level: option.level.raw(),
                name: option.name,
            }),
        }
    }

    fn name(self) -> &'static str {
        match self {
            SocketFlag::ReuseAddress => "reuse_address",
            SocketFlag::ReusePort => "reuse_port",
            SocketFlag::KeepAlive => "keep_alive",
            SocketFlag::NoDelay => "no_delay",
        }
    }

    fn get(self, options: &ChannelOptions) -> bool {
        match self {
            SocketFlag::ReuseAddress => options.reuse_address,
            SocketFlag::ReusePort => options.reuse_port,
            SocketFlag::KeepAlive => options.keep_alive,
            SocketFlag::NoDelay => options.no_delay,
        }
    }

    fn set(self, options: &mut ChannelOptions, value: bool) {
        match self {
            SocketFlag::ReuseAddress => options.reuse_address = value,
            SocketFlag::ReusePort => options.reuse_port = value,
            SocketFlag::KeepAlive => options.keep_alive = value,
            SocketFlag::NoDelay => options.no_delay = value,
        }
    }
}

fn ensure_unlocked(option: &'static str, activation_started: bool) -> Result<(), ChannelError> {
    if activation_started {
        return Err(ChannelError::OptionLocked { option });
    }
    Ok(())
}

/// 交给原生连接工厂的参数集合。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub allow_local_endpoint_reuse: bool,
    pub include_peer_to_peer: bool,
    pub no_delay: bool,
    pub keep_alive: bool,
}

/// 套接字选项层级。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketOptionLevel {
    Socket,
    Tcp,
    Udp,
    Ip,
    Ipv6,
    Other(i32),
}

impl SocketOptionLevel {
    /// 层级对应的原始数值（Linux 取值），用于错误报告。
    pub const fn raw(self) -> i32 {
        match self {
            SocketOptionLevel::Socket => 1,
            SocketOptionLevel::Tcp => 6,
            SocketOptionLevel::Udp => 17,
            SocketOptionLevel::Ip => 0,
            SocketOptionLevel::Ipv6 => 41,
            SocketOptionLevel::Other(raw) => raw,
        }
    }
}

/// 以 `(level, name)` 标识的套接字选项。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SocketOption {
    pub level: SocketOptionLevel,
    pub name: i32,
}

impl SocketOption {
    pub const SO_REUSEADDR: i32 = 2;
    pub const SO_KEEPALIVE: i32 = 9;
    pub const SO_REUSEPORT: i32 = 15;
    pub const TCP_NODELAY: i32 = 1;

    pub const REUSE_ADDRESS: Self = Self::new(SocketOptionLevel::Socket, Self::SO_REUSEADDR);
    pub const REUSE_PORT: Self = Self::new(SocketOptionLevel::Socket, Self::SO_REUSEPORT);
    pub const KEEP_ALIVE: Self = Self::new(SocketOptionLevel::Socket, Self::SO_KEEPALIVE);
    pub const NO_DELAY: Self = Self::new(SocketOptionLevel::Tcp, Self::TCP_NODELAY);

    pub const fn new(level: SocketOptionLevel, name: i32) -> Self {
        Self { level, name }
    }
}

/// 运行期可设置的通道选项，携带新值。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOption {
    AutoRead(bool),
    AllowRemoteHalfClosure(bool),
    WaitForActivity(bool),
    WriteBufferWaterMark(WriteBufferWaterMark),
    EnablePeerToPeer(bool),
    Socket { option: SocketOption, value: i32 },
}

/// 读取选项时使用的键。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOptionKey {
    AutoRead,
    AllowRemoteHalfClosure,
    WaitForActivity,
    WriteBufferWaterMark,
    EnablePeerToPeer,
    Socket(SocketOption),
}
