use alloc::{format, string::String, vec::Vec};
use core::fmt;

/// `TransportSocketAddr` 在 `no_std` 场景下提供统一的 Socket 地址表达。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 原生连接的当前路径会报告本端/对端端点，适配器需要把其中的 IP 端点折算为
///   与 TCP 实现一致的地址类型，避免调用方区分“原生连接”与“套接字连接”。
/// - 支持 `no_std + alloc`，不强制依赖 `std::net`。
///
/// ## 合同（What）
/// - `V4` 与 `V6` 分别表示 IPv4/IPv6，端口号使用主机序 `u16`；
/// - `Display` 输出 `a.b.c.d:port` 或 `[x:x:..]:port`，适合日志字段；
/// - **后置条件**：枚举值不可变，格式化输出稳定。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum TransportSocketAddr {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
}

impl TransportSocketAddr {
    /// 构造 IPv4 地址。
    pub const fn v4(addr: [u8; 4], port: u16) -> Self {
        Self::V4 { addr, port }
    }

    /// 构造 IPv6 地址。
    pub const fn v6(addr: [u16; 8], port: u16) -> Self {
        Self::V6 { addr, port }
    }

    /// 返回端口号。
    pub const fn port(&self) -> u16 {
        match self {
            Self::V4 { port, .. } | Self::V6 { port, .. } => *port,
        }
    }
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportSocketAddr::V4 { addr, port } => write!(
                f,
                "{}.{}.{}.{}:{}",
                addr[0], addr[1], addr[2], addr[3], port
            ),
            TransportSocketAddr::V6 { addr, port } => {
                let segments: Vec<String> = addr
                    .iter()
                    .map(|segment| format!("{:x}", segment))
                    .collect();
                write!(f, "[{}]:{}", segments.join(":"), port)
            }
        }
    }
}

#[cfg(feature = "std")]
impl From<std::net::SocketAddr> for TransportSocketAddr {
    fn from(addr: std::net::SocketAddr) -> Self {
        match addr {
            std::net::SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            std::net::SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

#[cfg(feature = "std")]
impl From<TransportSocketAddr> for std::net::SocketAddr {
    fn from(addr: TransportSocketAddr) -> Self {
        match addr {
            TransportSocketAddr::V4 { addr, port } => std::net::SocketAddr::from((addr, port)),
            TransportSocketAddr::V6 { addr, port } => {
                std::net::SocketAddr::from((std::net::Ipv6Addr::from(addr), port))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_formats_both_families() {
        assert_eq!(TransportSocketAddr::v4([10, 0, 0, 1], 443).to_string(), "10.0.0.1:443");
        assert_eq!(
            TransportSocketAddr::v6([0xfe80, 0, 0, 0, 0, 0, 0, 1], 8080).to_string(),
            "[fe80:0:0:0:0:0:0:1]:8080"
        );
    }

    #[cfg(feature = "std")]
    #[test]
    fn std_socket_addr_conversion_keeps_port() {
        let std_addr: std::net::SocketAddr = "127.0.0.1:9000".parse().expect("合法地址");
        let addr = TransportSocketAddr::from(std_addr);
        assert_eq!(addr.port(), 9000);
        assert_eq!(std::net::SocketAddr::from(addr), std_addr);
    }
}
