use alloc::string::String;
use core::fmt;

use crate::TransportSocketAddr;

/// 原生传输可识别的连接目标。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 原生网络子系统接受的目标不止 IP:Port：主机名、服务发现名称与本地路径都可直接建连；
///   适配器只负责转交，解析与寻址完全由原生层完成。
/// - 当前路径报告的端点同样使用该类型，因此地址查询需要把它折算回
///   [`TransportSocketAddr`]，非 IP 端点在折算时返回 `None`。
///
/// ## 契约（What）
/// - `Socket`：已解析的 IP 端点；
/// - `HostPort`：待原生层解析的主机名 + 端口；
/// - `Service`：服务发现名称（`name`/`kind`/`domain`）；
/// - `Unix`：本地套接字路径；
/// - **后置条件**：类型本身不执行解析，也不校验主机名合法性。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Endpoint {
    Socket { addr: TransportSocketAddr },
    HostPort { host: String, port: u16 },
    Service { name: String, kind: String, domain: String },
    Unix { path: String },
}

impl Endpoint {
    /// 以已解析地址构造端点。
    pub const fn socket(addr: TransportSocketAddr) -> Self {
        Self::Socket { addr }
    }

    /// 以主机名与端口构造端点。
    pub fn host_port(host: impl Into<String>, port: u16) -> Self {
        Self::HostPort {
            host: host.into(),
            port,
        }
    }

    /// 若端点为 IP 端点，返回对应的 [`TransportSocketAddr`]。
    pub fn socket_addr(&self) -> Option<TransportSocketAddr> {
        match self {
            Self::Socket { addr } => Some(*addr),
            _ => None,
        }
    }
}

impl From<TransportSocketAddr> for Endpoint {
    fn from(addr: TransportSocketAddr) -> Self {
        Self::socket(addr)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket { addr } => write!(f, "{addr}"),
            Self::HostPort { host, port } => write!(f, "{host}:{port}"),
            Self::Service { name, kind, domain } => write!(f, "{name}.{kind}.{domain}"),
            Self::Unix { path } => write!(f, "unix:{path}"),
        }
    }
}
