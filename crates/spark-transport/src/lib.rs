#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![doc = "spark-transport: 传输层共享契约类型。"]
#![doc = ""]
#![doc = "== 使命概述 =="]
#![doc = "- **Why**：原生连接适配器、TCP 实现与上层 Pipeline 需要共同语言描述“连到哪里”“关闭哪一侧”“何时不可写”。"]
#![doc = "- **What**：提供 `TransportSocketAddr`、`Endpoint`、`CloseMode` 与 `WriteBufferWaterMark`。"]
#![doc = "- **How**：面向 `no_std + alloc` 设计，所有类型均为纯数据结构，不触发 IO。"]

extern crate alloc;

pub mod addr;
pub mod close;
pub mod endpoint;
pub mod watermark;

pub use addr::TransportSocketAddr;
pub use close::CloseMode;
pub use endpoint::Endpoint;
pub use watermark::{WaterMarkError, WriteBufferWaterMark};
