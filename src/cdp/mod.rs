//! # Chrome DevTools Protocol (CDP) 会话层
//!
//! 在单个 WebSocket 连接上实现 CDP 会话核心：命令与响应的关联、事件广播，
//! 以及按客户端缓存的域封装。
//!
//! ## 主要功能
//! - **消息编解码**: 命令帧编码，入站帧分类为响应或事件
//! - **挂起调用表**: 按 id 关联响应，超时或取消时自动清理
//! - **事件广播**: 每个方法独立的有界广播通道，慢订阅者丢弃最旧事件
//! - **会话状态**: Connecting → Open → Closing → Closed，关闭时所有挂起调用以传输错误结束
//! - **域注册表**: 每个域类型每个客户端只创建一次
//! - **扁平会话**: 通过 `sessionId` 在同一连接上路由多个目标
//!
//! ## 模块结构
//! - `types`: 协议信封与 `Command`/`Event` trait
//! - `codec`: 帧编解码
//! - `transport`: 帧传输抽象与 WebSocket 实现
//! - `pending`: 挂起调用表
//! - `hub`: 事件广播中心
//! - `connection`: 会话核心
//! - `client`: 客户端与会话句柄
//! - `registry`: 域注册表
//! - `discovery`: HTTP 端点发现
//! - `mock`: 用于测试的内存传输
//!
//! ## 使用示例
//! ```rust,no_run
//! use chaser_cdp::{cdp::CdpClient, config::Config};
//!
//! # async fn example() -> chaser_cdp::Result<()> {
//! let client = CdpClient::connect(&Config::default()).await?;
//!
//! let page = client.page()?;
//! page.enable().await?;
//! let result = page.navigate("https://example.com").await?;
//! println!("Navigated frame: {}", result.frame_id);
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod discovery;
pub mod hub;
pub mod mock;
pub mod pending;
pub mod registry;
pub mod transport;
pub mod types;

#[cfg(test)]
mod tests;

pub use client::{CdpClient, Domain, SessionHandle};
pub use connection::CdpSession;
pub use discovery::{BrowserVersion, TargetInfo};
pub use hub::{EventHub, EventStream, EventView, SessionFilter, TypedEventStream};
pub use pending::PendingCalls;
pub use registry::DomainRegistry;
pub use transport::{Frame, Transport, WebSocketTransport};
pub use types::{
    Command, CommandEnvelope, Event, EventEnvelope, InboundMessage, ProtocolViolation,
    ResponseEnvelope, SessionState,
};

// Re-export mock for development/testing
pub use mock::{mock_transport, MockPeer, MockTransport};
