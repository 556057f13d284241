//! JSON-RPC 2.0 tool server: envelope types, the tool registry, the
//! SSE multiplexer, and the axum HTTP transport tying them together.

pub mod envelope;
pub mod registry;
pub mod server;
pub mod sse;

pub use envelope::{RpcError, RpcRequest, RpcResponse};
pub use registry::{ToolHandler, ToolRegistry};
pub use server::ToolServer;
pub use sse::{SseEvent, SseMultiplexer};
