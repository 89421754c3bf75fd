//! Line-based TCP control protocol

pub mod dispatcher;
pub mod framing;
pub mod server;

pub use dispatcher::CommandDispatcher;
pub use server::{ManagerSource, ProtocolServer, WELCOME};
