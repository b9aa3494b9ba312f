pub mod rpc;

pub use rpc::{ChainClient, RpcPool};
