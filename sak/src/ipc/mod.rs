//! RPC boundary hosting the tool layer
//!
//! Newline-delimited JSON over stdio or a Unix domain socket. Each request
//! carries an `id` that its response echoes, so responses may arrive out of
//! order when requests overlap.

use std::path::PathBuf;

pub mod client;
pub mod messages;
pub mod server;

pub use client::RpcClient;
pub use messages::{Request, RequestBody, Response, ResponseBody};
pub use server::{RpcServer, cleanup_socket, create_listener_at};

/// Default socket path for `serve --socket` and `call --socket`
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sak")
        .join("sak.sock")
}
