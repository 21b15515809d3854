//! Socket handling for the server.
//!
//! One thread multiplexes every listening port and accepted connection with
//! `mio`. Connections carry length-prefixed frames; decoded chunks go to the
//! assembler and ready results go to the result sender.

mod connection;
mod errors;
mod event_loop;
mod listener;

pub use self::errors::ServerError;
pub(crate) use self::event_loop::{Command, EventLoop, LoopContext, WAKER};
pub(crate) use self::listener::Listener;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
