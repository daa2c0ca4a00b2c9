//! Client for the RemedyBG driver protocol: a binary request/response
//! protocol spoken over two named pipes, one for commands and one for
//! asynchronous debugger events.

pub mod breakpoints;
pub mod channel;
pub mod config;
mod formatting;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod wire;

pub use breakpoints::{BreakpointStore, SyncAction};
pub use channel::{ChannelError, CommandChannel, EventDecoder};
pub use config::DriverConfig;
pub use protocol::{
    Breakpoint, BreakpointKind, Command, DebugEvent, Response, ResponsePayload, ResultCode,
    SourceLocChangeReason, SourceLocation, TargetState,
};
pub use session::{
    ConnectionState, Driver, Session, SessionError, SessionEvent, SessionHandle,
};
pub use wire::WireError;

pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .without_time()
        .with_env_filter(filter)
        .init();
}
