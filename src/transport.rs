//! Pipe naming, connection, and debugger process launch.
//!
//! The debugger creates two named pipes derived from the server name it is
//! launched with: `<name>` for commands and `<name>-events` for the event
//! stream. There is no ready-handshake; the client connects with retry and
//! backoff until the pipes exist or the deadline passes.

use std::io;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command as ProcessCommand};
use tracing::debug;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub const EVENT_PIPE_SUFFIX: &str = "-events";

/// The three stream halves a session runs on. The event pipe is
/// server-to-client only; its write direction is shut down at connect time.
pub struct PipeConnections {
    pub command_reader: BoxedReader,
    pub command_writer: BoxedWriter,
    pub event_reader: BoxedReader,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    pub fn from_millis(initial_ms: u64, max_ms: u64, deadline_ms: u64) -> Self {
        RetryPolicy {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            deadline: Duration::from_millis(deadline_ms),
        }
    }
}

/// `<workspace>_<random alnum suffix>`, unique enough that two editors on
/// the same workspace never collide on a pipe name.
pub fn random_server_name(workspace_name: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect();
    format!("{}_{}", workspace_name, suffix.to_lowercase())
}

/// Launch the debugger detached, telling it which pipe pair to create.
pub fn spawn_debugger(path: &str, server_name: &str) -> io::Result<Child> {
    debug!(%path, %server_name, "launching debugger");
    ProcessCommand::new(path)
        .arg("--servername")
        .arg(server_name)
        .spawn()
}

#[cfg(unix)]
fn pipe_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(name)
}

#[cfg(unix)]
async fn connect_stream(
    path: &std::path::Path,
    retry: RetryPolicy,
) -> io::Result<tokio::net::UnixStream> {
    let start = tokio::time::Instant::now();
    let mut delay = retry.initial;
    loop {
        match tokio::net::UnixStream::connect(path).await {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if start.elapsed() + delay > retry.deadline {
                    return Err(err);
                }
                debug!(path = %path.display(), %err, "pipe not ready, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(retry.max);
            }
        }
    }
}

#[cfg(unix)]
pub async fn connect_pipes(
    server_name: &str,
    retry: RetryPolicy,
) -> io::Result<PipeConnections> {
    let command =
        connect_stream(&pipe_path(server_name), retry).await?;
    let event_name = format!("{server_name}{EVENT_PIPE_SUFFIX}");
    let event = connect_stream(&pipe_path(&event_name), retry).await?;

    let (command_reader, command_writer) = command.into_split();
    let (event_reader, event_writer) = event.into_split();
    // Dropping the write half shuts down our sending direction; the event
    // pipe is read-only for the client.
    drop(event_writer);
    Ok(PipeConnections {
        command_reader: Box::new(command_reader),
        command_writer: Box::new(command_writer),
        event_reader: Box::new(event_reader),
    })
}

#[cfg(windows)]
fn pipe_path(name: &str) -> String {
    format!(r"\\.\pipe\{name}")
}

#[cfg(windows)]
async fn connect_stream(
    path: &str,
    retry: RetryPolicy,
) -> io::Result<tokio::net::windows::named_pipe::NamedPipeClient> {
    use tokio::net::windows::named_pipe::ClientOptions;
    let start = tokio::time::Instant::now();
    let mut delay = retry.initial;
    loop {
        match ClientOptions::new().open(path) {
            Ok(pipe) => return Ok(pipe),
            Err(err) => {
                if start.elapsed() + delay > retry.deadline {
                    return Err(err);
                }
                debug!(%path, %err, "pipe not ready, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(retry.max);
            }
        }
    }
}

#[cfg(windows)]
pub async fn connect_pipes(
    server_name: &str,
    retry: RetryPolicy,
) -> io::Result<PipeConnections> {
    let command = connect_stream(&pipe_path(server_name), retry).await?;
    let event_name = format!("{server_name}{EVENT_PIPE_SUFFIX}");
    let event = connect_stream(&pipe_path(&event_name), retry).await?;

    let (command_reader, command_writer) = tokio::io::split(command);
    let (event_reader, event_writer) = tokio::io::split(event);
    drop(event_writer);
    Ok(PipeConnections {
        command_reader: Box::new(command_reader),
        command_writer: Box::new(command_writer),
        event_reader: Box::new(event_reader),
    })
}
