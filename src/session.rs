//! Session lifecycle: process launch, pipe connections, and the single
//! task that owns all mutable protocol state.
//!
//! Both pipes are read by dedicated loops that forward raw chunks into the
//! session task over channels; the task is the only writer of the in-flight
//! queue, the identity map, and the target state. Callers talk to it
//! through a cloneable [`SessionHandle`] and observe it through a stream of
//! [`SessionEvent`] notifications.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::breakpoints::{BreakpointStore, SyncAction};
use crate::channel::{ChannelError, CommandChannel, EventDecoder};
use crate::config::DriverConfig;
use crate::protocol::{
    Command, DebugEvent, Response, ResponsePayload, ResultCode, SourceLocChangeReason, TargetState,
};
use crate::transport::{self, BoxedReader, BoxedWriter, PipeConnections, RetryPolicy};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already connecting or connected")]
    AlreadyActive,
    #[error("failed to launch debugger process: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to connect to debugger pipes for `{server_name}`: {source}")]
    Connect {
        server_name: String,
        source: io::Error,
    },
    #[error("session is no longer running")]
    Closed,
}

/// Coarse connection state of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Notifications the session pushes to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    TargetStateChanged(TargetState),
    /// The target stopped somewhere the caller should reveal.
    SourceLocationRevealed {
        filename: String,
        line_number: u32,
        reason: SourceLocChangeReason,
    },
    /// Execution resumed; any current-line highlight is stale.
    CurrentLineCleared,
    BreakpointBound {
        caller_id: String,
        breakpoint_id: i32,
    },
    /// The debugger has a breakpoint the caller did not know about; the
    /// caller should create one at this location.
    BreakpointCreated {
        caller_id: String,
        filename: String,
        line_number: u32,
        breakpoint_id: i32,
    },
    BreakpointRemoved {
        caller_id: String,
    },
    CommandFailed {
        command: Command,
        result: ResultCode,
    },
    DebugOutput {
        message: String,
    },
    /// Parsing state is unrecoverable (desynchronized stream or write
    /// failure); the session disconnects right after this.
    ProtocolFault {
        message: String,
    },
}

enum Request {
    Command(Command),
    AddBreakpoint {
        caller_id: String,
        filename: String,
        line_number: u32,
    },
    DeleteBreakpoint {
        caller_id: String,
    },
    DeleteAllBreakpoints,
    SyncBreakpoints,
    Stop,
}

/// Cloneable front door to a running session task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl SessionHandle {
    fn request(&self, request: Request) -> Result<(), SessionError> {
        self.tx.send(request).map_err(|_| SessionError::Closed)
    }

    /// Issue a raw command (stepping, execution control, session files).
    /// Breakpoint traffic should go through the dedicated methods so the
    /// identity map stays consistent.
    pub fn send_command(&self, command: Command) -> Result<(), SessionError> {
        self.request(Request::Command(command))
    }

    pub fn add_breakpoint(
        &self,
        caller_id: impl Into<String>,
        filename: impl Into<String>,
        line_number: u32,
    ) -> Result<(), SessionError> {
        self.request(Request::AddBreakpoint {
            caller_id: caller_id.into(),
            filename: filename.into(),
            line_number,
        })
    }

    pub fn delete_breakpoint(&self, caller_id: impl Into<String>) -> Result<(), SessionError> {
        self.request(Request::DeleteBreakpoint {
            caller_id: caller_id.into(),
        })
    }

    pub fn delete_all_breakpoints(&self) -> Result<(), SessionError> {
        self.request(Request::DeleteAllBreakpoints)
    }

    /// Full refresh: the debugger's breakpoint set becomes authoritative.
    pub fn sync_breakpoints(&self) -> Result<(), SessionError> {
        self.request(Request::SyncBreakpoints)
    }

    pub fn stop(&self) -> Result<(), SessionError> {
        self.request(Request::Stop)
    }
}

/// One debugging session: a spawned debugger process, two pipe
/// connections, and the task that owns the protocol state. Single-use; a
/// stopped session cannot be restarted.
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl Session {
    /// Derive a fresh server name, launch the debugger, and connect both
    /// pipes (with retry/backoff; the debugger offers no ready signal).
    pub async fn start(
        config: DriverConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>), SessionError> {
        let server_name = transport::random_server_name(&config.workspace_name);
        info!(%server_name, "starting debugger session");
        let mut child = transport::spawn_debugger(&config.debugger_path, &server_name)
            .map_err(SessionError::Spawn)?;
        let retry = RetryPolicy::from_millis(
            config.connect_retry_initial_ms,
            config.connect_retry_max_ms,
            config.connect_timeout_ms,
        );
        let pipes = match transport::connect_pipes(&server_name, retry).await {
            Ok(pipes) => pipes,
            Err(source) => {
                let _ = child.start_kill();
                return Err(SessionError::Connect {
                    server_name,
                    source,
                });
            }
        };
        Ok(Self::spawn_task(config, pipes, Some(child)))
    }

    /// Run a session over pre-opened streams. Used by tests and by
    /// embedders that manage the debugger process themselves; no process
    /// is spawned and `stop` only sends ExitDebugger.
    pub fn attach<C, E>(
        config: DriverConfig,
        command_stream: C,
        event_stream: E,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>)
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        E: AsyncRead + Send + Unpin + 'static,
    {
        let (command_reader, command_writer) = tokio::io::split(command_stream);
        let pipes = PipeConnections {
            command_reader: Box::new(command_reader),
            command_writer: Box::new(command_writer),
            event_reader: Box::new(event_stream),
        };
        Self::spawn_task(config, pipes, None)
    }

    fn spawn_task(
        config: DriverConfig,
        pipes: PipeConnections,
        child: Option<Child>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let task = SessionTask {
            config,
            channel: CommandChannel::new(pipes.command_writer),
            events: EventDecoder::new(),
            store: BreakpointStore::new(),
            target_state: TargetState::None,
            child,
            notify: notify_tx,
        };
        let join = tokio::spawn(task.run(request_rx, pipes.command_reader, pipes.event_reader));
        (
            Session {
                handle: SessionHandle { tx: request_tx },
                task: join,
            },
            notify_rx,
        )
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the session and wait for its task to wind down.
    pub async fn stop(self) {
        let _ = self.handle.stop();
        let _ = self.task.await;
    }
}

/// Owns an `Option<Session>` and enforces the one-live-session rule.
pub struct Driver {
    config: DriverConfig,
    session: Option<Session>,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Driver {
            config,
            session: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.session {
            Some(session) if !session.is_finished() => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    /// Start a session. Rejected while one is still live; a finished
    /// session is replaced.
    pub async fn start_session(
        &mut self,
    ) -> Result<mpsc::UnboundedReceiver<SessionEvent>, SessionError> {
        if self.session.as_ref().is_some_and(|s| !s.is_finished()) {
            return Err(SessionError::AlreadyActive);
        }
        let (session, events) = Session::start(self.config.clone()).await?;
        self.session = Some(session);
        Ok(events)
    }

    pub fn session(&self) -> Option<SessionHandle> {
        self.session
            .as_ref()
            .filter(|s| !s.is_finished())
            .map(Session::handle)
    }

    pub async fn stop_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop().await;
        }
    }
}

struct SessionTask {
    config: DriverConfig,
    channel: CommandChannel<BoxedWriter>,
    events: EventDecoder,
    store: BreakpointStore,
    target_state: TargetState,
    child: Option<Child>,
    notify: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        command_reader: BoxedReader,
        event_reader: BoxedReader,
    ) {
        let (command_tx, mut command_rx) = mpsc::channel::<Vec<u8>>(32);
        let (event_tx, mut event_rx) = mpsc::channel::<Vec<u8>>(32);
        let command_read_task = tokio::spawn(read_loop(command_reader, command_tx));
        let event_read_task = tokio::spawn(read_loop(event_reader, event_tx));

        self.emit(SessionEvent::Connected);
        if let Err(err) = self.post_connect().await {
            self.fault(&err);
        } else {
            let mut event_channel_open = true;
            loop {
                tokio::select! {
                    request = requests.recv() => match request {
                        Some(Request::Stop) | None => {
                            self.shutdown().await;
                            break;
                        }
                        Some(request) => {
                            if let Err(err) = self.handle_request(request).await {
                                self.fault(&err);
                                break;
                            }
                        }
                    },
                    chunk = command_rx.recv() => match chunk {
                        Some(data) => {
                            if let Err(err) = self.on_command_data(&data).await {
                                self.fault(&err);
                                break;
                            }
                        }
                        None => {
                            info!("command channel closed by debugger");
                            break;
                        }
                    },
                    chunk = event_rx.recv(), if event_channel_open => match chunk {
                        Some(data) => {
                            if let Err(err) = self.on_event_data(&data).await {
                                self.fault(&err);
                                break;
                            }
                        }
                        None => {
                            // The channels are not symmetrically coupled: a
                            // closed event pipe leaves the session up.
                            info!("event channel closed");
                            event_channel_open = false;
                        }
                    },
                }
            }
        }

        // No late responses can be attributed once the channel is gone.
        self.channel.discard_in_flight();
        command_read_task.abort();
        event_read_task.abort();
        self.emit(SessionEvent::Disconnected);
        info!("session ended");
    }

    async fn post_connect(&mut self) -> Result<(), ChannelError> {
        if self.config.sync_breakpoints_on_connect {
            let command = self.store.fetch_all();
            self.channel.send(command).await?;
        }
        if self.config.suppress_foreground_on_suspend {
            self.channel
                .send(Command::SetBringToForegroundOnSuspended { enabled: false })
                .await?;
        }
        Ok(())
    }

    async fn handle_request(&mut self, request: Request) -> Result<(), ChannelError> {
        match request {
            Request::Command(command) => self.channel.send(command).await,
            Request::AddBreakpoint {
                caller_id,
                filename,
                line_number,
            } => {
                if let Some(command) = self.store.add(&caller_id, &filename, line_number) {
                    self.channel.send(command).await?;
                    if self.config.goto_line_on_new_breakpoint {
                        self.channel
                            .send(Command::GotoFileAtLine {
                                filename,
                                line_number,
                            })
                            .await?;
                    }
                }
                Ok(())
            }
            Request::DeleteBreakpoint { caller_id } => {
                if let Some(command) = self.store.delete(&caller_id) {
                    self.channel.send(command).await?;
                }
                Ok(())
            }
            Request::DeleteAllBreakpoints => {
                let command = self.store.delete_all();
                self.channel.send(command).await
            }
            Request::SyncBreakpoints => {
                let command = self.store.fetch_all();
                self.channel.send(command).await
            }
            Request::Stop => Ok(()),
        }
    }

    async fn on_command_data(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let completed = self.channel.on_data(data)?;
        for (command, response) in completed {
            self.on_response(command, response).await?;
        }
        Ok(())
    }

    async fn on_response(
        &mut self,
        command: Command,
        response: Response,
    ) -> Result<(), ChannelError> {
        if !response.result.is_ok() {
            if let Command::AddBreakpointAtFilenameLine { caller_id, .. } = &command {
                self.store.abort_add(caller_id);
            }
            warn!(opcode = command.opcode(), result = %response.result, "command failed");
            self.emit(SessionEvent::CommandFailed {
                command,
                result: response.result,
            });
            return Ok(());
        }
        match (command, response.payload) {
            (
                Command::AddBreakpointAtFilenameLine { caller_id, .. },
                Some(ResponsePayload::BreakpointId(breakpoint_id)),
            ) => {
                if self.store.bind(&caller_id, breakpoint_id) {
                    self.emit(SessionEvent::BreakpointBound {
                        caller_id,
                        breakpoint_id,
                    });
                } else {
                    debug!(breakpoint_id, "stale add response ignored");
                }
            }
            (Command::GetBreakpoints, Some(ResponsePayload::Breakpoints(list))) => {
                for action in self.store.apply_breakpoint_list(&list) {
                    self.emit_sync_action(action);
                }
            }
            (Command::GetBreakpoint { .. }, Some(ResponsePayload::Breakpoint(bp))) => {
                if let Some(action) = self.store.apply_breakpoint(&bp) {
                    self.emit_sync_action(action);
                }
            }
            (Command::GetTargetState, Some(ResponsePayload::TargetState(state))) => {
                self.set_target_state(state);
            }
            (Command::GotoFileAtLine { .. }, Some(ResponsePayload::FileId(file_id))) => {
                debug!(file_id, "file opened in debugger");
            }
            (command, _) => {
                trace!(opcode = command.opcode(), "response complete");
            }
        }
        Ok(())
    }

    async fn on_event_data(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        let events = self.events.on_data(data)?;
        for event in events {
            self.on_event(event).await?;
        }
        Ok(())
    }

    async fn on_event(&mut self, event: DebugEvent) -> Result<(), ChannelError> {
        debug!(%event, "debugger event");
        match event {
            DebugEvent::ExitProcess => self.set_target_state(TargetState::None),
            DebugEvent::TargetStarted => self.set_target_state(TargetState::Executing),
            DebugEvent::TargetContinued => {
                self.set_target_state(TargetState::Executing);
                self.emit(SessionEvent::CurrentLineCleared);
            }
            DebugEvent::TargetAttached | DebugEvent::TargetDetached => {}
            DebugEvent::SourceLocationChanged {
                filename,
                line_number,
                reason,
            } => {
                if reason.is_stop_reason() {
                    self.set_target_state(TargetState::Suspended);
                    self.emit(SessionEvent::SourceLocationRevealed {
                        filename,
                        line_number,
                        reason,
                    });
                }
            }
            DebugEvent::BreakpointHit { breakpoint_id } => {
                self.set_target_state(TargetState::Suspended);
                self.resolve_if_unknown(breakpoint_id).await?;
            }
            DebugEvent::BreakpointAdded { breakpoint_id }
            | DebugEvent::BreakpointModified { breakpoint_id }
            | DebugEvent::BreakpointResolved { breakpoint_id } => {
                self.resolve_if_unknown(breakpoint_id).await?;
            }
            DebugEvent::BreakpointRemoved { breakpoint_id } => {
                // Unknown ids are a no-op: the debugger can remove
                // breakpoints we never represented (non-source kinds).
                if let Some(caller_id) = self.store.remove_by_debugger_id(breakpoint_id) {
                    self.emit(SessionEvent::BreakpointRemoved { caller_id });
                }
            }
            DebugEvent::OutputDebugString { message } => {
                self.emit(SessionEvent::DebugOutput { message });
            }
        }
        Ok(())
    }

    /// Events carry only the debugger id; fetch the full definition before
    /// materializing anything on the caller side.
    async fn resolve_if_unknown(&mut self, breakpoint_id: i32) -> Result<(), ChannelError> {
        if let Some(command) = self.store.resolve_unknown(breakpoint_id) {
            self.channel.send(command).await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(err) = child.start_kill() {
                debug!(%err, "debugger process kill failed");
            }
        }
        let exit = Command::ExitDebugger {
            debug_behavior: self.config.exit_debug_behavior,
            session_behavior: self.config.exit_session_behavior,
        };
        // Fire and forget; the response is never awaited.
        if let Err(err) = self.channel.send(exit).await {
            debug!(%err, "exit command not delivered");
        }
    }

    fn set_target_state(&mut self, state: TargetState) {
        if self.target_state != state {
            self.target_state = state;
            self.emit(SessionEvent::TargetStateChanged(state));
        }
    }

    fn emit_sync_action(&mut self, action: SyncAction) {
        match action {
            SyncAction::Bound {
                caller_id,
                breakpoint_id,
            } => self.emit(SessionEvent::BreakpointBound {
                caller_id,
                breakpoint_id,
            }),
            SyncAction::Created {
                caller_id,
                location,
                breakpoint_id,
            } => self.emit(SessionEvent::BreakpointCreated {
                caller_id,
                filename: location.filename,
                line_number: location.line_number,
                breakpoint_id,
            }),
            SyncAction::Removed { caller_id } => {
                self.emit(SessionEvent::BreakpointRemoved { caller_id })
            }
        }
    }

    fn fault(&mut self, err: &ChannelError) {
        error!(%err, "session fault, disconnecting");
        self.emit(SessionEvent::ProtocolFault {
            message: err.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // The caller may have dropped its receiver; that is not our
        // problem to report.
        let _ = self.notify.send(event);
    }
}

async fn read_loop(mut reader: BoxedReader, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                error!(%err, "pipe read failed");
                break;
            }
        }
    }
}
