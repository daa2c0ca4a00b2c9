use crate::protocol::*;
use crate::session::SessionEvent;

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetState::None => write!(f, "idle"),
            TargetState::Suspended => write!(f, "suspended"),
            TargetState::Executing => write!(f, "executing"),
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ResultCode::Unknown => "unknown error",
            ResultCode::Ok => "ok",
            ResultCode::Fail => "command failed",
            ResultCode::Aborted => "command aborted",
            ResultCode::InvalidCommand => "invalid command",
            ResultCode::BufferTooSmall => "buffer too small",
            ResultCode::FailedOpeningFile => "failed opening file",
            ResultCode::FailedSavingSession => "failed saving session",
            ResultCode::InvalidId => "invalid id",
            ResultCode::InvalidTargetState => "invalid target state",
            ResultCode::FailedNoActiveConfig => "no active configuration",
            ResultCode::InvalidBreakpointKind => "invalid breakpoint kind",
        };
        write!(f, "{message}")
    }
}

impl std::fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} [{}] {}",
            self.id,
            if self.enabled { "on" } else { "off" },
            self.kind
        )?;
        if !self.condition_expr.is_empty() {
            write!(f, " when {}", self.condition_expr)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakpointKind::FunctionName { name, overload_id } => {
                write!(f, "{name} (overload {overload_id})")
            }
            BreakpointKind::FilenameLine {
                filename,
                line_number,
            } => write!(f, "{filename}:{line_number}"),
            BreakpointKind::Address { address } => write!(f, "0x{address:X}"),
            BreakpointKind::Processor {
                expression,
                num_bytes,
                access_kind,
            } => write!(
                f,
                "{expression} ({num_bytes} bytes, access {access_kind})"
            ),
        }
    }
}

impl std::fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DebugEvent::ExitProcess => write!(f, "ExitProcess"),
            DebugEvent::TargetStarted => write!(f, "TargetStarted"),
            DebugEvent::TargetAttached => write!(f, "TargetAttached"),
            DebugEvent::TargetDetached => write!(f, "TargetDetached"),
            DebugEvent::TargetContinued => write!(f, "TargetContinued"),
            DebugEvent::SourceLocationChanged {
                filename,
                line_number,
                reason,
            } => write!(
                f,
                "SourceLocationChanged {{ {filename}:{line_number}, reason: {reason:?} }}"
            ),
            DebugEvent::BreakpointHit { breakpoint_id } => {
                write!(f, "BreakpointHit {{ id: {breakpoint_id} }}")
            }
            DebugEvent::BreakpointResolved { breakpoint_id } => {
                write!(f, "BreakpointResolved {{ id: {breakpoint_id} }}")
            }
            DebugEvent::BreakpointAdded { breakpoint_id } => {
                write!(f, "BreakpointAdded {{ id: {breakpoint_id} }}")
            }
            DebugEvent::BreakpointModified { breakpoint_id } => {
                write!(f, "BreakpointModified {{ id: {breakpoint_id} }}")
            }
            DebugEvent::BreakpointRemoved { breakpoint_id } => {
                write!(f, "BreakpointRemoved {{ id: {breakpoint_id} }}")
            }
            DebugEvent::OutputDebugString { message } => {
                write!(f, "OutputDebugString {{ {message} }}")
            }
        }
    }
}

impl std::fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Connected => write!(f, "connected"),
            SessionEvent::Disconnected => write!(f, "disconnected"),
            SessionEvent::TargetStateChanged(state) => write!(f, "target {state}"),
            SessionEvent::SourceLocationRevealed {
                filename,
                line_number,
                reason,
            } => write!(f, "stopped at {filename}:{line_number} ({reason:?})"),
            SessionEvent::CurrentLineCleared => write!(f, "current line cleared"),
            SessionEvent::BreakpointBound {
                caller_id,
                breakpoint_id,
            } => write!(f, "breakpoint {caller_id} bound to #{breakpoint_id}"),
            SessionEvent::BreakpointCreated {
                caller_id,
                filename,
                line_number,
                breakpoint_id,
            } => write!(
                f,
                "breakpoint {caller_id} created at {filename}:{line_number} (#{breakpoint_id})"
            ),
            SessionEvent::BreakpointRemoved { caller_id } => {
                write!(f, "breakpoint {caller_id} removed")
            }
            SessionEvent::CommandFailed { command, result } => {
                write!(f, "command {} failed: {result}", command.opcode())
            }
            SessionEvent::DebugOutput { message } => write!(f, "output: {message}"),
            SessionEvent::ProtocolFault { message } => write!(f, "protocol fault: {message}"),
        }
    }
}
