//! Domain types for the RemedyBG driver protocol.
//!
//! Every message on the wire starts with a 16-bit opcode tag; payload layout
//! is a function of the tag alone (there is no outer length field). The
//! types here are the closed tag universes; the byte layouts live in
//! [`crate::wire`].

use serde::Deserialize;

/// Coarse execution state of the debug target, as reported by the debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    None,
    Suspended,
    Executing,
}

impl TargetState {
    pub fn from_u16(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(TargetState::None),
            2 => Some(TargetState::Suspended),
            3 => Some(TargetState::Executing),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            TargetState::None => 1,
            TargetState::Suspended => 2,
            TargetState::Executing => 3,
        }
    }
}

/// Result code carried in the first two bytes of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Unknown,
    Ok,
    Fail,
    Aborted,
    InvalidCommand,
    BufferTooSmall,
    FailedOpeningFile,
    FailedSavingSession,
    InvalidId,
    InvalidTargetState,
    FailedNoActiveConfig,
    InvalidBreakpointKind,
}

impl ResultCode {
    /// Unrecognized codes collapse to `Unknown`, matching how the driver
    /// reports errors it has no dedicated code for.
    pub fn from_u16(raw: u16) -> Self {
        match raw {
            1 => ResultCode::Ok,
            2 => ResultCode::Fail,
            3 => ResultCode::Aborted,
            4 => ResultCode::InvalidCommand,
            5 => ResultCode::BufferTooSmall,
            6 => ResultCode::FailedOpeningFile,
            7 => ResultCode::FailedSavingSession,
            8 => ResultCode::InvalidId,
            9 => ResultCode::InvalidTargetState,
            10 => ResultCode::FailedNoActiveConfig,
            11 => ResultCode::InvalidBreakpointKind,
            _ => ResultCode::Unknown,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            ResultCode::Unknown => 0,
            ResultCode::Ok => 1,
            ResultCode::Fail => 2,
            ResultCode::Aborted => 3,
            ResultCode::InvalidCommand => 4,
            ResultCode::BufferTooSmall => 5,
            ResultCode::FailedOpeningFile => 6,
            ResultCode::FailedSavingSession => 7,
            ResultCode::InvalidId => 8,
            ResultCode::InvalidTargetState => 9,
            ResultCode::FailedNoActiveConfig => 10,
            ResultCode::InvalidBreakpointKind => 11,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ResultCode::Ok)
    }
}

/// What the debugger should do with a running target when asked to exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebuggingTargetBehavior {
    IfDebuggingTargetAbort,
    IfDebuggingTargetStopDebugging,
    IfDebuggingTargetContinueDebugging,
}

impl DebuggingTargetBehavior {
    pub fn as_u8(self) -> u8 {
        match self {
            DebuggingTargetBehavior::IfDebuggingTargetAbort => 0,
            DebuggingTargetBehavior::IfDebuggingTargetStopDebugging => 1,
            DebuggingTargetBehavior::IfDebuggingTargetContinueDebugging => 2,
        }
    }
}

/// What the debugger should do with unsaved session changes when asked to
/// exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifiedSessionBehavior {
    IfSessionIsModifiedSaveAndContinue,
    IfSessionIsModifiedContinueWithoutSaving,
    IfSessionIsModifiedAbort,
}

impl ModifiedSessionBehavior {
    pub fn as_u8(self) -> u8 {
        match self {
            ModifiedSessionBehavior::IfSessionIsModifiedSaveAndContinue => 0,
            ModifiedSessionBehavior::IfSessionIsModifiedContinueWithoutSaving => 1,
            ModifiedSessionBehavior::IfSessionIsModifiedAbort => 2,
        }
    }
}

/// Why the debugger moved its source cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLocChangeReason {
    Unspecified,
    CommandLine,
    Driver,
    BreakpointSelected,
    CurrentFrameChanged,
    ThreadChanged,
    BreakpointHit,
    ExceptionHit,
    StepOver,
    StepIn,
    StepOut,
    NonUserBreakpoint,
    DebugBreak,
}

impl SourceLocChangeReason {
    /// The reason field has a fixed width (u16), so unknown values stay
    /// decodable; they collapse to `Unspecified`.
    pub fn from_u16(raw: u16) -> Self {
        match raw {
            1 => SourceLocChangeReason::CommandLine,
            2 => SourceLocChangeReason::Driver,
            3 => SourceLocChangeReason::BreakpointSelected,
            4 => SourceLocChangeReason::CurrentFrameChanged,
            5 => SourceLocChangeReason::ThreadChanged,
            6 => SourceLocChangeReason::BreakpointHit,
            7 => SourceLocChangeReason::ExceptionHit,
            8 => SourceLocChangeReason::StepOver,
            9 => SourceLocChangeReason::StepIn,
            10 => SourceLocChangeReason::StepOut,
            11 => SourceLocChangeReason::NonUserBreakpoint,
            12 => SourceLocChangeReason::DebugBreak,
            _ => SourceLocChangeReason::Unspecified,
        }
    }

    pub fn as_u16(self) -> u16 {
        match self {
            SourceLocChangeReason::Unspecified => 0,
            SourceLocChangeReason::CommandLine => 1,
            SourceLocChangeReason::Driver => 2,
            SourceLocChangeReason::BreakpointSelected => 3,
            SourceLocChangeReason::CurrentFrameChanged => 4,
            SourceLocChangeReason::ThreadChanged => 5,
            SourceLocChangeReason::BreakpointHit => 6,
            SourceLocChangeReason::ExceptionHit => 7,
            SourceLocChangeReason::StepOver => 8,
            SourceLocChangeReason::StepIn => 9,
            SourceLocChangeReason::StepOut => 10,
            SourceLocChangeReason::NonUserBreakpoint => 11,
            SourceLocChangeReason::DebugBreak => 12,
        }
    }

    /// Reasons that mean the target stopped at this location and the caller
    /// should be shown the file/line.
    pub fn is_stop_reason(self) -> bool {
        matches!(
            self,
            SourceLocChangeReason::BreakpointHit
                | SourceLocChangeReason::ExceptionHit
                | SourceLocChangeReason::StepOver
                | SourceLocChangeReason::StepIn
                | SourceLocChangeReason::StepOut
                | SourceLocChangeReason::DebugBreak
        )
    }
}

/// A breakpoint as the debugger describes it. Only `FilenameLine` is
/// actionable on the caller side; the other kinds are decoded so the stream
/// stays aligned but are never surfaced as caller breakpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: i32,
    pub enabled: bool,
    pub module_name: String,
    pub condition_expr: String,
    pub kind: BreakpointKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    FunctionName { name: String, overload_id: u32 },
    FilenameLine { filename: String, line_number: u32 },
    Address { address: u64 },
    Processor { expression: String, num_bytes: u8, access_kind: u8 },
}

impl BreakpointKind {
    pub fn tag(&self) -> u8 {
        match self {
            BreakpointKind::FunctionName { .. } => 1,
            BreakpointKind::FilenameLine { .. } => 2,
            BreakpointKind::Address { .. } => 3,
            BreakpointKind::Processor { .. } => 4,
        }
    }
}

/// A command issued to the debugger over the command channel.
///
/// Variants additionally carry the caller-side breakpoint id where the
/// response handler needs it; those fields never reach the wire. The whole
/// command is held in the in-flight queue until its response arrives,
/// because responses are not self-identifying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    BringDebuggerToForeground,
    SetBringToForegroundOnSuspended {
        enabled: bool,
    },
    ExitDebugger {
        debug_behavior: DebuggingTargetBehavior,
        session_behavior: ModifiedSessionBehavior,
    },
    GetIsSessionModified,
    GetSessionFilename,
    NewSession,
    OpenSession {
        path: String,
    },
    SaveSession,
    SaveAsSession {
        path: String,
    },
    GotoFileAtLine {
        filename: String,
        line_number: u32,
    },
    GetTargetState,
    StartDebugging,
    StopDebugging,
    RestartDebugging,
    StepIntoByLine,
    StepOverByLine,
    StepOut,
    ContinueExecution,
    RunToFileAtLine {
        filename: String,
        line_number: u32,
    },
    Break,
    GetBreakpoints,
    AddBreakpointAtFilenameLine {
        caller_id: String,
        filename: String,
        line_number: u32,
    },
    UpdateBreakpointLine {
        breakpoint_id: u32,
        line_number: u32,
    },
    EnableBreakpoint {
        breakpoint_id: u32,
        enabled: bool,
    },
    DeleteBreakpoint {
        caller_id: String,
        breakpoint_id: u32,
    },
    DeleteAllBreakpoints,
    GetBreakpoint {
        breakpoint_id: u32,
    },
}

impl Command {
    pub fn opcode(&self) -> u16 {
        match self {
            Command::BringDebuggerToForeground => 50,
            Command::SetBringToForegroundOnSuspended { .. } => 53,
            Command::ExitDebugger { .. } => 75,
            Command::GetIsSessionModified => 100,
            Command::GetSessionFilename => 101,
            Command::NewSession => 102,
            Command::OpenSession { .. } => 103,
            Command::SaveSession => 104,
            Command::SaveAsSession { .. } => 105,
            Command::GotoFileAtLine { .. } => 200,
            Command::GetTargetState => 300,
            Command::StartDebugging => 301,
            Command::StopDebugging => 302,
            Command::RestartDebugging => 303,
            Command::StepIntoByLine => 307,
            Command::StepOverByLine => 309,
            Command::StepOut => 311,
            Command::ContinueExecution => 312,
            Command::RunToFileAtLine { .. } => 313,
            Command::Break => 314,
            Command::GetBreakpoints => 600,
            Command::AddBreakpointAtFilenameLine { .. } => 604,
            Command::UpdateBreakpointLine { .. } => 608,
            Command::EnableBreakpoint { .. } => 609,
            Command::DeleteBreakpoint { .. } => 610,
            Command::DeleteAllBreakpoints => 611,
            Command::GetBreakpoint { .. } => 612,
        }
    }
}

/// Payload of an `Ok` response, for the opcodes whose schema defines one.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    BreakpointId(i32),
    FileId(u32),
    Breakpoints(Vec<Breakpoint>),
    Breakpoint(Breakpoint),
    TargetState(TargetState),
    SessionModified(bool),
    SessionFilename(String),
}

/// A fully decoded response: result code plus the payload the popped
/// command's schema defines (present only when the result is `Ok`).
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub result: ResultCode,
    pub payload: Option<ResponsePayload>,
}

/// Unsolicited notification delivered on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugEvent {
    ExitProcess,
    TargetStarted,
    TargetAttached,
    TargetDetached,
    TargetContinued,
    SourceLocationChanged {
        filename: String,
        line_number: u32,
        reason: SourceLocChangeReason,
    },
    BreakpointHit { breakpoint_id: i32 },
    BreakpointResolved { breakpoint_id: i32 },
    BreakpointAdded { breakpoint_id: i32 },
    BreakpointModified { breakpoint_id: i32 },
    BreakpointRemoved { breakpoint_id: i32 },
    OutputDebugString { message: String },
}

impl DebugEvent {
    pub fn tag(&self) -> u16 {
        match self {
            DebugEvent::ExitProcess => 100,
            DebugEvent::TargetStarted => 101,
            DebugEvent::TargetAttached => 102,
            DebugEvent::TargetDetached => 103,
            DebugEvent::TargetContinued => 104,
            DebugEvent::SourceLocationChanged { .. } => 200,
            DebugEvent::BreakpointHit { .. } => 600,
            DebugEvent::BreakpointResolved { .. } => 601,
            DebugEvent::BreakpointAdded { .. } => 602,
            DebugEvent::BreakpointModified { .. } => 603,
            DebugEvent::BreakpointRemoved { .. } => 604,
            DebugEvent::OutputDebugString { .. } => 800,
        }
    }

    /// The debugger-side breakpoint id this event refers to, if any.
    pub fn breakpoint_id(&self) -> Option<i32> {
        match self {
            DebugEvent::BreakpointHit { breakpoint_id }
            | DebugEvent::BreakpointResolved { breakpoint_id }
            | DebugEvent::BreakpointAdded { breakpoint_id }
            | DebugEvent::BreakpointModified { breakpoint_id }
            | DebugEvent::BreakpointRemoved { breakpoint_id } => Some(*breakpoint_id),
            _ => None,
        }
    }
}

/// Source location as tracked on the caller side of the identity map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub filename: String,
    pub line_number: u32,
}

impl SourceLocation {
    pub fn new(filename: impl Into<String>, line_number: u32) -> Self {
        SourceLocation {
            filename: filename.into(),
            line_number,
        }
    }
}
