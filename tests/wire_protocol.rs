//! Codec and command-channel tests: byte layouts, incremental decoding,
//! and FIFO response correlation under arbitrary chunking.

use rdbg_driver::channel::{ChannelError, CommandChannel, EventDecoder};
use rdbg_driver::protocol::{
    Breakpoint, BreakpointKind, Command, DebugEvent, Response, ResponsePayload, ResultCode,
    SourceLocChangeReason, TargetState,
};
use rdbg_driver::wire::{self, WireError};
use tokio::io::AsyncReadExt;

fn ok_response(payload: ResponsePayload) -> Response {
    Response {
        result: ResultCode::Ok,
        payload: Some(payload),
    }
}

fn filename_line(id: i32, filename: &str, line_number: u32) -> Breakpoint {
    Breakpoint {
        id,
        enabled: true,
        module_name: String::new(),
        condition_expr: String::new(),
        kind: BreakpointKind::FilenameLine {
            filename: filename.to_string(),
            line_number,
        },
    }
}

#[test]
fn add_breakpoint_byte_layout() {
    let command = Command::AddBreakpointAtFilenameLine {
        caller_id: "vs-1".to_string(),
        filename: "main.c".to_string(),
        line_number: 42,
    };
    let bytes = wire::encode_command(&command).unwrap();
    let mut expected = vec![0x5C, 0x02]; // opcode 604
    expected.extend_from_slice(&[0x06, 0x00]); // string length
    expected.extend_from_slice(b"main.c");
    expected.extend_from_slice(&[0x2A, 0x00, 0x00, 0x00]); // line 42
    expected.extend_from_slice(&[0x00, 0x00]); // reserved
    assert_eq!(&bytes[..], &expected[..]);
}

#[test]
fn exit_debugger_byte_layout() {
    use rdbg_driver::protocol::{DebuggingTargetBehavior, ModifiedSessionBehavior};
    let command = Command::ExitDebugger {
        debug_behavior: DebuggingTargetBehavior::IfDebuggingTargetStopDebugging,
        session_behavior: ModifiedSessionBehavior::IfSessionIsModifiedSaveAndContinue,
    };
    let bytes = wire::encode_command(&command).unwrap();
    assert_eq!(&bytes[..], &[0x4B, 0x00, 0x01, 0x00]);
}

#[test]
fn enable_breakpoint_inverts_flag_on_the_wire() {
    let command = Command::EnableBreakpoint {
        breakpoint_id: 9,
        enabled: true,
    };
    let bytes = wire::encode_command(&command).unwrap();
    // u16 opcode 609, u32 id, then the negated enable flag.
    assert_eq!(&bytes[..], &[0x61, 0x02, 0x09, 0x00, 0x00, 0x00, 0x00]);
}

#[test]
fn response_round_trips_for_payload_bearing_opcodes() {
    let cases: Vec<(Command, ResponsePayload)> = vec![
        (
            Command::AddBreakpointAtFilenameLine {
                caller_id: "a".to_string(),
                filename: "f.c".to_string(),
                line_number: 0,
            },
            ResponsePayload::BreakpointId(i32::MAX),
        ),
        (
            Command::DeleteBreakpoint {
                caller_id: "a".to_string(),
                breakpoint_id: 1,
            },
            ResponsePayload::BreakpointId(1),
        ),
        (
            Command::GotoFileAtLine {
                filename: "f.c".to_string(),
                line_number: 10,
            },
            ResponsePayload::FileId(u32::MAX),
        ),
        (
            Command::GetTargetState,
            ResponsePayload::TargetState(TargetState::Suspended),
        ),
        (
            Command::GetIsSessionModified,
            ResponsePayload::SessionModified(true),
        ),
        (
            Command::GetSessionFilename,
            ResponsePayload::SessionFilename(String::new()),
        ),
        (
            Command::GetBreakpoint { breakpoint_id: 7 },
            ResponsePayload::Breakpoint(Breakpoint {
                id: 7,
                enabled: false,
                module_name: "app.exe".to_string(),
                condition_expr: "x > 3".to_string(),
                kind: BreakpointKind::Processor {
                    expression: "esp".to_string(),
                    num_bytes: 4,
                    access_kind: 2,
                },
            }),
        ),
        (
            Command::GetBreakpoints,
            ResponsePayload::Breakpoints(vec![
                filename_line(1, "main.c", 1),
                Breakpoint {
                    id: 2,
                    enabled: true,
                    module_name: String::new(),
                    condition_expr: String::new(),
                    kind: BreakpointKind::Address {
                        address: u64::MAX,
                    },
                },
                Breakpoint {
                    id: 3,
                    enabled: true,
                    module_name: String::new(),
                    condition_expr: String::new(),
                    kind: BreakpointKind::FunctionName {
                        name: "update".to_string(),
                        overload_id: 0,
                    },
                },
            ]),
        ),
    ];
    for (command, payload) in cases {
        let response = ok_response(payload);
        let bytes = wire::encode_response(&response).unwrap();
        let (decoded, consumed) = wire::decode_response(&command, &bytes)
            .unwrap()
            .expect("complete response");
        assert_eq!(consumed, bytes.len(), "opcode {}", command.opcode());
        assert_eq!(decoded, response, "opcode {}", command.opcode());
    }
}

#[test]
fn event_round_trips() {
    let events = vec![
        DebugEvent::ExitProcess,
        DebugEvent::TargetStarted,
        DebugEvent::TargetContinued,
        DebugEvent::SourceLocationChanged {
            filename: "src/lib.rs".to_string(),
            line_number: u32::MAX,
            reason: SourceLocChangeReason::StepOver,
        },
        DebugEvent::BreakpointHit { breakpoint_id: -1 },
        DebugEvent::BreakpointRemoved { breakpoint_id: 9 },
        DebugEvent::OutputDebugString {
            message: "hello".to_string(),
        },
    ];
    for event in events {
        let bytes = wire::encode_event(&event).unwrap();
        let (decoded, consumed) = wire::decode_event(&bytes).unwrap().expect("complete event");
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, event);
    }
}

#[test]
fn failed_result_terminates_the_response() {
    // A non-Ok result code carries no payload even for an opcode whose
    // schema defines one.
    let command = Command::AddBreakpointAtFilenameLine {
        caller_id: "a".to_string(),
        filename: "f.c".to_string(),
        line_number: 1,
    };
    let bytes = [0x08, 0x00]; // InvalidId
    let (response, consumed) = wire::decode_response(&command, &bytes).unwrap().unwrap();
    assert_eq!(consumed, 2);
    assert_eq!(response.result, ResultCode::InvalidId);
    assert!(response.payload.is_none());
}

#[test]
fn decode_is_incremental_at_every_split_point() {
    let command = Command::GetBreakpoint { breakpoint_id: 7 };
    let response = ok_response(ResponsePayload::Breakpoint(filename_line(7, "main.c", 42)));
    let bytes = wire::encode_response(&response).unwrap();
    for cut in 0..bytes.len() {
        assert!(
            wire::decode_response(&command, &bytes[..cut]).unwrap().is_none(),
            "prefix of {cut} bytes decoded as complete"
        );
    }
    let (decoded, consumed) = wire::decode_response(&command, &bytes).unwrap().unwrap();
    assert_eq!(consumed, bytes.len());
    assert_eq!(decoded, response);
}

#[test]
fn unknown_breakpoint_kind_is_fatal() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u16.to_le_bytes()); // Ok
    bytes.extend_from_slice(&7i32.to_le_bytes());
    bytes.push(1); // enabled
    bytes.extend_from_slice(&0u16.to_le_bytes()); // module
    bytes.extend_from_slice(&0u16.to_le_bytes()); // condition
    bytes.push(9); // no such kind
    let command = Command::GetBreakpoint { breakpoint_id: 7 };
    assert_eq!(
        wire::decode_response(&command, &bytes),
        Err(WireError::UnknownBreakpointKind(9))
    );
}

#[test]
fn unknown_event_tag_is_fatal() {
    let bytes = 999u16.to_le_bytes();
    assert_eq!(wire::decode_event(&bytes), Err(WireError::UnknownEventTag(999)));
}

#[tokio::test]
async fn responses_correlate_fifo_across_chunked_deliveries() {
    let (client, mut server) = tokio::io::duplex(4096);
    let mut channel = CommandChannel::new(client);

    channel
        .send(Command::AddBreakpointAtFilenameLine {
            caller_id: "one".to_string(),
            filename: "f.c".to_string(),
            line_number: 10,
        })
        .await
        .unwrap();
    channel
        .send(Command::GotoFileAtLine {
            filename: "g.c".to_string(),
            line_number: 20,
        })
        .await
        .unwrap();
    channel.send(Command::StepOut).await.unwrap();
    assert_eq!(channel.in_flight(), 3);

    // Drain what the channel wrote so the duplex buffer never blocks.
    let mut written = vec![0u8; 4096];
    let _ = server.read(&mut written).await.unwrap();

    let mut wire_bytes = Vec::new();
    wire_bytes
        .extend_from_slice(&wire::encode_response(&ok_response(ResponsePayload::BreakpointId(5))).unwrap());
    wire_bytes
        .extend_from_slice(&wire::encode_response(&ok_response(ResponsePayload::FileId(3))).unwrap());
    wire_bytes.extend_from_slice(&wire::encode_response(&Response {
        result: ResultCode::Ok,
        payload: None,
    })
    .unwrap());

    // Deliver the three concatenated responses in awkward pieces.
    let mut completed = Vec::new();
    for chunk in wire_bytes.chunks(3) {
        completed.extend(channel.on_data(chunk).unwrap());
    }

    assert_eq!(completed.len(), 3);
    assert_eq!(channel.in_flight(), 0);
    assert!(matches!(
        completed[0].0,
        Command::AddBreakpointAtFilenameLine { .. }
    ));
    assert_eq!(
        completed[0].1.payload,
        Some(ResponsePayload::BreakpointId(5))
    );
    assert!(matches!(completed[1].0, Command::GotoFileAtLine { .. }));
    assert_eq!(completed[1].1.payload, Some(ResponsePayload::FileId(3)));
    assert!(matches!(completed[2].0, Command::StepOut));
    assert_eq!(completed[2].1.payload, None);
}

#[tokio::test]
async fn response_with_empty_queue_is_a_hard_error() {
    let (client, _server) = tokio::io::duplex(64);
    let mut channel = CommandChannel::new(client);
    let err = channel.on_data(&[0x01, 0x00]).unwrap_err();
    assert!(matches!(err, ChannelError::UnsolicitedResponse));
}

#[test]
fn event_decoder_handles_concatenation_and_splits() {
    let mut decoder = EventDecoder::new();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&wire::encode_event(&DebugEvent::TargetStarted).unwrap());
    bytes.extend_from_slice(
        &wire::encode_event(&DebugEvent::SourceLocationChanged {
            filename: "main.c".to_string(),
            line_number: 42,
            reason: SourceLocChangeReason::BreakpointHit,
        })
        .unwrap(),
    );
    bytes.extend_from_slice(
        &wire::encode_event(&DebugEvent::BreakpointHit { breakpoint_id: 4 }).unwrap(),
    );

    let mut events = Vec::new();
    for chunk in bytes.chunks(5) {
        events.extend(decoder.on_data(chunk).unwrap());
    }
    assert_eq!(events.len(), 3);
    assert_eq!(events[0], DebugEvent::TargetStarted);
    assert!(matches!(events[1], DebugEvent::SourceLocationChanged { .. }));
    assert_eq!(events[2], DebugEvent::BreakpointHit { breakpoint_id: 4 });
}
