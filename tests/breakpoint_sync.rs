//! Reconciliation-store tests: identity bijection, idempotence, and the
//! diff/sync performed on a full refresh.

use rdbg_driver::breakpoints::{BreakpointStore, SyncAction};
use rdbg_driver::protocol::{Breakpoint, BreakpointKind, Command};

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
fn bijection_after_successful_add() {
    let mut store = BreakpointStore::new();
    let command = store.add("A", "f.c", 10).expect("first add issues a command");
    assert!(matches!(
        command,
        Command::AddBreakpointAtFilenameLine { .. }
    ));
    assert!(store.bind("A", 5));

    assert_eq!(store.debugger_id_for("A"), Some(5));
    assert_eq!(store.caller_id_for(5), Some("A"));

    let delete = store.delete("A").expect("mapped id issues a delete");
    assert!(matches!(
        delete,
        Command::DeleteBreakpoint {
            breakpoint_id: 5,
            ..
        }
    ));
    // Both directions are gone immediately, before any response.
    assert_eq!(store.debugger_id_for("A"), None);
    assert_eq!(store.caller_id_for(5), None);
}

#[test]
fn add_is_idempotent_per_caller_id() {
    let mut store = BreakpointStore::new();
    assert!(store.add("A", "f.c", 10).is_some());
    // Second add for the same caller id sends nothing, even before the
    // response has arrived.
    assert!(store.add("A", "f.c", 10).is_none());
    assert!(store.bind("A", 5));
    assert!(store.add("A", "f.c", 10).is_none());
}

#[test]
fn failed_add_can_be_retried() {
    let mut store = BreakpointStore::new();
    assert!(store.add("A", "f.c", 10).is_some());
    store.abort_add("A");
    assert!(store.add("A", "f.c", 10).is_some());
}

#[test]
fn delete_of_unmapped_id_is_a_noop() {
    let mut store = BreakpointStore::new();
    assert!(store.delete("ghost").is_none());
}

#[test]
fn full_resync_converges_to_the_debugger_set() {
    let mut store = BreakpointStore::new();
    store.add("A", "f.c", 10).unwrap();
    store.bind("A", 1);
    store.add("B", "g.c", 20).unwrap();
    store.bind("B", 2);

    // The debugger still has f.c:10 (same id) and gained h.c:30; g.c:20 is
    // gone.
    let refreshed = vec![filename_line(1, "f.c", 10), filename_line(3, "h.c", 30)];
    let actions = store.apply_breakpoint_list(&refreshed);

    let created: Vec<_> = actions
        .iter()
        .filter_map(|a| match a {
            SyncAction::Created {
                location,
                breakpoint_id,
                ..
            } => Some((location.clone(), *breakpoint_id)),
            _ => None,
        })
        .collect();
    let removed: Vec<_> = actions
        .iter()
        .filter_map(|a| match a {
            SyncAction::Removed { caller_id } => Some(caller_id.clone()),
            _ => None,
        })
        .collect();

    assert_eq!(store.debugger_id_for("A"), Some(1), "prior binding kept");
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0.filename, "h.c");
    assert_eq!(created[0].0.line_number, 30);
    assert_eq!(created[0].1, 3);
    assert_eq!(removed, vec!["B".to_string()]);
    assert_eq!(store.caller_breakpoint_count(), 2);
}

#[test]
fn resync_binds_unbound_caller_breakpoints_by_location() {
    let mut store = BreakpointStore::new();
    // Add issued but no response yet: the caller breakpoint exists unbound.
    store.add("A", "f.c", 10).unwrap();

    let actions = store.apply_breakpoint_list(&[filename_line(5, "f.c", 10)]);
    assert_eq!(
        actions,
        vec![SyncAction::Bound {
            caller_id: "A".to_string(),
            breakpoint_id: 5,
        }]
    );
    assert_eq!(store.debugger_id_for("A"), Some(5));
}

#[test]
fn fetched_breakpoint_materializes_once() {
    let mut store = BreakpointStore::new();
    let bp = filename_line(7, "main.c", 42);

    let action = store.apply_breakpoint(&bp).expect("new id materializes");
    let SyncAction::Created {
        caller_id,
        location,
        breakpoint_id,
    } = action
    else {
        panic!("expected Created, got {action:?}");
    };
    assert_eq!(location.filename, "main.c");
    assert_eq!(location.line_number, 42);
    assert_eq!(breakpoint_id, 7);
    assert_eq!(store.caller_id_for(7), Some(caller_id.as_str()));

    // Applying the same definition again changes nothing.
    assert!(store.apply_breakpoint(&bp).is_none());
}

#[test]
fn fetched_breakpoint_binds_existing_caller_breakpoint_at_location() {
    let mut store = BreakpointStore::new();
    store.add("A", "main.c", 42).unwrap();

    let action = store.apply_breakpoint(&filename_line(7, "main.c", 42));
    assert_eq!(
        action,
        Some(SyncAction::Bound {
            caller_id: "A".to_string(),
            breakpoint_id: 7,
        })
    );
    // No duplicate caller breakpoint at the same file+line.
    assert_eq!(store.caller_breakpoint_count(), 1);
}

#[test]
fn non_source_kinds_are_never_surfaced() {
    let mut store = BreakpointStore::new();
    let address = Breakpoint {
        id: 11,
        enabled: true,
        module_name: String::new(),
        condition_expr: String::new(),
        kind: BreakpointKind::Address { address: 0xDEAD },
    };
    let function = Breakpoint {
        id: 12,
        enabled: true,
        module_name: "app.exe".to_string(),
        condition_expr: String::new(),
        kind: BreakpointKind::FunctionName {
            name: "update".to_string(),
            overload_id: 1,
        },
    };
    assert!(store.apply_breakpoint(&address).is_none());
    let actions = store.apply_breakpoint_list(&[address, function]);
    assert!(actions.is_empty());
    assert_eq!(store.caller_breakpoint_count(), 0);
}

#[test]
fn removal_event_for_unknown_id_is_a_noop() {
    let mut store = BreakpointStore::new();
    assert_eq!(store.remove_by_debugger_id(9), None);
}

#[test]
fn removal_event_drops_both_directions() {
    let mut store = BreakpointStore::new();
    store.add("A", "f.c", 10).unwrap();
    store.bind("A", 4);

    assert_eq!(store.remove_by_debugger_id(4), Some("A".to_string()));
    assert_eq!(store.debugger_id_for("A"), None);
    assert_eq!(store.caller_id_for(4), None);
}

#[test]
fn delete_all_clears_the_map() {
    let mut store = BreakpointStore::new();
    store.add("A", "f.c", 10).unwrap();
    store.bind("A", 1);
    store.add("B", "g.c", 20).unwrap();
    store.bind("B", 2);

    assert!(matches!(store.delete_all(), Command::DeleteAllBreakpoints));
    assert_eq!(store.caller_breakpoint_count(), 0);
    assert_eq!(store.debugger_id_for("A"), None);
    assert_eq!(store.caller_id_for(2), None);
}

#[test]
fn resolve_unknown_only_fetches_unmapped_ids() {
    let mut store = BreakpointStore::new();
    store.add("A", "f.c", 10).unwrap();
    store.bind("A", 4);

    assert!(store.resolve_unknown(4).is_none());
    assert!(matches!(
        store.resolve_unknown(9),
        Some(Command::GetBreakpoint { breakpoint_id: 9 })
    ));
}
