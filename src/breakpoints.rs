//! Breakpoint identity reconciliation.
//!
//! The debugger assigns its own breakpoint ids; the caller (the embedding
//! environment) has its own. This store keeps the bijection between the two
//! id spaces plus a mirror of the caller's breakpoint locations, and
//! implements the diff/sync performed on a full refresh. It does no I/O:
//! operations return the command to issue, and response/event application
//! returns the caller-visible mutations, so the whole layer is directly
//! unit-testable.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::protocol::{Breakpoint, BreakpointKind, Command, SourceLocation};

/// A caller-visible mutation produced by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// An existing caller breakpoint was bound to a debugger id.
    Bound {
        caller_id: String,
        breakpoint_id: i32,
    },
    /// The debugger reported a breakpoint the caller did not have; a new
    /// caller breakpoint was materialized for it.
    Created {
        caller_id: String,
        location: SourceLocation,
        breakpoint_id: i32,
    },
    /// A caller breakpoint no longer exists on the debugger side and must
    /// be removed from the caller's view.
    Removed { caller_id: String },
}

#[derive(Default)]
pub struct BreakpointStore {
    by_debugger: HashMap<i32, String>,
    by_caller: HashMap<String, i32>,
    /// Mirror of the caller's breakpoint list, keyed by caller id. Entries
    /// exist for pending adds too, which is what makes `add` idempotent
    /// before the response has arrived.
    caller_locations: HashMap<String, SourceLocation>,
}

impl BreakpointStore {
    pub fn new() -> Self {
        BreakpointStore::default()
    }

    /// Register a caller breakpoint. Returns the command to issue, or
    /// `None` if this caller id is already known (mapped or pending) — at
    /// most one add is ever sent per caller id.
    pub fn add(&mut self, caller_id: &str, filename: &str, line_number: u32) -> Option<Command> {
        if self.caller_locations.contains_key(caller_id) {
            return None;
        }
        self.caller_locations.insert(
            caller_id.to_string(),
            SourceLocation::new(filename, line_number),
        );
        Some(Command::AddBreakpointAtFilenameLine {
            caller_id: caller_id.to_string(),
            filename: filename.to_string(),
            line_number,
        })
    }

    /// Roll back a pending add whose command failed, so a later retry can
    /// send again.
    pub fn abort_add(&mut self, caller_id: &str) {
        if !self.by_caller.contains_key(caller_id) {
            self.caller_locations.remove(caller_id);
        }
    }

    /// Insert the bijection once both ids are known (successful add
    /// response). Returns false if either side is already mapped or the
    /// caller breakpoint has meanwhile disappeared.
    pub fn bind(&mut self, caller_id: &str, breakpoint_id: i32) -> bool {
        if self.by_debugger.contains_key(&breakpoint_id)
            || self.by_caller.contains_key(caller_id)
            || !self.caller_locations.contains_key(caller_id)
        {
            return false;
        }
        self.by_debugger
            .insert(breakpoint_id, caller_id.to_string());
        self.by_caller.insert(caller_id.to_string(), breakpoint_id);
        true
    }

    /// Remove a caller breakpoint. The mapping is dropped optimistically,
    /// before any response arrives, and the command carries the debugger id
    /// captured now. No-op when the caller id is unmapped.
    pub fn delete(&mut self, caller_id: &str) -> Option<Command> {
        let breakpoint_id = self.by_caller.remove(caller_id)?;
        self.by_debugger.remove(&breakpoint_id);
        self.caller_locations.remove(caller_id);
        Some(Command::DeleteBreakpoint {
            caller_id: caller_id.to_string(),
            breakpoint_id: breakpoint_id as u32,
        })
    }

    /// Clear the whole identity map locally and ask the debugger to do the
    /// same.
    pub fn delete_all(&mut self) -> Command {
        self.by_debugger.clear();
        self.by_caller.clear();
        self.caller_locations.clear();
        Command::DeleteAllBreakpoints
    }

    /// Start a full refresh.
    pub fn fetch_all(&self) -> Command {
        Command::GetBreakpoints
    }

    /// Lazily fetch the definition of a debugger id an event referred to,
    /// unless it is already mapped. Events carry only the id.
    pub fn resolve_unknown(&self, breakpoint_id: i32) -> Option<Command> {
        if self.by_debugger.contains_key(&breakpoint_id) {
            return None;
        }
        Some(Command::GetBreakpoint {
            breakpoint_id: breakpoint_id as u32,
        })
    }

    /// Reconcile against the debugger's full breakpoint list. For each
    /// returned breakpoint: already-mapped ids are kept as-is; a
    /// FilenameLine breakpoint matching an existing unbound caller
    /// breakpoint at the exact file+line is bound to it; any other
    /// FilenameLine breakpoint materializes a new caller breakpoint. After
    /// the pass, every caller breakpoint the refresh did not account for is
    /// removed: the debugger's set is authoritative.
    pub fn apply_breakpoint_list(&mut self, list: &[Breakpoint]) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for bp in list {
            if let Some(caller_id) = self.by_debugger.get(&bp.id) {
                seen.insert(caller_id.clone());
                continue;
            }
            if let Some(action) = self.materialize(bp) {
                match &action {
                    SyncAction::Bound { caller_id, .. }
                    | SyncAction::Created { caller_id, .. } => {
                        seen.insert(caller_id.clone());
                    }
                    SyncAction::Removed { .. } => {}
                }
                actions.push(action);
            }
        }
        let stale: Vec<String> = self
            .caller_locations
            .keys()
            .filter(|caller_id| !seen.contains(*caller_id))
            .cloned()
            .collect();
        for caller_id in stale {
            self.caller_locations.remove(&caller_id);
            if let Some(id) = self.by_caller.remove(&caller_id) {
                self.by_debugger.remove(&id);
            }
            actions.push(SyncAction::Removed { caller_id });
        }
        actions
    }

    /// Apply a single fetched breakpoint definition (GetBreakpoint
    /// response). Unlike the full refresh, this never removes anything.
    pub fn apply_breakpoint(&mut self, bp: &Breakpoint) -> Option<SyncAction> {
        if self.by_debugger.contains_key(&bp.id) {
            return None;
        }
        self.materialize(bp)
    }

    /// The debugger removed a breakpoint. Returns the caller id to drop
    /// from the caller's view, or `None` for an unmapped id (no-op).
    pub fn remove_by_debugger_id(&mut self, breakpoint_id: i32) -> Option<String> {
        let caller_id = self.by_debugger.remove(&breakpoint_id)?;
        self.by_caller.remove(&caller_id);
        self.caller_locations.remove(&caller_id);
        Some(caller_id)
    }

    pub fn debugger_id_for(&self, caller_id: &str) -> Option<i32> {
        self.by_caller.get(caller_id).copied()
    }

    pub fn caller_id_for(&self, breakpoint_id: i32) -> Option<&str> {
        self.by_debugger.get(&breakpoint_id).map(String::as_str)
    }

    pub fn location_for(&self, caller_id: &str) -> Option<&SourceLocation> {
        self.caller_locations.get(caller_id)
    }

    /// Caller breakpoints currently known (bound or pending).
    pub fn caller_breakpoint_count(&self) -> usize {
        self.caller_locations.len()
    }

    /// Bind `bp` to an existing unbound caller breakpoint at the same
    /// file+line, or materialize a new caller breakpoint for it. Kinds
    /// other than FilenameLine are not representable on the caller side and
    /// are dropped here, after decoding kept the stream aligned.
    fn materialize(&mut self, bp: &Breakpoint) -> Option<SyncAction> {
        let BreakpointKind::FilenameLine {
            filename,
            line_number,
        } = &bp.kind
        else {
            return None;
        };
        let location = SourceLocation::new(filename.clone(), *line_number);
        let existing = self
            .caller_locations
            .iter()
            .find(|(caller_id, loc)| **loc == location && !self.by_caller.contains_key(*caller_id))
            .map(|(caller_id, _)| caller_id.clone());
        match existing {
            Some(caller_id) => {
                self.by_caller.insert(caller_id.clone(), bp.id);
                self.by_debugger.insert(bp.id, caller_id.clone());
                Some(SyncAction::Bound {
                    caller_id,
                    breakpoint_id: bp.id,
                })
            }
            None => {
                let caller_id = Uuid::new_v4().to_string();
                self.caller_locations
                    .insert(caller_id.clone(), location.clone());
                self.by_caller.insert(caller_id.clone(), bp.id);
                self.by_debugger.insert(bp.id, caller_id.clone());
                Some(SyncAction::Created {
                    caller_id,
                    location,
                    breakpoint_id: bp.id,
                })
            }
        }
    }
}
