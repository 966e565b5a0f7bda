use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;

use crate::error::EcsError;
use crate::ticked::TickedSystem;

/// A deferred state change for a named group.
pub(crate) enum GroupCommand {
    Enable(String),
    Disable(String),
    Set(String, bool),
    Toggle(String),
}

/// Multi-producer handle for enqueuing group toggles.
///
/// Toggles submitted during frame `i` are drained by the dispatcher and
/// applied before frame `i + 1` begins; the current frame always finishes
/// with the group states it started with. Each system receives its own
/// clone through [`BuildContext::groups`](crate::BuildContext::groups),
/// so toggles can be enqueued from any worker thread.
#[derive(Clone)]
pub struct GroupHandle {
    tx: mpsc::Sender<GroupCommand>,
}

impl GroupHandle {
    pub(crate) fn new(tx: mpsc::Sender<GroupCommand>) -> Self {
        Self { tx }
    }

    /// Enables the group at the start of the next frame.
    pub fn enable_next_frame(&self, name: &str) {
        let _ = self.tx.send(GroupCommand::Enable(name.to_string()));
    }

    /// Disables the group at the start of the next frame.
    pub fn disable_next_frame(&self, name: &str) {
        let _ = self.tx.send(GroupCommand::Disable(name.to_string()));
    }

    /// Sets the group state at the start of the next frame.
    pub fn set_next_frame(&self, name: &str, state: bool) {
        let _ = self.tx.send(GroupCommand::Set(name.to_string(), state));
    }

    /// Inverts the group state at the start of the next frame.
    pub fn toggle_next_frame(&self, name: &str) {
        let _ = self.tx.send(GroupCommand::Toggle(name.to_string()));
    }
}

/// One named group: its current state and the systems it controls.
pub(crate) struct GroupInfo {
    pub name: String,
    pub state: AtomicBool,
    /// Indices into the dispatcher's system slots.
    pub members: Vec<usize>,
}

/// All groups created by the builder. Membership is fixed after build;
/// only the state bit changes between frames.
pub(crate) struct GroupTable {
    ids: HashMap<String, usize>,
    groups: Vec<GroupInfo>,
}

impl GroupTable {
    pub fn new(groups: Vec<GroupInfo>) -> Self {
        let ids = groups
            .iter()
            .enumerate()
            .map(|(index, group)| (group.name.clone(), index))
            .collect();
        Self { ids, groups }
    }

    /// Current state of the named group.
    pub fn state(&self, name: &str) -> Result<bool, EcsError> {
        let &id = self.ids.get(name).ok_or_else(|| EcsError::UnknownGroup {
            name: name.to_string(),
        })?;
        Ok(self.groups[id].state.load(Ordering::Acquire))
    }

    /// Applies one drained command: stores the new group state and
    /// overwrites every member system's enabled flag with it.
    ///
    /// An unknown group name is fatal in debug builds and logged and
    /// ignored in release builds.
    pub fn apply(&self, command: GroupCommand, slots: &[Mutex<TickedSystem>]) {
        let (name, state) = match command {
            GroupCommand::Enable(name) => (name, Some(true)),
            GroupCommand::Disable(name) => (name, Some(false)),
            GroupCommand::Set(name, state) => (name, Some(state)),
            GroupCommand::Toggle(name) => (name, None),
        };

        let Some(&id) = self.ids.get(&name) else {
            debug_assert!(false, "unknown group `{name}`");
            log::warn!("Ignoring toggle for unknown group `{name}`");
            return;
        };

        let group = &self.groups[id];
        let state = state.unwrap_or(!group.state.load(Ordering::Acquire));
        group.state.store(state, Ordering::Release);
        for &member in &group.members {
            slots[member].lock().unwrap().enabled = state;
        }
    }
}
