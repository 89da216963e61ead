use std::{io, path::Path};

use anyhow::{bail, Context, Result};
use vaultpatch_resource::{
    framework::parse_properties,
    state::{
        schema::v0::{ResourceState, State},
        StateHandle,
    },
};
use vaultpatch_resources_kv::{KvKeysOutProperties, KV_KEYS};

/// The current state, for commands that only look at it. A missing state
/// file is an empty state and is not created.
pub(crate) fn read_state(path: &Path) -> Result<State> {
    match StateHandle::open(path, false) {
        Ok(mut handle) => handle.read_state(),
        Err(e)
            if e.downcast_ref::<io::Error>().map(|e| e.kind())
                == Some(io::ErrorKind::NotFound) =>
        {
            Ok(State::default())
        }
        Err(e) => Err(e).with_context(|| format!("Could not open state file {}", path.display())),
    }
}

/// The state file, read once at the start of a command. Every change is
/// appended to the file before it becomes visible here.
pub(crate) struct StateSession {
    handle: StateHandle,
    state: State,
}

impl StateSession {
    pub(crate) fn open(path: &Path) -> Result<StateSession> {
        let mut handle = StateHandle::open_or_create(path)?;
        let state = handle.read_state()?;
        Ok(StateSession { handle, state })
    }

    pub(crate) fn resource(&self, name: &str) -> Option<&ResourceState> {
        self.state.resources.get(name)
    }

    /// The keys a tracked `kv_keys` resource is responsible for.
    pub(crate) fn kv_keys(&self, name: &str) -> Result<Option<KvKeysOutProperties>> {
        match self.resource(name) {
            None => Ok(None),
            Some(resource) => {
                if resource.type_ != KV_KEYS {
                    bail!(
                        "Resource {} has type {}, expected {}",
                        name,
                        resource.type_,
                        KV_KEYS
                    );
                }
                Ok(Some(parse_properties(
                    &resource.output_properties,
                    &resource.type_,
                )?))
            }
        }
    }

    pub(crate) fn record(&mut self, name: &str, resource: ResourceState, event: &str) -> Result<()> {
        let mut after = self.state.clone();
        after.resources.insert(name.to_string(), resource);
        self.transition(after, event)
    }

    pub(crate) fn forget(&mut self, name: &str, event: &str) -> Result<()> {
        let mut after = self.state.clone();
        after.resources.remove(name);
        self.transition(after, event)
    }

    fn transition(&mut self, after: State, event: &str) -> Result<()> {
        self.handle.commit(&self.state, &after, event)?;
        self.state = after;
        Ok(())
    }

    pub(crate) fn concurrent_write_detected(&self) -> bool {
        self.handle.concurrent_write_detected()
    }
}
