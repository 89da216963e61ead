//! The vaultpatch state is a log of JSON patches that results in a state
//! document according to [`schema::v0::State`].
//!
//! This is where the tracked key sets of resources live between
//! invocations. Every lifecycle operation that changes the tracked state
//! appends one event holding the RFC 6902 patch from the old state document
//! to the new one, so the file doubles as an audit log of what was managed
//! when. Values are recorded as given; protect the state file like the
//! secrets it refers to.
//!
//! The file is append-only and guarded by an advisory write lock. Appends by
//! another process since we last read the file are detected and reported,
//! but not prevented.

pub mod schema;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::{de::IoRead, Deserializer, StreamDeserializer};
use std::{
    fs::{File, OpenOptions},
    io::{self, Seek as _, Write},
    path::Path,
    sync::{atomic::AtomicBool, Arc},
    time::Duration,
};

use self::schema::v0::State;

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StateEvent {
    pub index: u64,
    pub meta: StateEventMeta,
    pub patch: json_patch::Patch,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct StateEventMeta {
    pub time: String,
    #[serde(flatten)]
    pub other_fields: serde_json::Value,
}

pub struct StateEventStream<'a, R: io::Read> {
    iter: StreamDeserializer<'a, IoRead<R>, StateEvent>,
    /// Save the validated first event for processing by our caller
    /// (basically prepend it to the iterator)
    first_event: Option<StateEvent>,
}
impl<'a, R: io::Read> StateEventStream<'a, R> {
    pub fn open_from_reader(reader: R) -> Result<StateEventStream<'a, R>> {
        let deserializer = Deserializer::from_reader(reader);
        let mut iter = deserializer.into_iter();
        let first_event = match iter.next() {
            Some(Ok(ev @ StateEvent { index, .. })) => {
                if index != 0 {
                    bail!("Expected initial state event with index 0, got {}", index);
                }
                ev
            }
            Some(Err(e)) => bail!(
                "State file invalid: error parsing initial state event: {}",
                e
            ),
            None => bail!("State file invalid: no initial state event"),
        };
        Ok(StateEventStream {
            iter,
            first_event: Some(first_event),
        })
    }
}

impl<'a, R: io::Read> Iterator for StateEventStream<'a, R> {
    type Item = Result<StateEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.first_event.is_some() {
            self.first_event.take().map(Ok)
        } else {
            self.iter.next().map(|r| r.map_err(Into::into))
        }
    }
}

pub fn apply_state_event(state: &mut serde_json::Value, event: &StateEvent) -> Result<()> {
    json_patch::patch(state, event.patch.0.as_slice())
        .with_context(|| format!("Could not apply state event {}", event.index))
}

/// Apply a sequence of events; returns the number of events applied.
pub fn apply_state_events(
    state: &mut serde_json::Value,
    events: impl Iterator<Item = Result<StateEvent>>,
) -> Result<u64> {
    let mut count = 0;
    for event in events {
        apply_state_event(state, &event?)?;
        count += 1;
    }
    Ok(count)
}

/// Monitor a task which may take a long time, and log messages as needed.
/// After SILENT_INTERVAL: log activity
/// After LOG_INTERVAL: log activity and duration
pub struct WaitMonitor {
    done: Arc<AtomicBool>,
}
impl WaitMonitor {
    const SILENT_INTERVAL: Duration = Duration::from_millis(500);
    const LOG_INTERVAL: Duration = Duration::from_secs(5);

    pub fn new(activity: String) -> WaitMonitor {
        let done = Arc::new(AtomicBool::new(false));
        let r = WaitMonitor { done: done.clone() };
        std::thread::spawn(|| {
            WaitMonitor::run(done, activity);
        });
        r
    }
    fn run(done: Arc<AtomicBool>, activity: String) {
        let start = std::time::Instant::now();
        let mut next_log = start + Self::SILENT_INTERVAL;
        loop {
            if done.load(std::sync::atomic::Ordering::Relaxed) {
                break;
            }
            let now = std::time::Instant::now();
            std::thread::sleep(next_log.saturating_duration_since(now));
            if done.load(std::sync::atomic::Ordering::Relaxed) {
                break;
            }
            tracing::info!(
                elapsed_s = next_log.duration_since(start).as_secs(),
                "{}",
                activity
            );
            next_log += Self::LOG_INTERVAL;
        }
    }
    pub fn done(&self) {
        self.done.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}
impl Drop for WaitMonitor {
    fn drop(&mut self) {
        self.done()
    }
}

pub struct StateHandle {
    file: Arc<File>,
    locking: fd_lock::RwLock<Arc<File>>,
    expected_size: Option<u64>,
    next_index: u64,
    concurrent_write_detected: bool,
}
impl StateHandle {
    pub fn open<P: AsRef<Path>>(name: P, create_new: bool) -> Result<StateHandle> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(create_new)
            .open(name)?;
        let file = Arc::new(file);
        let locking = fd_lock::RwLock::new(file.clone());
        let mut handle = StateHandle {
            file,
            locking,
            expected_size: None,
            next_index: 0,
            concurrent_write_detected: false,
        };
        if create_new {
            handle.append(&[&Self::init_event()])?;
        }
        Ok(handle)
    }

    /// Open the state file, initializing it if it does not exist yet.
    pub fn open_or_create<P: AsRef<Path>>(name: P) -> Result<StateHandle> {
        let name = name.as_ref();
        match Self::open(name, false) {
            Ok(handle) => Ok(handle),
            Err(e)
                if e.downcast_ref::<io::Error>().map(|e| e.kind())
                    == Some(io::ErrorKind::NotFound) =>
            {
                tracing::info!(path = %name.display(), "Creating new state file");
                Self::open(name, true)
            }
            Err(e) => Err(e).with_context(|| format!("Could not open state file {}", name.display())),
        }
    }

    fn init_event() -> StateEvent {
        StateEvent {
            index: 0,
            meta: StateEventMeta {
                time: Utc::now().to_rfc3339(),
                other_fields: serde_json::json!({}),
            },
            patch: json_patch::Patch(vec![json_patch::PatchOperation::Add(
                json_patch::AddOperation {
                    path: json_patch::jsonptr::PointerBuf::root(),
                    value: serde_json::json!({
                        "_type": "vaultpatchState",
                        "resources": {},
                    }),
                },
            )]),
        }
    }

    fn lock_write(
        locking: &mut fd_lock::RwLock<Arc<File>>,
    ) -> Result<fd_lock::RwLockWriteGuard<'_, Arc<File>>> {
        let lock_wait_mon = WaitMonitor::new("Waiting for state file write lock".to_owned());
        let lock = locking.write()?;
        lock_wait_mon.done();
        Ok(lock)
    }

    /// Read all events from the start of the file and resolve them into the
    /// current state.
    pub fn read_state(&mut self) -> Result<State> {
        let lock_guard = self.locking.read()?;
        let mut file: &File = &self.file;
        file.seek(io::SeekFrom::Start(0))?;
        let stream = StateEventStream::open_from_reader(io::BufReader::new(file))?;
        let mut state = serde_json::json!({});
        let count = apply_state_events(&mut state, stream)?;
        let size = file.seek(io::SeekFrom::End(0))?;
        drop(lock_guard);

        self.next_index = count;
        self.expected_size = Some(size);
        serde_json::from_value(state).context("State file does not resolve to a valid state")
    }

    /// Record the transition from `before` to `after` as a single event.
    /// Nothing is written when the two are equal.
    pub fn commit(&mut self, before: &State, after: &State, event: &str) -> Result<()> {
        let patch = json_patch::diff(
            &serde_json::to_value(before)?,
            &serde_json::to_value(after)?,
        );
        if patch.0.is_empty() {
            return Ok(());
        }
        let event = StateEvent {
            index: self.next_index,
            meta: StateEventMeta {
                time: Utc::now().to_rfc3339(),
                other_fields: serde_json::json!({ "event": event }),
            },
            patch,
        };
        self.append(&[&event])
    }

    pub fn append(&mut self, event: &[&StateEvent]) -> Result<()> {
        let lock_guard = Self::lock_write(&mut self.locking)?;
        let mut file: &File = &self.file;
        let pos = file.seek(io::SeekFrom::End(0))?;
        match self.expected_size {
            None => self.expected_size = Some(pos),
            Some(expected_size) => {
                if pos != expected_size {
                    self.concurrent_write_detected = true;
                    tracing::warn!(
                        "Detected concurrent writing. Foreign bytes: [{}..{})",
                        expected_size,
                        pos
                    );
                    tracing::error!("CRITICAL: concurrent state manipulation may require manual intervention to avoid losing track of managed keys");
                }
            }
        }
        let mut writer = io::BufWriter::new(file);

        for event in event {
            // We prettify to make it more human readable. Potentially slightly
            // harder to parse by other tools, but worth the tradeoff.
            serde_json::to_writer_pretty(&mut writer, event)?;
            writer.write_all(b"\n")?;
            self.next_index = self.next_index.max(event.index + 1);
        }
        writer.flush()?;
        drop(writer);

        self.expected_size = Some(file.stream_position()?);

        drop(lock_guard);
        Ok(())
    }

    /// Whether an append found bytes written by someone else since our last
    /// read or write.
    pub fn concurrent_write_detected(&self) -> bool {
        self.concurrent_write_detected
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::schema::v0::ResourceState;
    use super::*;

    const BASIC_EXAMPLE: &str = r#"
    {
        "index": 0,
        "meta": {"time":"2019-03-04T07:40:00Z"},
        "patch": [
            {
                "op": "add",
                "value": { "_type": "vaultpatchState", "resources": {} },
                "path": ""
            }
        ]
    }
    {
        "index": 1,
        "meta": {"time":"2019-03-04T07:41:00Z"},
        "patch": [
            {
                "op": "add",
                "value": {
                    "type": "kv_keys",
                    "inputProperties": {
                        "mount": "app"
                    },
                    "outputProperties": { }
                },
                "path": "/resources/a"
            }
        ]
    }
"#;

    fn resource(mount: &str) -> ResourceState {
        ResourceState {
            type_: "kv_keys".to_string(),
            input_properties: serde_json::Map::from_iter(vec![(
                "mount".to_string(),
                json!(mount),
            )]),
            output_properties: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_open_state_stream() {
        let stream = StateEventStream::open_from_reader(BASIC_EXAMPLE.as_bytes()).unwrap();
        let events: Vec<_> = stream.collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().index, 0);
        assert_eq!(
            events[0].as_ref().unwrap().meta.time,
            "2019-03-04T07:40:00Z"
        );
    }

    #[test]
    fn test_resolve_state() {
        let stream = StateEventStream::open_from_reader(BASIC_EXAMPLE.as_bytes()).unwrap();
        let mut state = serde_json::json!({});
        let count = apply_state_events(&mut state, stream).unwrap();
        assert_eq!(count, 2);
        let state: State = serde_json::from_value(state).unwrap();
        assert_eq!(state.resources.get("a"), Some(&resource("app")));
    }

    #[test]
    fn test_open_state_stream_invalid_index() {
        let input = r#"{"index":1,"meta":{"time":"2019-06-04T07:40:00Z"},"patch":[]}"#;
        let stream = StateEventStream::open_from_reader(input.as_bytes());
        assert!(stream.is_err());
    }

    #[test]
    fn test_open_state_stream_invalid_json() {
        let input = r#"{"index":0,"meta":{"time":"2019-06-04T07:40:00Z"},"patch":[]"#;
        let stream = StateEventStream::open_from_reader(input.as_bytes());
        assert!(stream.is_err());
    }

    #[test]
    fn test_open_state_stream_empty() {
        let stream = StateEventStream::open_from_reader("".as_bytes());
        assert!(stream.is_err());
    }

    #[test]
    fn test_invalid_second_event() {
        let input = r#"{"index":0,"meta":{"time":"2019-06-04T07:40:00Z"},"patch":[]}
{"meta":{"time":"2019-06-04T07:40:00Z"}}"#;
        let stream = StateEventStream::open_from_reader(input.as_bytes()).unwrap();
        let vec: Vec<Result<StateEvent>> = stream.collect();
        assert!(vec[1].is_err());
    }

    #[test]
    fn test_new_state_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mut handle = StateHandle::open_or_create(&path).unwrap();
        assert_eq!(handle.read_state().unwrap(), State::default());
    }

    #[test]
    fn test_commit_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut handle = StateHandle::open_or_create(&path).unwrap();
        let before = handle.read_state().unwrap();
        let mut after = before.clone();
        after.resources.insert("a".to_string(), resource("one"));
        handle.commit(&before, &after, "create").unwrap();

        let mut after2 = after.clone();
        after2.resources.insert("a".to_string(), resource("two"));
        handle.commit(&after, &after2, "update").unwrap();
        // No-op commits leave no trace
        handle.commit(&after2, &after2, "refresh").unwrap();
        drop(handle);

        let contents = std::fs::read_to_string(&path).unwrap();
        let events: Vec<StateEvent> = StateEventStream::open_from_reader(contents.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(
            events.iter().map(|e| e.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(events[2].meta.other_fields, json!({ "event": "update" }));

        let mut handle = StateHandle::open_or_create(&path).unwrap();
        let state = handle.read_state().unwrap();
        assert_eq!(
            state.resources,
            BTreeMap::from([("a".to_string(), resource("two"))])
        );
        assert!(!handle.concurrent_write_detected());
    }

    #[test]
    fn test_foreign_append_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mut first = StateHandle::open_or_create(&path).unwrap();
        let mut second = StateHandle::open(&path, false).unwrap();
        let base = first.read_state().unwrap();
        second.read_state().unwrap();

        let mut with_a = base.clone();
        with_a.resources.insert("a".to_string(), resource("one"));
        second.commit(&base, &with_a, "create").unwrap();
        assert!(!second.concurrent_write_detected());

        let mut with_b = base.clone();
        with_b.resources.insert("b".to_string(), resource("two"));
        first.commit(&base, &with_b, "create").unwrap();
        assert!(first.concurrent_write_detected());
    }

    #[test]
    fn test_open_missing_without_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(StateHandle::open(dir.path().join("missing.json"), false).is_err());
    }
}
