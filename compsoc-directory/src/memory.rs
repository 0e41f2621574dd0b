use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::connection::{Attributes, ConnectionFactory, DirectoryConnection};
use crate::entry::RawEntry;
use crate::error::DirectoryError;
use crate::filter::Filter;

#[derive(Debug, Default)]
struct State {
    // keyed by lowercased DN
    entries: BTreeMap<String, RawEntry>,
    unavailable: bool,
    opened: usize,
    closed: usize,
    interleaved: Option<RawEntry>,
}

/// A directory held in process memory.
///
/// Behaves like the production server where the client can observe it: subtree searches by
/// base DN, `entryAlreadyExists` on a duplicate DN and a unique constraint on `uidNumber`.
/// Cloning shares the same entries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entry without going through a connection.
    pub fn insert(&self, entry: RawEntry) {
        self.state
            .lock()
            .entries
            .insert(entry.dn.to_ascii_lowercase(), entry);
    }

    /// Refuse every new connection, as if the server were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn get(&self, dn: &str) -> Option<RawEntry> {
        self.state
            .lock()
            .entries
            .get(&dn.to_ascii_lowercase())
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn connections_opened(&self) -> usize {
        self.state.lock().opened
    }

    /// Connections opened but not yet closed.
    pub fn connections_open(&self) -> usize {
        let state = self.state.lock();
        state.opened - state.closed
    }

    /// Insert `entry` just before the next add is applied, simulating a concurrent writer.
    pub fn interleave_on_next_add(&self, entry: RawEntry) {
        self.state.lock().interleaved = Some(entry);
    }
}

#[async_trait]
impl ConnectionFactory for InMemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>, DirectoryError> {
        let mut state = self.state.lock();
        if state.unavailable {
            return Err(DirectoryError::Unavailable(
                "in-memory directory is offline".to_string(),
            ));
        }
        state.opened += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<State>>,
    closed: bool,
}

impl MemoryConnection {
    fn check_open(&self) -> Result<(), DirectoryError> {
        if self.closed {
            Err(DirectoryError::Unavailable("connection closed".to_string()))
        } else {
            Ok(())
        }
    }
}

fn under_base(dn: &str, base: &str) -> bool {
    let dn = dn.to_ascii_lowercase();
    let base = base.to_ascii_lowercase();
    dn == base || dn.ends_with(&format!(",{}", base))
}

fn project(entry: &RawEntry, attrs: &[&str]) -> RawEntry {
    if attrs.is_empty() || attrs.contains(&"*") {
        return entry.clone();
    }
    RawEntry::new(
        entry.dn.clone(),
        attrs
            .iter()
            .map(|attr| (attr.to_ascii_lowercase(), entry.values(attr).to_vec()))
            .filter(|(_, values)| !values.is_empty()),
    )
}

fn uid_number_taken(state: &State, entry: &RawEntry) -> Option<String> {
    let wanted = entry.first("uidNumber")?;
    state
        .entries
        .values()
        .any(|existing| existing.first("uidNumber") == Some(wanted))
        .then(|| wanted.to_string())
}

fn apply_add(state: &mut State, entry: RawEntry) -> Result<(), DirectoryError> {
    let key = entry.dn.to_ascii_lowercase();
    if state.entries.contains_key(&key) {
        return Err(DirectoryError::AlreadyExists(entry.dn));
    }
    if let Some(number) = uid_number_taken(state, &entry) {
        return Err(DirectoryError::Conflict(format!(
            "uidNumber {} is already in use",
            number
        )));
    }
    state.entries.insert(key, entry);
    Ok(())
}

#[async_trait]
impl DirectoryConnection for MemoryConnection {
    async fn search(
        &mut self,
        base: &str,
        filter: &Filter,
        attrs: &[&str],
    ) -> Result<Vec<RawEntry>, DirectoryError> {
        self.check_open()?;
        let state = self.state.lock();
        Ok(state
            .entries
            .values()
            .filter(|entry| under_base(&entry.dn, base) && filter.matches(entry))
            .map(|entry| project(entry, attrs))
            .collect())
    }

    async fn add(&mut self, dn: &str, attrs: Attributes) -> Result<(), DirectoryError> {
        self.check_open()?;
        let mut state = self.state.lock();
        if let Some(other) = state.interleaved.take() {
            apply_add(&mut state, other)?;
        }
        apply_add(&mut state, RawEntry::new(dn, attrs))
    }

    async fn modify(&mut self, dn: &str, replace: Attributes) -> Result<(), DirectoryError> {
        self.check_open()?;
        let mut state = self.state.lock();
        let entry = state
            .entries
            .get_mut(&dn.to_ascii_lowercase())
            .ok_or_else(|| DirectoryError::NotFound(dn.to_string()))?;
        for (name, values) in replace {
            entry.attrs.insert(name.to_ascii_lowercase(), values);
        }
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        self.check_open()?;
        self.state
            .lock()
            .entries
            .remove(&dn.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| DirectoryError::NotFound(dn.to_string()))
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        if !self.closed {
            self.closed = true;
            self.state.lock().closed += 1;
        }
        Ok(())
    }
}
