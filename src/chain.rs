//! The on-chain storage collaborator.
//!
//! The analyzer needs two operations from the chain: fetch the latest
//! disassembled approval program (plus global state) for an application ID,
//! and fetch the historical program when the application has been deleted.
//! The RPC client that talks to a node is out of scope; this module defines
//! the seam and ships a directory-backed implementation used by the CLI and
//! the tests.

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One global-state entry of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum StateValue {
    Uint(u64),
    Bytes(String),
}

/// An application's global key/value storage.
pub type GlobalState = BTreeMap<String, StateValue>;

/// Access to on-chain application programs.
pub trait AppStore {
    /// The latest approval program for `app_id`, or `None` when the
    /// application no longer exists, together with its global state.
    /// `force` requests a re-fetch, bypassing any cache the store keeps.
    fn read_app_info(&self, app_id: u64, force: bool) -> Result<(Option<PathBuf>, GlobalState)>;

    /// The historical approval program for a (possibly deleted) `app_id`.
    fn get_app(&self, app_id: u64) -> Result<PathBuf>;
}

/// A store with no applications. Inlining degrades gracefully against it.
#[derive(Debug, Default)]
pub struct NullAppStore;

impl AppStore for NullAppStore {
    fn read_app_info(&self, _app_id: u64, _force: bool) -> Result<(Option<PathBuf>, GlobalState)> {
        Ok((None, GlobalState::new()))
    }

    fn get_app(&self, app_id: u64) -> Result<PathBuf> {
        bail!("no historical program for application {app_id}")
    }
}

/// A directory of pre-disassembled programs: `<root>/<id>.teal` holds the
/// approval program and `<root>/<id>.json`, when present, the global state.
#[derive(Debug, Clone)]
pub struct DirAppStore {
    root: PathBuf,
}

impl DirAppStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn program_path(&self, app_id: u64) -> PathBuf {
        self.root.join(format!("{app_id}.teal"))
    }

    fn state_path(&self, app_id: u64) -> PathBuf {
        self.root.join(format!("{app_id}.json"))
    }
}

impl AppStore for DirAppStore {
    fn read_app_info(&self, app_id: u64, _force: bool) -> Result<(Option<PathBuf>, GlobalState)> {
        let program = self.program_path(app_id);
        if !program.exists() {
            return Ok((None, GlobalState::new()));
        }
        let state = read_state(&self.state_path(app_id))?;
        Ok((Some(program), state))
    }

    fn get_app(&self, app_id: u64) -> Result<PathBuf> {
        let program = self.program_path(app_id);
        if !program.exists() {
            bail!("application {app_id} is not in the store");
        }
        Ok(program)
    }
}

fn read_state(path: &Path) -> Result<GlobalState> {
    if !path.exists() {
        return Ok(GlobalState::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading global state from {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("parsing global state from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_value_json_shape() {
        let state: GlobalState = serde_json::from_str(
            r#"{"counter": {"type": "uint", "value": 7}, "owner": {"type": "bytes", "value": "abc"}}"#,
        )
        .unwrap();
        assert_eq!(state["counter"], StateValue::Uint(7));
        assert_eq!(state["owner"], StateValue::Bytes("abc".to_string()));
    }

    #[test]
    fn dir_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42.teal"), "#pragma version 4\nint 1\nreturn\n").unwrap();
        std::fs::write(
            dir.path().join("42.json"),
            r#"{"admin": {"type": "bytes", "value": "A"}}"#,
        )
        .unwrap();

        let store = DirAppStore::new(dir.path());
        let (path, state) = store.read_app_info(42, false).unwrap();
        assert!(path.unwrap().ends_with("42.teal"));
        assert_eq!(state["admin"], StateValue::Bytes("A".to_string()));

        let (missing, state) = store.read_app_info(7, false).unwrap();
        assert!(missing.is_none());
        assert!(state.is_empty());
        assert!(store.get_app(7).is_err());
    }
}
