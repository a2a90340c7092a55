//! Host checks and the concurrent batch runner.
//!
//! A check is a predicate evaluated against the local machine (file presence,
//! file contents, process presence). Checks are registered in a process-wide
//! [`registry`], which also assigns each check type the dense byte id used on
//! the wire.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{self, Serialize, Serializer};
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub mod registry;

mod check_empty;
mod file_contains;
mod file_exists;
mod proc_running;

pub use check_empty::CheckEmpty;
pub use file_contains::FileContains;
pub use file_exists::FileExists;
pub use proc_running::ProcessRunning;

/// The type of a check, e.g. `file_contains`.
///
/// There is a fixed number of check types in a running cluster, so the wire
/// format sends the registered byte id instead of the tag string. Human
/// readable formats (the operator's JSON check files) keep the tag string.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CheckType(String);

pub const CHECK_FILE_EXISTS: &str = "file_exists";
pub const CHECK_FILE_CONTAINS: &str = "file_contains";
pub const CHECK_PROCESS_RUNNING: &str = "process_running";
pub const CHECK_EMPTY: &str = "check_empty";

impl CheckType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CheckType {
    fn from(tag: &str) -> Self {
        CheckType(tag.to_string())
    }
}

impl From<String> for CheckType {
    fn from(tag: String) -> Self {
        CheckType(tag)
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors produced when converting a [`CheckType`] to or from its wire form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CheckTypeError {
    #[error("unregistered check type")]
    UnknownType,
    #[error("check type id must be exactly one byte")]
    BadLength,
}

impl Serialize for CheckType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.0)
        } else {
            let Some(id) = registry::type_id(self) else {
                return Err(ser::Error::custom(CheckTypeError::UnknownType));
            };
            serializer.serialize_bytes(&[id])
        }
    }
}

impl<'de> Deserialize<'de> for CheckType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            String::deserialize(deserializer).map(CheckType)
        } else {
            deserializer.deserialize_bytes(IdVisitor)
        }
    }
}

struct IdVisitor;

impl<'de> Visitor<'de> for IdVisitor {
    type Value = CheckType;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a one-byte check type id")
    }

    fn visit_bytes<E>(self, bytes: &[u8]) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        if bytes.len() != 1 {
            return Err(E::custom(CheckTypeError::BadLength));
        }

        registry::type_for_id(bytes[0]).ok_or_else(|| E::custom(CheckTypeError::UnknownType))
    }

    fn visit_byte_buf<E>(self, bytes: Vec<u8>) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        self.visit_bytes(&bytes)
    }
}

/// A check failure, as reported to the operator.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0}")]
    Failed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckError {
    pub(crate) fn failed(msg: impl Into<String>) -> Self {
        CheckError::Failed(msg.into())
    }
}

/// Parameters of one check. Checks are submitted in batches, see [`ParamsGroup`].
///
/// No field is mandatory at this level; individual check kinds decide what
/// they require.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Params {
    /// Name of the check, unique within a batch by convention.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "check_type_is_empty")]
    pub check_type: CheckType,
    /// For file checks, a path to an arbitrary file. For process checks,
    /// a substring of the executable path (empty means ignored).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Value that must be present in the checked file or in the arguments
    /// of the checked process.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub check: String,
    /// Shell command run on this node when the check fails.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    /// Free-form text attached in transit. Has no effect in check files.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

fn check_type_is_empty(check_type: &CheckType) -> bool {
    check_type.0.is_empty()
}

/// A batch of checks, dispatched in parallel. Order carries no meaning.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ParamsGroup(pub Vec<Params>);

impl ParamsGroup {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Params> {
        self.0.iter()
    }

    /// Run all checks in the group concurrently and return the failures,
    /// keyed by check name. Checks with no registered handler are logged and
    /// skipped. A failing check with a non-empty `action` shells it out;
    /// the action's outcome is logged but not reflected in the result.
    ///
    /// Returns only after every check, and every action, has completed.
    pub async fn run(&self) -> HashMap<String, CheckError> {
        let mut tasks = JoinSet::new();

        for params in &self.0 {
            let Some(checker) = registry::lookup(&params.check_type) else {
                warn!(name = %params.name, check_type = %params.check_type, "unknown check type");
                continue;
            };

            let params = params.clone();
            tasks.spawn(async move {
                let result = checker.run(&params).await;
                if result.is_err() && !params.action.is_empty() {
                    run_action(&params).await;
                }
                result.err().map(|err| (params.name, err))
            });
        }

        let mut failures = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(Some((name, err))) = joined {
                failures.insert(name, err);
            }
        }
        failures
    }
}

impl From<Vec<Params>> for ParamsGroup {
    fn from(params: Vec<Params>) -> Self {
        ParamsGroup(params)
    }
}

impl IntoIterator for ParamsGroup {
    type Item = Params;
    type IntoIter = std::vec::IntoIter<Params>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ParamsGroup {
    type Item = &'a Params;
    type IntoIter = std::slice::Iter<'a, Params>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

async fn run_action(params: &Params) {
    match Command::new("sh").arg("-c").arg(&params.action).output().await {
        Ok(output) => {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);

            info!(
                name = %params.name,
                action = %params.action,
                status = %output.status,
                output = %String::from_utf8_lossy(&combined),
                "ran action for failed check"
            );
        }
        Err(err) => {
            warn!(
                name = %params.name,
                action = %params.action,
                error = %err,
                "failed to run action"
            );
        }
    }
}

/// A checker runs checks of a single type.
///
/// Implementations are expected to be deterministic and side-effect free on
/// the host, apart from consuming file handles.
#[async_trait::async_trait]
pub trait Checker: Send + Sync + 'static {
    /// The check type this checker handles.
    fn check_type(&self) -> CheckType;

    /// Evaluate the check against the local machine.
    async fn run(&self, params: &Params) -> Result<(), CheckError>;
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn empty_check(name: &str, check: &str) -> Params {
        Params {
            name: name.to_string(),
            check_type: CHECK_EMPTY.into(),
            check: check.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn group_collects_all_failures() {
        let cases = [
            (
                vec![
                    empty_check("a", "not_empty"),
                    empty_check("b", ""),
                    empty_check("c", "not_empty"),
                ],
                2,
            ),
            (vec![empty_check("a", "")], 0),
            (vec![empty_check("a", "not_empty")], 1),
        ];

        for (params, expected) in cases {
            let failures = ParamsGroup(params).run().await;
            assert_eq!(failures.len(), expected);
        }
    }

    #[tokio::test]
    async fn group_skips_unknown_check_types() {
        let group = ParamsGroup(vec![Params {
            name: "nope".to_string(),
            check_type: "no_such_check".into(),
            ..Default::default()
        }]);

        assert!(group.run().await.is_empty());
    }

    #[tokio::test]
    async fn action_fires_on_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("fired");

        let group = ParamsGroup(vec![Params {
            name: "failing".to_string(),
            check_type: CHECK_EMPTY.into(),
            check: "not_empty".to_string(),
            action: format!("touch {}", marker.display()),
            ..Default::default()
        }]);

        let failures = group.run().await;
        assert_eq!(failures.len(), 1);
        // run() only returns once the action completed.
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn action_skipped_on_success() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("fired");

        let group = ParamsGroup(vec![Params {
            name: "passing".to_string(),
            check_type: CHECK_EMPTY.into(),
            action: format!("touch {}", marker.display()),
            ..Default::default()
        }]);

        assert!(group.run().await.is_empty());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!marker.exists());
    }

    #[test]
    fn check_type_roundtrips_through_wire_format() {
        for tag in [CHECK_FILE_CONTAINS, CHECK_FILE_EXISTS, CHECK_PROCESS_RUNNING] {
            let check_type = CheckType::from(tag);
            let bytes = serde_cbor::to_vec(&check_type).unwrap();
            let decoded: CheckType = serde_cbor::from_slice(&bytes).unwrap();
            assert_eq!(decoded, check_type);
        }
    }

    #[test]
    fn unregistered_check_type_fails_to_encode() {
        let err = serde_cbor::to_vec(&CheckType::from("bogus")).unwrap_err();
        assert!(err.to_string().contains("unregistered check type"));
    }

    #[test]
    fn check_type_uses_tag_string_in_json() {
        let check_type = CheckType::from(CHECK_FILE_EXISTS);
        let json = serde_json::to_string(&check_type).unwrap();
        assert_eq!(json, "\"file_exists\"");

        let decoded: CheckType = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, check_type);
    }
}
