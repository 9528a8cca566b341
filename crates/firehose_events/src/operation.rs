//! Per-record operations carried inside a commit.

use crate::error::{EventError, EventResult};
use firehose_codec::{Cid, Value};

/// The action a repo operation performs on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpAction {
    /// A new record was created.
    Create,
    /// An existing record was replaced.
    Update,
    /// A record was deleted.
    Delete,
}

impl OpAction {
    /// Parse an action from its wire label.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "create" => Some(OpAction::Create),
            "update" => Some(OpAction::Update),
            "delete" => Some(OpAction::Delete),
            _ => None,
        }
    }

    /// The wire label for this action.
    pub fn label(&self) -> &'static str {
        match self {
            OpAction::Create => "create",
            OpAction::Update => "update",
            OpAction::Delete => "delete",
        }
    }

    /// Whether this action carries record content.
    pub fn has_content(&self) -> bool {
        !matches!(self, OpAction::Delete)
    }
}

/// One create/update/delete action on a record path within a commit.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoOp {
    /// Record path in `collection/rkey` form.
    pub path: String,
    /// The action performed.
    pub action: OpAction,
    /// Content reference into the commit's block archive.
    ///
    /// Absent for deletes.
    pub cid: Option<Cid>,
}

impl RepoOp {
    /// Decode one operation from its wire map.
    pub fn from_value(value: &Value) -> EventResult<Self> {
        let action_label = value
            .get("action")
            .and_then(Value::as_text)
            .ok_or_else(|| EventError::payload_decode("#commit", "op missing action"))?;
        let action = OpAction::from_label(action_label).ok_or_else(|| {
            EventError::payload_decode("#commit", format!("unknown op action {action_label:?}"))
        })?;

        let path = value
            .get("path")
            .and_then(Value::as_text)
            .ok_or_else(|| EventError::payload_decode("#commit", "op missing path"))?
            .to_string();

        let cid = value.get("cid").and_then(Value::as_link).cloned();

        Ok(Self { path, action, cid })
    }

    /// Encode this operation back to its wire map (fixture support).
    pub fn to_value(&self) -> Value {
        Value::map(vec![
            ("action", Value::from(self.action.label())),
            ("path", Value::from(self.path.as_str())),
            (
                "cid",
                self.cid.clone().map_or(Value::Null, Value::Link),
            ),
        ])
    }

    /// The collection segment of the path (everything before the first `/`).
    pub fn collection(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }

    /// The record key segment of the path, if present.
    pub fn rkey(&self) -> Option<&str> {
        self.path.split_once('/').map(|(_, rkey)| rkey)
    }
}
