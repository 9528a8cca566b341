//! Typed projections over resolved records.
//!
//! Resolved record bytes decode into a generic [`Value`]; a projection
//! then checks the fields a consumer actually needs. Projection is
//! deliberately shallow: unknown fields are ignored, so records can
//! grow without breaking existing consumers.

use firehose_codec::Value;
use thiserror::Error;

/// A record did not fit the requested shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A required field was absent.
    #[error("missing field `{field}`")]
    MissingField {
        /// Name of the absent field.
        field: String,
    },

    /// A field was present but had the wrong type.
    #[error("field `{field}` has the wrong type")]
    WrongType {
        /// Name of the mistyped field.
        field: String,
    },
}

fn require_text(value: &Value, field: &'static str) -> Result<String, ProjectionError> {
    match value.get(field) {
        None => Err(ProjectionError::MissingField {
            field: field.to_string(),
        }),
        Some(v) => v
            .as_text()
            .map(str::to_string)
            .ok_or(ProjectionError::WrongType {
                field: field.to_string(),
            }),
    }
}

/// A post record: the text, when it was created, and its languages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPost {
    /// Creation timestamp, as the record carries it.
    pub created_at: String,
    /// Declared languages; empty when the record declares none.
    pub langs: Vec<String>,
    /// Post body.
    pub text: String,
}

impl TextPost {
    /// Project a decoded record into a post.
    ///
    /// `text` and `createdAt` are required; `langs` defaults to empty.
    /// Fields this projection does not know about are ignored.
    pub fn project(value: &Value) -> Result<Self, ProjectionError> {
        let text = require_text(value, "text")?;
        let created_at = require_text(value, "createdAt")?;

        let langs = match value.get("langs") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_text()
                        .map(str::to_string)
                        .ok_or(ProjectionError::WrongType {
                            field: "langs".to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ProjectionError::WrongType {
                    field: "langs".to_string(),
                })
            }
        };

        Ok(Self {
            created_at,
            langs,
            text,
        })
    }

    /// True if the post declares the given language.
    pub fn has_lang(&self, lang: &str) -> bool {
        self.langs.iter().any(|l| l == lang)
    }
}
