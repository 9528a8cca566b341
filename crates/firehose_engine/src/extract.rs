//! Operation extraction: pairing a commit's record operations with the
//! content blocks its archive carries.

use firehose_codec::CarReader;
use firehose_events::{CommitEvent, RepoOp};

/// Path-prefix filter selecting which operations to extract.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    prefixes: Vec<String>,
}

impl CollectionFilter {
    /// A filter that matches every operation.
    pub fn all() -> Self {
        Self::default()
    }

    /// A filter matching the given path prefixes.
    ///
    /// A prefix like `app.bsky.feed.post` matches every record in that
    /// collection; an empty list matches everything.
    pub fn prefixes(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether an operation path passes the filter.
    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

/// The content outcome for one extracted operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpContent<'a> {
    /// The referenced block was found in the archive.
    Resolved(&'a [u8]),
    /// The operation references content the archive does not carry
    /// (missing block, missing reference, or an unreadable archive).
    Unresolved,
    /// The operation carries no content by design (deletes).
    None,
}

/// One operation paired with its resolution outcome.
#[derive(Debug, Clone, Copy)]
pub struct ExtractedOp<'a> {
    /// The operation as carried by the commit.
    pub op: &'a RepoOp,
    /// Its content, when the action calls for any.
    pub content: OpContent<'a>,
}

impl ExtractedOp<'_> {
    /// Resolved record bytes, if any.
    pub fn record_bytes(&self) -> Option<&[u8]> {
        match self.content {
            OpContent::Resolved(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Extract the operations of a commit that pass `filter`, resolving
/// each content reference against the commit's block archive.
///
/// An oversized commit (`too_big`) yields no operations: its archive is
/// not trustworthy and callers recover such records out of band. A
/// missing or unreadable archive degrades each content-carrying
/// operation to [`OpContent::Unresolved`] rather than failing the
/// commit; deletes pass through regardless.
pub fn extract_operations<'a>(
    event: &'a CommitEvent,
    filter: &CollectionFilter,
) -> Vec<ExtractedOp<'a>> {
    if event.too_big {
        return Vec::new();
    }

    let archive = CarReader::new(&event.blocks).ok();

    event
        .ops
        .iter()
        .filter(|op| filter.matches(&op.path))
        .map(|op| {
            let content = if !op.action.has_content() {
                OpContent::None
            } else {
                match (&archive, &op.cid) {
                    (Some(reader), Some(cid)) => match reader.find(cid) {
                        Ok(Some(bytes)) => OpContent::Resolved(bytes),
                        _ => OpContent::Unresolved,
                    },
                    _ => OpContent::Unresolved,
                }
            };
            ExtractedOp { op, content }
        })
        .collect()
}
