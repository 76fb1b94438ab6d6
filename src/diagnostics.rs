use crate::error::DecodeError;
use crate::tree::{BitRange, NodeId};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recorded and reported; decoding continued.
    Error,
    /// Decoding of the enclosing scopes stopped here.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    AssertionFailed,
    EndOfStream,
    NoMatchingFormat,
    Cancelled,
    UnresolvedFormat,
    DepthExceeded,
    InvalidWidth,
    InvalidUtf8,
    MissingStartCode,
}

impl DiagnosticKind {
    pub(crate) fn of(err: &DecodeError) -> Self {
        match err {
            DecodeError::EndOfStream { .. } => DiagnosticKind::EndOfStream,
            DecodeError::InvalidWidth { .. } => DiagnosticKind::InvalidWidth,
            DecodeError::Cancelled { .. } => DiagnosticKind::Cancelled,
            DecodeError::UnresolvedFormat(_) => DiagnosticKind::UnresolvedFormat,
            DecodeError::DepthExceeded { .. } => DiagnosticKind::DepthExceeded,
            DecodeError::Invalid(_) => DiagnosticKind::AssertionFailed,
        }
    }
}

/// One recorded decode issue.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Bits of the field in question.
    pub range: BitRange,
    /// Node the issue is attached to, when one exists in the final tree.
    pub node: Option<NodeId>,
    /// Format that was decoding when the issue was recorded.
    pub format: Option<Arc<str>>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{sev} at {}: {}", self.range, self.message)?;
        if let Some(fmt_name) = &self.format {
            write!(f, " [{fmt_name}]")?;
        }
        Ok(())
    }
}

/// Append-only log of diagnostics for one top-level decode, in decode
/// order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, d: Diagnostic) {
        self.entries.push(d);
    }

    pub fn has_fatal(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Fatal)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn fatal(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Fatal)
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.kind == kind)
    }

    pub(crate) fn has_fatal_since(&self, mark: usize) -> bool {
        self.entries[mark..]
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }

    /// Remove and return everything recorded after `mark`. Only group
    /// rollback uses this.
    pub(crate) fn split_off(&mut self, mark: usize) -> Vec<Diagnostic> {
        self.entries.split_off(mark)
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
