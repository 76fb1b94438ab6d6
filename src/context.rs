use crate::cancel::{DecodeOptions, SpeculativeDiagnostics};
use crate::config::Config;
use crate::cursor::{BitCursor, sign_extend};
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
use crate::error::{DecodeError, DecodeResult, ReadError};
use crate::registry::{FormatId, Registry, Target};
use crate::tree::{Arena, BitRange, NodeId, NodeRef, Tree, Value};
use std::sync::Arc;
use tracing::trace;

/// Result of a top-level decode: the tree built so far and every
/// diagnostic recorded on the way. Present even when decoding stopped
/// early.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub tree: Tree,
    pub diagnostics: Diagnostics,
}

impl Decoded {
    pub fn root(&self) -> NodeRef<'_> {
        self.tree.root()
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.has_fatal()
    }

    /// Diagnostics attached directly to `node`.
    pub fn node_diagnostics(&self, node: NodeId) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |d| d.node == Some(node))
    }

    /// Diagnostics attached to `node` or anything below it.
    pub fn subtree_diagnostics(&self, node: NodeId) -> Vec<&Diagnostic> {
        let mut ids = self.tree.node(node).descendants();
        ids.sort_unstable();
        self.diagnostics
            .iter()
            .filter(|d| d.node.is_some_and(|n| ids.binary_search(&n).is_ok()))
            .collect()
    }
}

/// Outcome of embedding another format's decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Embedded {
    /// Decoded by the named format.
    Format(Arc<str>),
    /// No candidate matched; stored as raw bytes.
    Opaque,
}

/// State shared by every context of one top-level decode.
pub(crate) struct Session<'a> {
    registry: &'a Registry,
    options: &'a DecodeOptions,
    arena: Arena,
    diagnostics: Diagnostics,
    /// First fatal error of the current speculative window. Once set, every
    /// further read, scope and dependency returns it.
    fatal: Option<DecodeError>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(registry: &'a Registry, options: &'a DecodeOptions) -> Self {
        Self {
            registry,
            options,
            arena: Arena::default(),
            diagnostics: Diagnostics::new(),
            fatal: None,
        }
    }

    /// Run format `id` over `cursor` with a fresh root scope called `name`.
    ///
    /// Returns the sealed root (possibly partial), the routine's result and
    /// the cursor position the routine stopped at. A bounded run's root
    /// covers the whole cursor scope, an unbounded one only what was read.
    pub(crate) fn run_format(
        &mut self,
        id: FormatId,
        cursor: BitCursor<'a>,
        name: &str,
        config: Config,
        depth: usize,
        bounded: bool,
    ) -> (NodeId, DecodeResult<()>, u64) {
        let registry: &'a Registry = self.registry;
        let entry = registry.entry(id);
        let start = cursor.position();
        let root = self.arena.alloc(
            name,
            entry.descriptor.root_shape.empty(),
            BitRange::new(start, 0),
            Some(entry.name.clone()),
        );

        let mut ctx = DecodeContext {
            session: self,
            format: id,
            config,
            cursor,
            scope: root,
            depth,
            last: None,
        };
        let result = entry.descriptor.decoder.decode(&mut ctx);

        let stopped = ctx.cursor.position();
        let end = if bounded { cursor.end() } else { stopped };
        ctx.session
            .arena
            .seal(root, BitRange::new(start, end.saturating_sub(start)));
        (root, result, stopped)
    }

    pub(crate) fn finish(self, root: NodeId) -> Decoded {
        Decoded {
            tree: self.arena.into_tree(root),
            diagnostics: self.diagnostics,
        }
    }
}

/// Field-tree builder handed to decode routines.
///
/// Every field read through the context becomes a node with the exact
/// bit range it was read from, appended to the currently open compound or
/// sequence.
pub struct DecodeContext<'s, 'a> {
    session: &'s mut Session<'a>,
    format: FormatId,
    config: Config,
    cursor: BitCursor<'a>,
    scope: NodeId,
    depth: usize,
    last: Option<(NodeId, BitRange)>,
}

impl<'s, 'a> DecodeContext<'s, 'a> {
    /// Merged configuration for the format being decoded.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn format_name(&self) -> &str {
        &self.session.registry.entry(self.format).name
    }

    pub fn cursor(&self) -> &BitCursor<'a> {
        &self.cursor
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn remaining_bits(&self) -> u64 {
        self.cursor.remaining_bits()
    }

    /// True while the current scope has bits left.
    pub fn not_end(&self) -> bool {
        self.cursor.remaining_bits() > 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.cursor.is_byte_aligned()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn check_cancelled(&mut self) -> DecodeResult<()> {
        if self.session.options.is_cancelled() {
            let at = self.cursor.position();
            let name = self.format_name().to_string();
            return Err(self.fatal(DecodeError::Cancelled { at }, BitRange::new(at, 0), &name));
        }
        Ok(())
    }

    /// Fails with the stored error once a Fatal has been recorded.
    fn check_live(&mut self) -> DecodeResult<()> {
        if let Some(err) = &self.session.fatal {
            return Err(err.clone());
        }
        self.check_cancelled()
    }

    /// Depth of a scope or format opened below the current one.
    fn next_depth(&mut self, name: &str) -> DecodeResult<usize> {
        let depth = self.depth + 1;
        let limit = self.session.options.max_depth;
        if depth > limit {
            let at = self.cursor.position();
            return Err(self.fatal(DecodeError::DepthExceeded { limit }, BitRange::new(at, 0), name));
        }
        Ok(depth)
    }

    // ---------- diagnostics ----------

    fn record(
        &mut self,
        severity: Severity,
        kind: DiagnosticKind,
        message: String,
        range: BitRange,
        node: Option<NodeId>,
    ) {
        let format = Some(self.session.registry.entry(self.format).name.clone());
        self.session.diagnostics.push(Diagnostic {
            severity,
            kind,
            message,
            range,
            node,
            format,
        });
    }

    fn fatal(&mut self, err: DecodeError, range: BitRange, what: &str) -> DecodeError {
        let message = format!("{what}: {err}");
        self.record(Severity::Fatal, DiagnosticKind::of(&err), message, range, Some(self.scope));
        self.session.fatal.get_or_insert_with(|| err.clone());
        err
    }

    fn read_failed(&mut self, err: ReadError, what: &str) -> DecodeError {
        let range = match err {
            ReadError::EndOfStream { at, wanted, .. } => BitRange::new(at, wanted),
            ReadError::WidthOutOfRange { .. } => BitRange::new(self.cursor.position(), 0),
        };
        self.fatal(err.into(), range, what)
    }

    fn note(&mut self, kind: DiagnosticKind, message: String) {
        let (node, range) = match self.last {
            Some((id, range)) => (id, range),
            None => (self.scope, BitRange::new(self.cursor.position(), 0)),
        };
        self.record(Severity::Error, kind, message, range, Some(node));
    }

    /// Record a non-fatal failure against the most recent field when
    /// `condition` is false. Decoding continues either way.
    pub fn assert(&mut self, condition: bool, message: impl Into<String>) -> bool {
        if !condition {
            self.note(DiagnosticKind::AssertionFailed, message.into());
        }
        condition
    }

    /// Record a non-fatal error against the most recent field.
    pub fn error(&mut self, message: impl Into<String>) {
        self.note(DiagnosticKind::AssertionFailed, message.into());
    }

    /// Reject the input: records a Fatal diagnostic against the most recent
    /// field and returns the error for the routine to propagate. Inside a
    /// group this makes the next candidate run.
    pub fn fail(&mut self, message: impl Into<String>) -> DecodeError {
        let message = message.into();
        let (node, range) = match self.last {
            Some((id, range)) => (id, range),
            None => (self.scope, BitRange::new(self.cursor.position(), 0)),
        };
        self.record(
            Severity::Fatal,
            DiagnosticKind::AssertionFailed,
            message.clone(),
            range,
            Some(node),
        );
        let err = DecodeError::Invalid(message);
        self.session.fatal.get_or_insert_with(|| err.clone());
        err
    }

    /// Like [`DecodeContext::assert`] but fatal.
    pub fn require(&mut self, condition: bool, message: impl Into<String>) -> DecodeResult<()> {
        if condition {
            Ok(())
        } else {
            Err(self.fail(message))
        }
    }

    pub(crate) fn error_kind(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.note(kind, message.into());
    }

    // ---------- fields ----------

    fn push(&mut self, name: &str, value: Value, range: BitRange) -> NodeId {
        let id = self.session.arena.alloc(name, value, range, None);
        self.session.arena.append_child(self.scope, id);
        self.last = Some((id, range));
        id
    }

    fn read_field<T>(
        &mut self,
        name: &str,
        read: impl FnOnce(&mut BitCursor<'a>) -> Result<(Value, T), ReadError>,
    ) -> DecodeResult<T> {
        self.check_live()?;
        let saved = self.cursor;
        let start = saved.position();
        match read(&mut self.cursor) {
            Ok((value, out)) => {
                let range = BitRange::new(start, self.cursor.position().saturating_sub(start));
                self.push(name, value, range);
                Ok(out)
            }
            Err(e) => {
                self.cursor = saved;
                Err(self.read_failed(e, name))
            }
        }
    }

    /// Run `read` on the cursor and record its value as a field spanning
    /// the bits it consumed. On a failed read no node is added and the
    /// cursor is left at the field start.
    pub fn field<F>(&mut self, name: &str, read: F) -> DecodeResult<Value>
    where
        F: FnOnce(&mut BitCursor<'a>) -> Result<Value, ReadError>,
    {
        self.read_field(name, |c| read(c).map(|v| (v.clone(), v)))
    }

    pub fn field_u(&mut self, name: &str, bits: u32) -> DecodeResult<u64> {
        self.read_field(name, |c| {
            let value = c.read_bits(bits)?;
            Ok((Value::Unsigned { width: bits, value }, value))
        })
    }

    pub fn field_s(&mut self, name: &str, bits: u32) -> DecodeResult<i64> {
        self.read_field(name, |c| {
            let value = sign_extend(c.read_bits(bits)?, bits);
            Ok((Value::Signed { width: bits, value }, value))
        })
    }

    pub fn field_bool(&mut self, name: &str) -> DecodeResult<bool> {
        self.read_field(name, |c| {
            let b = c.read_bits(1)? == 1;
            Ok((Value::Bool(b), b))
        })
    }

    /// IEEE 754 float of 32 or 64 bits, big-endian.
    pub fn field_f(&mut self, name: &str, bits: u32) -> DecodeResult<f64> {
        self.read_field(name, |c| {
            let value = match bits {
                32 => f32::from_bits(c.peek_bits(32)? as u32) as f64,
                64 => f64::from_bits(c.peek_bits(64)?),
                width => return Err(ReadError::WidthOutOfRange { width }),
            };
            c.read_bits(bits)?;
            Ok((Value::Float { width: bits, value }, value))
        })
    }

    /// Unsigned little-endian integer of `n_bytes` bytes.
    pub fn field_u_le(&mut self, name: &str, n_bytes: usize) -> DecodeResult<u64> {
        self.read_field(name, |c| {
            let value = c.read_uint_le(n_bytes)?;
            Ok((
                Value::Unsigned {
                    width: n_bytes as u32 * 8,
                    value,
                },
                value,
            ))
        })
    }

    pub fn field_bytes(&mut self, name: &str, n_bytes: usize) -> DecodeResult<Vec<u8>> {
        self.read_field(name, |c| {
            let b = c.read_bytes(n_bytes)?;
            Ok((Value::Bytes(b.clone()), b))
        })
    }

    /// All whole bytes left in the current scope.
    pub fn field_rest_bytes(&mut self, name: &str) -> DecodeResult<Vec<u8>> {
        let n = (self.cursor.remaining_bits() / 8) as usize;
        self.field_bytes(name, n)
    }

    /// `bits` raw bits as a left-aligned byte string.
    pub fn field_raw_bits(&mut self, name: &str, bits: u64) -> DecodeResult<Vec<u8>> {
        self.read_field(name, |c| {
            let b = c.read_bits_to_bytes(bits)?;
            Ok((Value::Bytes(b.clone()), b))
        })
    }

    /// UTF-8 string of `n_bytes` bytes. Invalid sequences are replaced and
    /// reported as a non-fatal diagnostic.
    pub fn field_utf8(&mut self, name: &str, n_bytes: usize) -> DecodeResult<String> {
        let (s, valid) = self.read_field(name, |c| {
            let raw = c.read_bytes(n_bytes)?;
            let valid = std::str::from_utf8(&raw).is_ok();
            let s = String::from_utf8_lossy(&raw).into_owned();
            Ok((Value::Utf8(s.clone()), (s, valid)))
        })?;
        if !valid {
            self.error_kind(DiagnosticKind::InvalidUtf8, format!("{name}: invalid UTF-8"));
        }
        Ok(s)
    }

    /// Virtual field with a zero-length range at the current position.
    pub fn field_marker(&mut self, name: &str, value: Value) {
        if self.session.fatal.is_some() {
            return;
        }
        let at = self.cursor.position();
        self.push(name, value, BitRange::new(at, 0));
    }

    /// Advance without recording a field.
    pub fn skip_bits(&mut self, bits: u64) -> DecodeResult<()> {
        self.check_live()?;
        if let Err(e) = self.cursor.skip_bits(bits) {
            let name = self.format_name().to_string();
            return Err(self.read_failed(e, &name));
        }
        Ok(())
    }

    // ---------- scopes ----------

    fn open_scope<T>(
        &mut self,
        name: &str,
        empty: Value,
        body: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        self.check_live()?;
        let depth = self.next_depth(name)?;
        let start = self.cursor.position();

        let id = self.session.arena.alloc(name, empty, BitRange::new(start, 0), None);
        let parent = std::mem::replace(&mut self.scope, id);
        self.depth = depth;
        self.last = None;

        let result = body(self);

        self.depth -= 1;
        self.scope = parent;
        let range = BitRange::new(start, self.cursor.position().saturating_sub(start));
        self.session.arena.seal(id, range);
        self.session.arena.append_child(parent, id);
        self.last = Some((id, range));
        result
    }

    /// Decode `body` into a new named-field scope.
    pub fn compound<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        self.open_scope(name, Value::Compound(Vec::new()), body)
    }

    /// Decode `body` into a new sequence scope.
    pub fn sequence<T>(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        self.open_scope(name, Value::Sequence(Vec::new()), body)
    }

    // ---------- dependencies ----------

    /// Decode the next `bit_len` bits with dependency `dependency` and
    /// place its root here as field `name`. The cursor always moves past
    /// the whole slice.
    pub fn field_format_len(
        &mut self,
        name: &str,
        bit_len: u64,
        dependency: &str,
    ) -> DecodeResult<Embedded> {
        self.embed(name, dependency, Some(bit_len), None)
    }

    pub fn field_format_len_with_config(
        &mut self,
        name: &str,
        bit_len: u64,
        dependency: &str,
        config: &Config,
    ) -> DecodeResult<Embedded> {
        self.embed(name, dependency, Some(bit_len), Some(config))
    }

    /// Decode the rest of the current scope with `dependency`; the cursor
    /// moves past what the dependency consumed.
    pub fn field_format(&mut self, name: &str, dependency: &str) -> DecodeResult<Embedded> {
        self.embed(name, dependency, None, None)
    }

    pub fn field_format_with_config(
        &mut self,
        name: &str,
        dependency: &str,
        config: &Config,
    ) -> DecodeResult<Embedded> {
        self.embed(name, dependency, None, Some(config))
    }

    fn child_config(&self, id: FormatId, config: Option<&Config>) -> Config {
        let defaults = &self.session.registry.entry(id).descriptor.default_config;
        match config {
            Some(c) => defaults.merged_with(c),
            None => defaults.clone(),
        }
    }

    fn move_to(&mut self, pos: u64, name: &str) -> DecodeResult<()> {
        if let Err(e) = self.cursor.seek(pos) {
            return Err(self.read_failed(e, name));
        }
        Ok(())
    }

    fn embed(
        &mut self,
        name: &str,
        dependency: &str,
        bit_len: Option<u64>,
        config: Option<&Config>,
    ) -> DecodeResult<Embedded> {
        self.check_live()?;
        let registry: &'a Registry = self.session.registry;
        let Some(target) = registry.dependency(self.format, dependency) else {
            let at = self.cursor.position();
            let err = DecodeError::UnresolvedFormat(dependency.to_string());
            return Err(self.fatal(err, BitRange::new(at, 0), name));
        };
        let depth = self.next_depth(name)?;

        let sub = match bit_len {
            Some(len) => match self.cursor.limit(len) {
                Ok(c) => c,
                Err(e) => return Err(self.read_failed(e, name)),
            },
            None => self.cursor,
        };
        let bounded = bit_len.is_some();

        match target {
            Target::Direct(id) => {
                let child_config = self.child_config(*id, config);
                let (root, result, stopped) =
                    self.session
                        .run_format(*id, sub, name, child_config, depth, bounded);
                let range = self.splice(root);
                self.move_to(if bounded { sub.end() } else { stopped }, name)?;
                self.last = Some((root, range));
                result.map(|_| Embedded::Format(registry.entry(*id).name.clone()))
            }
            Target::Group(candidates) => {
                for &id in candidates {
                    let format = registry.entry(id).name.clone();
                    let node_mark = self.session.arena.len();
                    let diag_mark = self.session.diagnostics.len();
                    trace!(candidate = %format, field = name, "trying candidate");

                    let child_config = self.child_config(id, config);
                    let (root, result, stopped) =
                        self.session
                            .run_format(id, sub, name, child_config, depth, bounded);

                    if result.is_ok() && !self.session.diagnostics.has_fatal_since(diag_mark) {
                        let range = self.splice(root);
                        self.move_to(if bounded { sub.end() } else { stopped }, name)?;
                        self.last = Some((root, range));
                        return Ok(Embedded::Format(format));
                    }

                    let dropped = self.session.diagnostics.split_off(diag_mark);
                    self.session.arena.truncate(node_mark);
                    self.session.fatal = None;
                    trace!(candidate = %format, field = name, "candidate rejected");

                    if let Err(err @ DecodeError::Cancelled { .. }) = result {
                        let at = self.cursor.position();
                        return Err(self.fatal(err, BitRange::new(at, 0), name));
                    }
                    if self.session.options.speculative == SpeculativeDiagnostics::Retain {
                        for mut d in dropped {
                            d.severity = Severity::Error;
                            d.node = Some(self.scope);
                            self.session.diagnostics.push(d);
                        }
                    }
                }
                self.opaque(name, dependency, sub)
            }
        }
    }

    fn splice(&mut self, root: NodeId) -> BitRange {
        self.session.arena.append_child(self.scope, root);
        self.session.arena.range(root)
    }

    fn opaque(&mut self, name: &str, dependency: &str, sub: BitCursor<'a>) -> DecodeResult<Embedded> {
        let start = sub.position();
        let len = sub.remaining_bits();
        let mut raw = sub;
        let bytes = match raw.read_bits_to_bytes(len) {
            Ok(b) => b,
            Err(e) => return Err(self.read_failed(e, name)),
        };
        self.push(name, Value::Bytes(bytes), BitRange::new(start, len));
        self.error_kind(
            DiagnosticKind::NoMatchingFormat,
            format!("{name}: no format in {dependency:?} matched"),
        );
        self.move_to(start + len, name)?;
        Ok(Embedded::Opaque)
    }
}
