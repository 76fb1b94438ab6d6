/// Cooperative cancellation flag, checked by the engine at field, scope,
/// dependency and framing-record boundaries.
pub use tokio_util::sync::CancellationToken as CancelToken;

/// What happens to diagnostics recorded by a group candidate that lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeculativeDiagnostics {
    #[default]
    Discard,
    /// Keep them, downgraded to non-fatal errors.
    Retain,
}

/// Caller-side knobs for a top-level decode.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub cancel: Option<CancelToken>,
    pub speculative: SpeculativeDiagnostics,
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            cancel: None,
            speculative: SpeculativeDiagnostics::Discard,
            max_depth: 256,
        }
    }
}

impl DecodeOptions {
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn retain_speculative(mut self) -> Self {
        self.speculative = SpeculativeDiagnostics::Retain;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}
