pub mod cancel;
pub mod config;
pub mod context;
pub mod cursor;
pub mod diagnostics;
pub mod dump;
pub mod error;
pub mod formats;
pub mod framing;
pub mod json_api;
pub mod registry;
pub mod tree;
pub mod util;

pub use cancel::{CancelToken, DecodeOptions, SpeculativeDiagnostics};
pub use config::Config;
pub use context::{DecodeContext, Decoded, Embedded};
pub use cursor::{BitCursor, sign_extend};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Severity};
pub use error::{DecodeError, DecodeResult, ReadError, RegistryError};
pub use formats::default_registry;
pub use framing::Framing;
pub use registry::{DecodeFn, DependencyRef, FormatDecoder, FormatDescriptor, FormatId, Registry};
pub use tree::{BitRange, NodeId, NodeRef, RootShape, Tree, Value};
