use crate::cancel::DecodeOptions;
use crate::config::Config;
use crate::context::{DecodeContext, Decoded, Session};
use crate::cursor::BitCursor;
use crate::error::{DecodeResult, RegistryError};
use crate::tree::RootShape;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Trait for format decode routines.
///
/// A decoder reads from the context's cursor and emits fields into the
/// context's open scope. Plain functions with the [`DecodeFn`] signature
/// implement it; stateful decoders can implement it directly.
pub trait FormatDecoder: Send + Sync {
    fn decode(&self, d: &mut DecodeContext<'_, '_>) -> DecodeResult<()>;
}

pub type DecodeFn = for<'s, 'a> fn(&mut DecodeContext<'s, 'a>) -> DecodeResult<()>;

impl FormatDecoder for DecodeFn {
    fn decode(&self, d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
        self(d)
    }
}

/// A declared dependency of a format on other formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyRef {
    /// One format, or every member of a registered group, by name.
    Format(String),
    /// Ordered alternatives tried in turn. Routines refer to the group by
    /// `alias`; each member names a format or a registered group.
    Group { alias: String, members: Vec<String> },
}

impl DependencyRef {
    pub fn format(name: impl Into<String>) -> Self {
        DependencyRef::Format(name.into())
    }

    pub fn group<I, S>(alias: impl Into<String>, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DependencyRef::Group {
            alias: alias.into(),
            members: members.into_iter().map(Into::into).collect(),
        }
    }

    /// Name decode routines use to invoke this dependency.
    pub fn alias(&self) -> &str {
        match self {
            DependencyRef::Format(name) => name,
            DependencyRef::Group { alias, .. } => alias,
        }
    }
}

/// Everything the registry knows about one format.
#[derive(Clone)]
pub struct FormatDescriptor {
    pub name: String,
    pub description: String,
    pub decoder: Arc<dyn FormatDecoder>,
    pub default_config: Config,
    pub dependencies: Vec<DependencyRef>,
    /// Registry groups this format is a member of.
    pub groups: Vec<String>,
    pub root_shape: RootShape,
    pub root_name: String,
}

impl FormatDescriptor {
    pub fn new(name: &str, decode: DecodeFn) -> Self {
        Self::with_decoder(name, Arc::new(decode))
    }

    pub fn with_decoder(name: &str, decoder: Arc<dyn FormatDecoder>) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            decoder,
            default_config: Config::default(),
            dependencies: Vec::new(),
            groups: Vec::new(),
            root_shape: RootShape::Compound,
            root_name: name.to_string(),
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn default_config(mut self, config: Config) -> Self {
        self.default_config = config;
        self
    }

    pub fn dependency(mut self, dep: DependencyRef) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.groups.push(group.to_string());
        self
    }

    pub fn root(mut self, shape: RootShape, name: &str) -> Self {
        self.root_shape = shape;
        self.root_name = name.to_string();
        self
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("default_config", &self.default_config)
            .field("dependencies", &self.dependencies)
            .field("groups", &self.groups)
            .field("root_shape", &self.root_shape)
            .field("root_name", &self.root_name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Direct(FormatId),
    Group(Vec<FormatId>),
}

#[derive(Debug, Clone)]
struct ResolvedDependency {
    alias: String,
    target: Target,
}

pub(crate) struct FormatEntry {
    pub(crate) descriptor: FormatDescriptor,
    pub(crate) name: Arc<str>,
    deps: Vec<ResolvedDependency>,
}

/// Registry of formats keyed by name.
///
/// Register every format, then call [`Registry::resolve`] once; after that
/// the registry is only read and can be shared between threads decoding
/// concurrently.
#[derive(Default)]
pub struct Registry {
    entries: Vec<FormatEntry>,
    by_name: HashMap<String, FormatId>,
    resolved: bool,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: FormatDescriptor) -> Result<FormatId, RegistryError> {
        if self.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateFormat(descriptor.name));
        }
        let id = FormatId(self.entries.len());
        self.by_name.insert(descriptor.name.clone(), id);
        self.entries.push(FormatEntry {
            name: Arc::from(descriptor.name.as_str()),
            descriptor,
            deps: Vec::new(),
        });
        self.resolved = false;
        Ok(id)
    }

    /// Fluent form of [`Registry::register`].
    pub fn with_format(mut self, descriptor: FormatDescriptor) -> Result<Self, RegistryError> {
        self.register(descriptor)?;
        Ok(self)
    }

    /// Check every declared dependency and precompute each format's
    /// dependency table. Fails listing every name that matches neither a
    /// format nor a group.
    pub fn resolve(&mut self) -> Result<(), RegistryError> {
        let mut missing: Vec<String> = Vec::new();
        let mut tables = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            let mut table = Vec::with_capacity(entry.descriptor.dependencies.len());
            for dep in &entry.descriptor.dependencies {
                let target = match dep {
                    DependencyRef::Format(name) => match self.lookup(name) {
                        Some(t) => t,
                        None => {
                            note_missing(&mut missing, name);
                            continue;
                        }
                    },
                    DependencyRef::Group { members, .. } => {
                        let mut ids = Vec::new();
                        for m in members {
                            match self.lookup(m) {
                                Some(Target::Direct(id)) => ids.push(id),
                                Some(Target::Group(g)) => ids.extend(g),
                                None => note_missing(&mut missing, m),
                            }
                        }
                        Target::Group(ids)
                    }
                };
                table.push(ResolvedDependency {
                    alias: dep.alias().to_string(),
                    target,
                });
            }
            tables.push(table);
        }

        if !missing.is_empty() {
            debug!(?missing, "registry resolution failed");
            self.resolved = false;
            return Err(RegistryError::UnresolvedDependency { missing });
        }

        for (entry, table) in self.entries.iter_mut().zip(tables) {
            entry.deps = table;
        }
        self.resolved = true;
        debug!(formats = self.entries.len(), "registry resolved");
        Ok(())
    }

    fn lookup(&self, name: &str) -> Option<Target> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(Target::Direct(id));
        }
        let members: Vec<FormatId> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.descriptor.groups.iter().any(|g| g == name))
            .map(|(i, _)| FormatId(i))
            .collect();
        (!members.is_empty()).then_some(Target::Group(members))
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn descriptor(&self, name: &str) -> Option<&FormatDescriptor> {
        self.by_name
            .get(name)
            .map(|id| &self.entries[id.0].descriptor)
    }

    /// Format names in registration order.
    pub fn format_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.descriptor.name.as_str())
    }

    pub(crate) fn entry(&self, id: FormatId) -> &FormatEntry {
        &self.entries[id.0]
    }

    pub(crate) fn dependency(&self, format: FormatId, alias: &str) -> Option<&Target> {
        self.entries[format.0]
            .deps
            .iter()
            .find(|d| d.alias == alias)
            .map(|d| &d.target)
    }

    /// Decode `bytes` as format `name` with default options.
    pub fn decode(&self, name: &str, bytes: &[u8], config: &Config) -> Result<Decoded, RegistryError> {
        self.decode_with(name, bytes, config, &DecodeOptions::default())
    }

    /// Decode `bytes` as format `name`.
    ///
    /// Malformed input never makes this fail: the result holds whatever
    /// tree was built plus the diagnostics. Errors are reserved for an
    /// unresolved registry or an unknown format name.
    pub fn decode_with(
        &self,
        name: &str,
        bytes: &[u8],
        config: &Config,
        options: &DecodeOptions,
    ) -> Result<Decoded, RegistryError> {
        if !self.resolved {
            return Err(RegistryError::NotResolved);
        }
        let id = *self
            .by_name
            .get(name)
            .ok_or_else(|| RegistryError::UnknownFormat(name.to_string()))?;
        let descriptor = &self.entries[id.0].descriptor;
        let config = descriptor.default_config.merged_with(config);

        debug!(format = name, bytes = bytes.len(), "decode start");
        let mut session = Session::new(self, options);
        let (root, result, _) = session.run_format(
            id,
            BitCursor::new(bytes),
            &descriptor.root_name,
            config,
            0,
            true,
        );
        if let Err(e) = &result {
            debug!(format = name, error = %e, "decode stopped early");
        }
        Ok(session.finish(root))
    }
}

fn note_missing(missing: &mut Vec<String>, name: &str) {
    if !missing.iter().any(|m| m == name) {
        missing.push(name.to_string());
    }
}
