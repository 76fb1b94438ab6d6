//! Formats shipped with the crate.
//!
//! Both video codecs share the same access-unit shape: a run of NAL units
//! framed either with length prefixes (as stored in MP4 samples) or with
//! Annex B start codes (as in raw elementary streams).

pub mod avc;
pub mod hevc;

use crate::error::RegistryError;
use crate::registry::Registry;

/// Registry group every NAL unit header format joins.
pub const NAL_UNIT_GROUP: &str = "nal_unit";

/// Name of each record compound produced by the access-unit formats.
pub const NALU_RECORD: &str = "nalu";

/// Register every built-in format into `registry`. Does not resolve.
pub fn register_builtin(registry: &mut Registry) -> Result<(), RegistryError> {
    for descriptor in hevc::descriptors().into_iter().chain(avc::descriptors()) {
        registry.register(descriptor)?;
    }
    Ok(())
}

/// A resolved registry holding the built-in formats.
pub fn default_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    register_builtin(&mut registry)?;
    registry.resolve()?;
    Ok(registry)
}
