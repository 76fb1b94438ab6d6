//! H.265 / HEVC access units and NAL unit headers.

use super::{NAL_UNIT_GROUP, NALU_RECORD};
use crate::config::Config;
use crate::context::DecodeContext;
use crate::error::DecodeResult;
use crate::framing::Framing;
use crate::registry::{DependencyRef, FormatDescriptor};
use crate::tree::RootShape;

pub const HEVC_AU: &str = "hevc_au";
pub const HEVC_NALU: &str = "hevc_nalu";

pub fn descriptors() -> Vec<FormatDescriptor> {
    vec![
        FormatDescriptor::new(HEVC_AU, decode_access_unit)
            .description("H.265 access unit (length-prefixed or Annex B)")
            .root(RootShape::Sequence, "access_unit")
            .default_config(Config::new().with_record_length_size(4))
            .dependency(DependencyRef::group(HEVC_NALU, [HEVC_NALU])),
        FormatDescriptor::new(HEVC_NALU, decode_nal_unit)
            .description("H.265 NAL unit")
            .group(NAL_UNIT_GROUP),
    ]
}

fn decode_access_unit(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    Framing::from_config(d.config()).decode_records(d, NALU_RECORD, HEVC_NALU)
}

/// Two-byte NAL unit header (ITU-T H.265 7.3.1.2) followed by the raw
/// payload.
fn decode_nal_unit(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    let forbidden = d.field_u("forbidden_zero_bit", 1)?;
    d.assert(forbidden == 0, "forbidden_zero_bit must be 0");
    d.field_u("nal_unit_type", 6)?;
    d.field_u("nuh_layer_id", 6)?;
    let tid = d.field_u("nuh_temporal_id_plus1", 3)?;
    d.assert(tid != 0, "nuh_temporal_id_plus1 must not be 0");
    d.field_rest_bytes("data")?;
    Ok(())
}
