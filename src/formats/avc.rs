//! H.264 / AVC access units and NAL unit headers.

use super::{NAL_UNIT_GROUP, NALU_RECORD};
use crate::config::Config;
use crate::context::DecodeContext;
use crate::error::DecodeResult;
use crate::framing::Framing;
use crate::registry::{DependencyRef, FormatDescriptor};
use crate::tree::RootShape;

pub const AVC_AU: &str = "avc_au";
pub const AVC_NALU: &str = "avc_nalu";

pub fn descriptors() -> Vec<FormatDescriptor> {
    vec![
        FormatDescriptor::new(AVC_AU, decode_access_unit)
            .description("H.264 access unit (length-prefixed or Annex B)")
            .root(RootShape::Sequence, "access_unit")
            .default_config(Config::new().with_record_length_size(4))
            .dependency(DependencyRef::group(AVC_NALU, [AVC_NALU])),
        FormatDescriptor::new(AVC_NALU, decode_nal_unit)
            .description("H.264 NAL unit")
            .group(NAL_UNIT_GROUP),
    ]
}

fn decode_access_unit(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    Framing::from_config(d.config()).decode_records(d, NALU_RECORD, AVC_NALU)
}

fn decode_nal_unit(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    let forbidden = d.field_u("forbidden_zero_bit", 1)?;
    d.assert(forbidden == 0, "forbidden_zero_bit must be 0");
    d.field_u("nal_ref_idc", 2)?;
    d.field_u("nal_unit_type", 5)?;
    d.field_rest_bytes("data")?;
    Ok(())
}
