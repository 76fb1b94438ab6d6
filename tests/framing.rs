use bitscope::{
    BitRange, Config, DecodeContext, DecodeResult, DependencyRef, DiagnosticKind, FormatDescriptor,
    Framing, Registry, Severity, Value, default_registry,
};

fn stream(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    Framing::from_config(d.config()).decode_records(d, "nalu", "body")
}

fn marker(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_u("marker", 8)?;
    Ok(())
}

fn payload(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_rest_bytes("payload")?;
    Ok(())
}

/// Four bits of lead-in, then start codes from the unaligned position.
fn offset_stream(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_u("lead", 4)?;
    Framing::from_config(d.config()).decode_records(d, "nalu", "body")
}

/// 28 bits of `stream` followed by a 4-bit tail.
fn odd(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_format_len("records", 28, "stream")?;
    d.field_u("tail", 4)?;
    Ok(())
}

/// `stream` framing records whose bodies are decoded by `body`.
fn registry(body: &str) -> Registry {
    let mut reg = Registry::new();
    reg.register(FormatDescriptor::new("stream", stream).dependency(DependencyRef::group("body", [body])))
        .unwrap();
    reg.register(
        FormatDescriptor::new("offset_stream", offset_stream).dependency(DependencyRef::group("body", [body])),
    )
    .unwrap();
    reg.register(FormatDescriptor::new("odd", odd).dependency(DependencyRef::format("stream")))
        .unwrap();
    reg.register(FormatDescriptor::new("marker", marker)).unwrap();
    reg.register(FormatDescriptor::new("payload", payload)).unwrap();
    reg.resolve().unwrap();
    reg
}

#[test]
fn start_codes_split_records() {
    let reg = registry("marker");
    let data = [0x00, 0x00, 0x01, 0xAB, 0xCD, 0x00, 0x00, 0x01, 0xEF];
    let decoded = reg.decode("stream", &data, &Config::new()).unwrap();

    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);
    let root = decoded.root();
    assert_eq!(root.len(), 2);

    let first = decoded.tree.select("nalu[0].nalu.marker").unwrap();
    assert_eq!(first.value().as_u64(), Some(0xAB));
    assert_eq!(first.range(), BitRange::new(24, 8));

    let second = decoded.tree.select("nalu[1].nalu.marker").unwrap();
    assert_eq!(second.value().as_u64(), Some(0xEF));
    assert_eq!(second.range(), BitRange::new(64, 8));

    // record ranges start at their delimiter
    assert_eq!(decoded.tree.select("nalu[0]").unwrap().range(), BitRange::new(0, 40));
    assert_eq!(decoded.tree.select("nalu[1]").unwrap().range(), BitRange::new(40, 32));
    assert_eq!(decoded.tree.select("nalu[0].nalu").unwrap().format(), Some("marker"));
}

#[test]
fn length_prefixes_split_records() {
    let reg = registry("payload");
    let data = [0x02, 0xAB, 0xCD, 0x01, 0xEF];
    let config = Config::new().with_record_length_size(1);
    let decoded = reg.decode("stream", &data, &config).unwrap();

    assert!(decoded.diagnostics.is_empty());
    assert_eq!(decoded.root().len(), 2);

    let t = &decoded.tree;
    assert_eq!(t.select("nalu[0].length").unwrap().value().as_u64(), Some(2));
    assert_eq!(
        t.select("nalu[0].nalu.payload").unwrap().value().as_bytes(),
        Some(&[0xAB, 0xCD][..])
    );
    assert_eq!(t.select("nalu[0].nalu.payload").unwrap().range(), BitRange::new(8, 16));
    assert_eq!(t.select("nalu[1].length").unwrap().value().as_u64(), Some(1));
    assert_eq!(
        t.select("nalu[1].nalu.payload").unwrap().value().as_bytes(),
        Some(&[0xEF][..])
    );
}

#[test]
fn leading_and_trailing_bytes_are_kept() {
    let reg = registry("payload");
    let data = [0xFF, 0x00, 0x00, 0x01, 0xAB, 0x00, 0x00];
    let decoded = reg.decode("stream", &data, &Config::new()).unwrap();
    assert!(decoded.diagnostics.is_empty());

    let names: Vec<&str> = decoded.root().children().map(|c| c.name()).collect();
    assert_eq!(names, vec!["leading_bytes", "nalu", "trailing_zero_bytes"]);

    let t = &decoded.tree;
    assert_eq!(t.select("leading_bytes").unwrap().value(), &Value::Bytes(vec![0xFF]));
    assert_eq!(
        t.select("nalu.nalu.payload").unwrap().value().as_bytes(),
        Some(&[0xAB][..])
    );
    let trailing = t.select("trailing_zero_bytes").unwrap();
    assert_eq!(trailing.value().as_bytes(), Some(&[0, 0][..]));
    assert_eq!(trailing.range(), BitRange::new(40, 16));
}

#[test]
fn four_byte_start_code_keeps_all_zeros_in_the_delimiter() {
    let reg = registry("payload");
    let data = [0x00, 0x00, 0x00, 0x01, 0x11, 0x00, 0x00, 0x00, 0x01, 0x22];
    let decoded = reg.decode("stream", &data, &Config::new()).unwrap();

    let t = &decoded.tree;
    assert_eq!(
        t.select("nalu[0].nalu.payload").unwrap().value().as_bytes(),
        Some(&[0x11][..])
    );
    assert_eq!(t.select("nalu[1]").unwrap().range(), BitRange::new(40, 40));
}

#[test]
fn missing_start_code_keeps_region_as_leading_bytes() {
    let reg = registry("payload");
    let decoded = reg.decode("stream", &[0xAB, 0xCD], &Config::new()).unwrap();

    assert!(!decoded.has_fatal());
    let diags: Vec<_> = decoded.diagnostics.of_kind(DiagnosticKind::MissingStartCode).collect();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].severity, Severity::Error);
    assert_eq!(
        decoded.tree.select("leading_bytes").unwrap().value().as_bytes(),
        Some(&[0xAB, 0xCD][..])
    );
}

#[test]
fn empty_input_yields_no_records() {
    let reg = registry("payload");
    for config in [Config::new(), Config::new().with_record_length_size(2)] {
        let decoded = reg.decode("stream", &[], &config).unwrap();
        assert!(decoded.root().is_empty());
        assert!(decoded.diagnostics.is_empty());
    }
}

#[test]
fn length_past_end_is_fatal_and_keeps_partial_record() {
    let reg = registry("payload");
    let config = Config::new().with_record_length_size(1);
    let decoded = reg.decode("stream", &[0x05, 0xAB], &config).unwrap();

    assert!(decoded.has_fatal());
    let fatal: Vec<_> = decoded.diagnostics.fatal().collect();
    assert_eq!(fatal.len(), 1);
    assert_eq!(fatal[0].kind, DiagnosticKind::EndOfStream);
    assert_eq!(fatal[0].range, BitRange::new(8, 40));

    let record = decoded.tree.select("nalu").unwrap();
    assert_eq!(record.len(), 1);
    assert_eq!(record.child("length").unwrap().value().as_u64(), Some(5));
}

#[test]
fn min_zeros_option_changes_delimiter() {
    let reg = registry("payload");
    let data = [0x00, 0x01, 0x11, 0x00, 0x01, 0x22];

    let decoded = reg.decode("stream", &data, &Config::new()).unwrap();
    assert_eq!(decoded.diagnostics.of_kind(DiagnosticKind::MissingStartCode).count(), 1);

    let config = Config::new().with_option("start_code_min_zeros", 1);
    let decoded = reg.decode("stream", &data, &config).unwrap();
    assert!(decoded.diagnostics.is_empty());
    assert_eq!(decoded.root().children_named("nalu").count(), 2);
}

#[test]
fn length_prefixed_and_start_code_records_are_isomorphic() {
    let reg = default_registry().unwrap();
    let nalus: [&[u8]; 2] = [&[0x40, 0x01, 0xAA], &[0x42, 0x01]];

    let mut prefixed = Vec::new();
    let mut annex_b = Vec::new();
    for n in nalus {
        prefixed.extend_from_slice(&(n.len() as u32).to_be_bytes());
        prefixed.extend_from_slice(n);
        annex_b.extend_from_slice(&[0, 0, 1]);
        annex_b.extend_from_slice(n);
    }

    let a = reg.decode("hevc_au", &prefixed, &Config::new()).unwrap();
    let b = reg
        .decode("hevc_au", &annex_b, &Config::new().with_record_length_size(0))
        .unwrap();
    assert!(a.diagnostics.is_empty());
    assert!(b.diagnostics.is_empty());

    let left: Vec<_> = a.root().children().collect();
    let right: Vec<_> = b.root().children().collect();
    assert_eq!(left.len(), 2);
    assert_eq!(right.len(), 2);
    for (l, r) in left.iter().zip(&right) {
        assert_eq!(l.child("length").map(|n| n.range().len), Some(32));
        assert!(r.child("length").is_none());
        let (l, r) = (l.child("nalu").unwrap(), r.child("nalu").unwrap());
        assert!(l.values_eq(&r), "{l:?} vs {r:?}");
    }
}

#[test]
fn unaligned_start_code_scan_reads_alignment_bits() {
    let reg = registry("payload");
    let data = [0xF0, 0x00, 0x00, 0x01, 0xAB];
    let decoded = reg.decode("offset_stream", &data, &Config::new()).unwrap();

    assert!(!decoded.has_fatal());
    let diags: Vec<_> = decoded.diagnostics.iter().collect();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::AssertionFailed);
    assert_eq!(diags[0].severity, Severity::Error);
    assert_eq!(diags[0].range, BitRange::new(4, 4));

    let t = &decoded.tree;
    let pad = t.select("alignment_bits").unwrap();
    assert_eq!(pad.range(), BitRange::new(4, 4));
    assert_eq!(pad.value().as_u64(), Some(0));
    assert_eq!(
        t.select("nalu.nalu.payload").unwrap().value().as_bytes(),
        Some(&[0xAB][..])
    );
    assert_eq!(t.select("nalu").unwrap().range(), BitRange::new(8, 32));
}

#[test]
fn final_partial_byte_becomes_trailing_bits() {
    let reg = registry("payload");
    let decoded = reg.decode("odd", &[0x00, 0x00, 0x01, 0xAB], &Config::new()).unwrap();
    assert!(decoded.diagnostics.is_empty(), "{:?}", decoded.diagnostics);

    let t = &decoded.tree;
    assert_eq!(t.select("records").unwrap().range(), BitRange::new(0, 28));
    let bits = t.select("records.trailing_bits").unwrap();
    assert_eq!(bits.value().as_u64(), Some(0xA));
    assert_eq!(bits.range(), BitRange::new(24, 4));
    assert_eq!(
        t.select("records.nalu.nalu.payload").unwrap().value().as_bytes(),
        Some(&[] as &[u8])
    );
    assert_eq!(t.select("tail").unwrap().value().as_u64(), Some(0xB));
}
