use bitscope::{
    Config, DecodeContext, DecodeResult, DependencyRef, FormatDescriptor, Framing, Registry,
    dump::render,
};

// This example registers a tiny TLV-style format whose records are framed by
// one-byte length prefixes, each record tried first as a "text" record and
// then as a "number" record. Run it with a hex string, e.g.
//   cargo run --example custom_format -- 0354686902ff01
fn text(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    let tag = d.field_u("tag", 8)?;
    d.require(tag == b'T' as u64, "not a text record")?;
    let n = (d.remaining_bits() / 8) as usize;
    d.field_utf8("text", n)?;
    Ok(())
}

fn number(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    d.field_u("tag", 8)?;
    d.field_u("value", 8)?;
    Ok(())
}

fn records(d: &mut DecodeContext<'_, '_>) -> DecodeResult<()> {
    Framing::from_config(d.config()).decode_records(d, "record", "record")
}

fn main() -> anyhow::Result<()> {
    let input = std::env::args().nth(1).unwrap_or_else(|| "0354686902ff01".to_string());
    let data = hex::decode(input.trim())?;

    let mut reg = Registry::new();
    reg.register(
        FormatDescriptor::new("records", records)
            .description("length-prefixed records")
            .default_config(Config::new().with_record_length_size(1))
            .dependency(DependencyRef::group("record", ["text", "number"])),
    )?;
    reg.register(FormatDescriptor::new("text", text))?;
    reg.register(FormatDescriptor::new("number", number))?;
    reg.resolve()?;

    let decoded = reg.decode("records", &data, &Config::new())?;
    print!("{}", render(&decoded, 16)?);
    Ok(())
}
