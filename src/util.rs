use crate::tree::BitRange;

/// Bytes of `data` touched by `range`, clamped to the input.
pub fn range_bytes(data: &[u8], range: BitRange) -> &[u8] {
    let (first, len) = range.byte_span();
    let first = (first as usize).min(data.len());
    let last = first.saturating_add(len as usize).min(data.len());
    &data[first..last]
}

/// xxd-style dump: offset, two-byte hex groups, printable ASCII.
pub fn hex_dump(bytes: &[u8], start_offset: u64) -> String {
    let mut out = String::new();
    for (i, chunk) in bytes.chunks(16).enumerate() {
        let offs = start_offset + (i as u64) * 16;
        let groups: Vec<String> = chunk.chunks(2).map(hex::encode).collect();
        let ascii: String = chunk
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect();
        out.push_str(&format!("{:08x}: {:<39}  {}\n", offs, groups.join(" "), ascii));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_line_layout() {
        let s = hex_dump(b"\x00\x01AB", 0x20);
        assert_eq!(s, format!("00000020: {:<39}  ..AB\n", "0001 4142"));
    }

    #[test]
    fn range_bytes_rounds_out_and_clamps() {
        let data = [1u8, 2, 3, 4];
        assert_eq!(range_bytes(&data, BitRange::new(4, 8)), &[1, 2]);
        assert_eq!(range_bytes(&data, BitRange::new(16, 64)), &[3, 4]);
        assert!(range_bytes(&data, BitRange::new(64, 8)).is_empty());
    }
}
