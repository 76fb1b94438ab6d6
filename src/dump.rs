//! Human-readable tree output.

use crate::context::Decoded;
use crate::tree::NodeRef;
use std::fmt::{self, Write};

/// Render `node` and its subtree, one node per line:
///
/// ```text
///        0x0+9 access_unit <hevc_au> [2 items]
///        0x0+6   nalu {2 fields}
/// ```
///
/// Scopes deeper than `max_depth` levels below `node` are listed but not
/// expanded.
pub fn write_tree(out: &mut impl Write, node: NodeRef<'_>, max_depth: usize) -> fmt::Result {
    write_node(out, node, 0, max_depth)
}

fn write_node(out: &mut impl Write, node: NodeRef<'_>, depth: usize, max_depth: usize) -> fmt::Result {
    let indent = "  ".repeat(depth);
    let format = node
        .format()
        .map(|f| format!(" <{f}>"))
        .unwrap_or_default();
    let value = node.value();
    if value.is_scope() {
        writeln!(out, "{:>14} {indent}{}{format} {value}", node.range().to_string(), node.name())?;
        if depth < max_depth {
            for c in node.children() {
                write_node(out, c, depth + 1, max_depth)?;
            }
        }
    } else {
        writeln!(out, "{:>14} {indent}{}{format} = {value}", node.range().to_string(), node.name())?;
    }
    Ok(())
}

/// Tree followed by a diagnostics section when there is anything to report.
pub fn render(decoded: &Decoded, max_depth: usize) -> Result<String, fmt::Error> {
    let mut out = String::new();
    write_tree(&mut out, decoded.root(), max_depth)?;
    if !decoded.diagnostics.is_empty() {
        out.push_str("\ndiagnostics:\n");
        for d in &decoded.diagnostics {
            writeln!(out, "  {d}")?;
        }
    }
    Ok(out)
}
