use anyhow::{Context, bail};
use bitscope::{
    Config, DecodeOptions, Decoded, default_registry,
    dump::write_tree,
    json_api::{decoded_to_json, node_to_json},
    util::{hex_dump, range_bytes},
};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use tracing::{Level, debug};

#[derive(Parser, Debug)]
#[command(version, about = "Bit-precise binary stream explorer")]
struct Args {
    /// Input file path
    #[arg(required_unless_present = "list")]
    path: Option<PathBuf>,

    /// Format to decode the input as
    #[arg(long, short = 'f', default_value = "hevc_au")]
    format: String,

    /// Byte width of record length prefixes; 0 selects start-code framing
    #[arg(long)]
    length_size: Option<u64>,

    /// Extra format option as KEY=VALUE (repeatable, VALUE parsed as JSON when possible)
    #[arg(long = "opt", value_name = "KEY=VALUE")]
    opts: Vec<String>,

    /// JSON file holding a configuration record
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only print the subtree at a dotted path (e.g. nalu[1].nalu)
    #[arg(long)]
    filter: Option<String>,

    /// Limit recursion depth (for text/tree and JSON output)
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Emit JSON instead of human-readable tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Hex-dump the bytes covered by the selected node
    #[arg(long, action = ArgAction::SetTrue)]
    raw: bool,

    /// Keep diagnostics of rejected group candidates
    #[arg(long, action = ArgAction::SetTrue)]
    retain_speculative: bool,

    /// List registered formats and exit
    #[arg(long, action = ArgAction::SetTrue)]
    list: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let registry = default_registry().context("building format registry")?;

    if args.list {
        for name in registry.format_names() {
            let desc = registry
                .descriptor(name)
                .map(|d| d.description.as_str())
                .unwrap_or_default();
            println!("{name:<12} {desc}");
        }
        return Ok(());
    }

    let Some(path) = args.path.as_ref() else {
        bail!("no input file given");
    };
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let config = build_config(&args)?;
    debug!(?config, "effective caller config");

    let mut options = DecodeOptions::default();
    if args.retain_speculative {
        options = options.retain_speculative();
    }
    let decoded = registry.decode_with(&args.format, &data, &config, &options)?;

    let node = match &args.filter {
        Some(p) => match decoded.tree.select(p) {
            Some(n) => n,
            None => bail!("no node at path {p:?}"),
        },
        None => decoded.root(),
    };

    if args.json {
        if args.filter.is_some() {
            println!("{}", serde_json::to_string_pretty(&node_to_json(node, args.max_depth))?);
        } else {
            println!(
                "{}",
                serde_json::to_string_pretty(&decoded_to_json(&decoded, args.max_depth))?
            );
        }
        return Ok(());
    }

    let mut out = String::new();
    write_tree(&mut out, node, args.max_depth)?;
    print!("{out}");

    if args.raw {
        let range = node.range();
        let bytes = range_bytes(&data, range);
        println!("\n== {} ({range}) ==", node.name());
        print!("{}", hex_dump(bytes, range.byte_span().0));
    }

    report(&decoded);
    Ok(())
}

fn build_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(p) => {
            let text = std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            Config::from_json(&text).with_context(|| format!("parsing {}", p.display()))?
        }
        None => Config::new(),
    };
    if let Some(n) = args.length_size {
        config.record_length_size = Some(n);
    }
    for pair in &args.opts {
        let Some((k, v)) = Config::parse_option(pair) else {
            bail!("--opt expects KEY=VALUE, got {pair:?}");
        };
        config.options.insert(k, v);
    }
    Ok(config)
}

fn report(decoded: &Decoded) {
    for d in &decoded.diagnostics {
        eprintln!("{d}");
    }
    if decoded.has_fatal() {
        eprintln!("decode stopped early; tree is partial");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_stack_on_config() {
        let args = Args::parse_from([
            "bitdump",
            "in.bin",
            "--length-size",
            "0",
            "--opt",
            "start_code_min_zeros=3",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.record_length_size, Some(0));
        assert_eq!(config.get_u64("start_code_min_zeros"), Some(3));
    }

    #[test]
    fn list_needs_no_path() {
        let args = Args::parse_from(["bitdump", "--list"]);
        assert!(args.list);
        assert!(args.path.is_none());
    }
}
