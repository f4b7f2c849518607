#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mlgpu_commands::Generation;
use mlgpu_dump::{
    build_query, decode_bytes, parse_u32, parse_u64, render_json, render_text, OutputFormat, QueryKind,
    QueryTemplate,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mlgpu-dump", version, about = "Decode GPU batch buffers and emit query command templates")]
struct Cli {
    /// Hardware generation (gen9, gen11, gen12, xehpg).
    #[arg(long = "gen", global = true, env = "MLGPU_GEN", default_value = "gen12")]
    generation: Generation,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Decode a little-endian batch buffer file.
    Decode(DecodeArgs),
    /// Write the begin/end command sequence of a performance query.
    Query(QueryArgs),
}

#[derive(Debug, Parser)]
struct DecodeArgs {
    /// Batch buffer file.
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Byte offset of the first command (decimal or 0x hex).
    #[arg(long, default_value = "0", value_parser = parse_u64)]
    offset: u64,

    /// Keep decoding past MI_BATCH_BUFFER_END.
    #[arg(long)]
    no_stop_at_bbe: bool,
}

#[derive(Debug, Parser)]
struct QueryArgs {
    #[arg(long, value_enum)]
    kind: QueryKind,

    /// GPU address of the report buffer.
    #[arg(long, value_parser = parse_u64)]
    address: u64,

    /// OA report id for the begin snapshot (hw-counters only).
    #[arg(long, default_value = "0", value_parser = parse_u32)]
    report_id: u32,

    /// MMIO register sampled alongside the OA reports; repeatable (hw-counters only).
    #[arg(long = "register", value_parser = parse_u32)]
    registers: Vec<u32>,

    /// Output file for the command buffer bytes.
    #[arg(long)]
    out: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("MLGPU_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_decode(gen: Generation, args: DecodeArgs) -> Result<()> {
    let bytes = fs::read(&args.file).with_context(|| format!("failed to read {}", args.file.display()))?;
    let offset = usize::try_from(args.offset).context("offset does not fit in memory")?;
    let commands = decode_bytes(gen, &bytes, offset, !args.no_stop_at_bbe)
        .with_context(|| format!("failed to decode {}", args.file.display()))?;

    let rendered = match args.format {
        OutputFormat::Text => render_text(&commands),
        OutputFormat::Json => {
            let mut json = render_json(gen, &commands).context("failed to serialize commands")?;
            json.push('\n');
            json
        }
    };
    io::stdout()
        .lock()
        .write_all(rendered.as_bytes())
        .context("failed to write to stdout")?;
    Ok(())
}

fn run_query(gen: Generation, args: QueryArgs) -> Result<()> {
    let template = QueryTemplate {
        kind: args.kind,
        report_address: args.address,
        report_id: args.report_id,
        user_registers: args.registers,
    };
    let built = build_query(gen, &template).context("failed to build query sequence")?;
    let bytes = built.to_le_bytes();
    fs::write(&args.out, &bytes).with_context(|| format!("failed to write {}", args.out.display()))?;

    tracing::info!(path = %args.out.display(), bytes = bytes.len(), "wrote query command buffer");
    println!(
        "wrote {} bytes to {} (report buffer: {} bytes at 0x{:x})",
        bytes.len(),
        args.out.display(),
        built.report_size_bytes,
        args.address
    );
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    tracing::debug!(gen = %cli.generation, "starting");

    match cli.command {
        Commands::Decode(args) => run_decode(cli.generation, args),
        Commands::Query(args) => run_query(cli.generation, args),
    }
}
