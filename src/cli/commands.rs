use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::thread;

use anyhow::{anyhow, Context, Result};
use heapsift::config::Config;
use heapsift::dump::RecordReader;
use heapsift::graph::Graph;
use heapsift::render::{
    print_records, write_anchors, write_intersection, write_json, write_owners, write_svg,
    IntersectionReport,
};
use heapsift::symbols::{self, SymbolTable};

use super::{Cli, Command, OutputFormat};

const READ_BUFFER: usize = 1 << 20;

pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let symbols = load_symbols(&cli, &config)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    match &cli.command {
        Command::Print { find } => {
            let reader = open_dump(&cli.dump, &config)?;
            let printed = print_records(reader, find.as_deref(), &mut out)
                .with_context(|| format!("Failed to print {}", cli.dump.display()))?;
            tracing::debug!(printed, "Printed records");
        }
        Command::Anchors { address } => {
            let graph = build_graph(&cli.dump, &config, &symbols)?;
            let anchors = graph.anchors(*address)?;
            match cli.format {
                OutputFormat::Text => write_anchors(&graph, &symbols, *address, &anchors, &mut out)?,
                OutputFormat::Json => write_json(&anchors, &mut out)?,
            }
        }
        Command::Owners { address, depth } => {
            let graph = build_graph(&cli.dump, &config, &symbols)?;
            let owners = graph.owners(*address, depth.unwrap_or(config.owners_depth))?;
            match cli.format {
                OutputFormat::Text => write_owners(&graph, &symbols, &owners, &mut out)?,
                OutputFormat::Json => write_json(&owners, &mut out)?,
            }
        }
        Command::Hexdump { address } => {
            let graph = build_graph(&cli.dump, &config, &symbols)?;
            write!(out, "{}", graph.hexdump(*address)?)?;
        }
        Command::Intersect { other } => {
            // Both dumps are independent; build them side by side.
            let (graph, other_graph) = thread::scope(|scope| {
                let theirs = scope.spawn(|| build_graph(other, &config, &symbols));
                let ours = build_graph(&cli.dump, &config, &symbols);
                let theirs = theirs
                    .join()
                    .map_err(|_| anyhow!("Graph build for {} panicked", other.display()))?;
                Ok::<_, anyhow::Error>((ours?, theirs?))
            })?;
            let intersection = graph.intersection(&other_graph);
            match cli.format {
                OutputFormat::Text => write_intersection(&graph, &symbols, &intersection, &mut out)?,
                OutputFormat::Json => write_json(
                    &IntersectionReport::new(&graph, &symbols, &intersection),
                    &mut out,
                )?,
            }
        }
        Command::Svg {
            address,
            output,
            max_nodes,
        } => {
            let graph = build_graph(&cli.dump, &config, &symbols)?;
            let options = match max_nodes {
                Some(max) => config.clone().with_max_nodes(*max).render,
                None => config.render,
            };
            let file = File::create(output)
                .with_context(|| format!("Failed to create {}", output.display()))?;
            let report = write_svg(&graph, &symbols, *address, &options, BufWriter::new(file))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if let Some(limit) = report.limit_exceeded() {
                tracing::warn!(%limit, "SVG truncated");
            }
            writeln!(
                out,
                "Wrote {} objects to {}",
                report.rendered,
                output.display()
            )?;
        }
    }

    out.flush()?;
    Ok(())
}

fn load_symbols(cli: &Cli, config: &Config) -> Result<SymbolTable> {
    let mut table = SymbolTable::new();

    if let Some(path) = &cli.oid {
        let file = File::open(path)
            .with_context(|| format!("Failed to open oid file {}", path.display()))?;
        let count = table
            .read_oids(BufReader::new(file))
            .with_context(|| format!("Failed to read oid file {}", path.display()))?;
        tracing::info!(entries = count, path = %path.display(), "Loaded oid file");
    }

    if let Some(program) = &cli.program {
        let go = symbols::locate_go(config.go_binary.as_deref())?;
        symbols::load_program_symbols(&mut table, &go, program)
            .with_context(|| format!("Failed to read symbols from {}", program.display()))?;
    }

    Ok(table)
}

fn open_dump(path: &Path, config: &Config) -> Result<RecordReader<BufReader<File>>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open heap dump {}", path.display()))?;
    let reader = RecordReader::new(BufReader::with_capacity(READ_BUFFER, file))
        .with_context(|| format!("Failed to read heap dump {}", path.display()))?;
    Ok(reader.with_max_record_bytes(config.max_record_bytes))
}

fn build_graph(path: &Path, config: &Config, symbols: &SymbolTable) -> Result<Graph> {
    tracing::info!(path = %path.display(), "Reading heap dump");
    let reader = open_dump(path, config)?;
    Graph::build(reader, symbols)
        .with_context(|| format!("Failed to build heap graph from {}", path.display()))
}
