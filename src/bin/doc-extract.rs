//! doc-extract - pull declared fields out of an XML or HTML document
//!
//! Reads a document and a JSON field map (or a built-in schema) and writes
//! the record as JSON, a one-row CSV, an exploded CSV or a key/value table.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use doc_extractor::{
    schemas, AmbiguityPolicy, CsvOptions, Document, DocumentKind, FieldExtractor, FieldMap, Record,
    Table,
};

#[derive(Parser)]
#[command(name = "doc-extract")]
#[command(version, about = "Extract declared fields from XML/HTML documents", long_about = None)]
struct Cli {
    /// Document to read ("-" for stdin)
    #[arg(required_unless_present = "print_map")]
    input: Option<PathBuf>,

    /// JSON field map
    #[arg(short, long, conflicts_with = "schema")]
    map: Option<PathBuf>,

    /// Built-in field map
    #[arg(short, long, value_enum)]
    schema: Option<Schema>,

    /// Markup flavour (detected from content by default)
    #[arg(short, long, value_enum)]
    kind: Option<Kind>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// With --format csv: one row per item of this sequence field
    #[arg(long)]
    explode: Option<String>,

    /// Fail when a single-valued field matches several nodes
    #[arg(long)]
    strict: bool,

    /// CSV delimiter
    #[arg(short, long, default_value_t = ',')]
    delimiter: char,

    /// Output file (stdout by default)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the field map as JSON and exit
    #[arg(long)]
    print_map: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Schema {
    Cte,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Xml,
    Html,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
    Kv,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let map = load_map(&cli)?;

    if cli.print_map {
        let json = map.to_json_pretty()?;
        return write_output(cli.output.as_deref(), json.as_bytes());
    }

    let Some(input) = cli.input.as_deref() else {
        bail!("no input document given");
    };
    let text = read_input(input)?;
    let kind = match cli.kind {
        Some(Kind::Xml) => DocumentKind::Xml,
        Some(Kind::Html) => DocumentKind::Html,
        None => DocumentKind::detect(&text),
    };
    tracing::info!(input = %input.display(), ?kind, fields = map.len(), "extracting");

    let doc = Document::parse(&text, kind)
        .with_context(|| format!("parsing {}", input.display()))?;

    let policy = if cli.strict {
        AmbiguityPolicy::Reject
    } else {
        AmbiguityPolicy::First
    };
    let record = FieldExtractor::new(policy)
        .extract(&doc, &map)
        .with_context(|| format!("extracting from {}", input.display()))?;

    let absent = record.absent_fields();
    if !absent.is_empty() {
        tracing::info!(count = absent.len(), fields = ?absent, "absent fields");
    }

    let bytes = match cli.format {
        Format::Json => {
            let mut json = serde_json::to_string_pretty(&record)?;
            json.push('\n');
            json.into_bytes()
        }
        Format::Csv | Format::Kv => {
            let table = build_table(&record, cli.format, cli.explode.as_deref())?;
            let options = CsvOptions {
                delimiter: csv_delimiter(cli.delimiter)?,
                ..CsvOptions::default()
            };
            table.to_csv_string(&options)?.into_bytes()
        }
    };

    write_output(cli.output.as_deref(), &bytes)
}

fn build_table(record: &Record, format: Format, explode: Option<&str>) -> Result<Table> {
    match (format, explode) {
        (Format::Kv, _) => Ok(Table::key_value(record)),
        (_, Some(field)) => Table::explode(record, field)
            .with_context(|| format!("'{}' is not a repeated field of this record", field)),
        (_, None) => Ok(Table::from_records([record])),
    }
}

fn load_map(cli: &Cli) -> Result<FieldMap> {
    match (&cli.map, cli.schema) {
        (Some(path), _) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading field map {}", path.display()))?;
            FieldMap::from_json(&json).with_context(|| format!("loading field map {}", path.display()))
        }
        (None, Some(Schema::Cte)) => Ok(schemas::cte()?),
        (None, None) => bail!("either --map or --schema is required"),
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        return io::read_to_string(io::stdin()).context("reading stdin");
    }
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn csv_delimiter(c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        bail!("delimiter must be a single ASCII character, got '{}'", c)
    }
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<()> {
    match path {
        Some(path) => fs::write(path, bytes).with_context(|| format!("writing {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
