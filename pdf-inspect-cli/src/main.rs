use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdf_inspect::analysis::{Anomaly, NotificationType};
use pdf_inspect::parser::xref_stream::XRefStreamEntry;
use pdf_inspect::parser::{Document, ObjectId, ParseOptions};
use pdf_inspect::InspectError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pdfinspect",
    about = "Inspect the object graph of untrusted or damaged PDF files",
    version,
    author
)]
struct Cli {
    /// Print machine readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// User password tried before the empty one
    #[arg(short, long, global = true)]
    password: Option<String>,

    /// Log parser diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summary of versions, revisions, encryption and findings
    Info {
        /// Input PDF file
        input: PathBuf,
    },

    /// List indirect objects
    Objects {
        /// Input PDF file
        input: PathBuf,

        /// Only objects whose dictionary has this /Type
        #[arg(short = 't', long = "type")]
        type_filter: Option<String>,
    },

    /// Dump the content of a stream object
    Stream {
        /// Input PDF file
        input: PathBuf,

        /// Object number
        number: i32,

        /// Generation number
        #[arg(short, long, default_value = "0")]
        generation: i32,

        /// Dump the payload as stored in the file
        #[arg(long)]
        raw: bool,

        /// Describe every stage of the filter chain instead of dumping data
        #[arg(long)]
        stages: bool,

        /// Write the data to a file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List anomalies grouped by object
    Anomalies {
        /// Input PDF file
        input: PathBuf,
    },

    /// Show cross-reference tables and streams
    Xref {
        /// Input PDF file
        input: PathBuf,
    },
}

#[derive(Serialize)]
struct InfoReport {
    file: String,
    version: String,
    binary_marker: bool,
    revisions: usize,
    indirect_objects: usize,
    streamed_objects: usize,
    streams: usize,
    trailers: usize,
    encrypted: bool,
    password_required: bool,
    filters: Vec<String>,
    tokens: BTreeMap<String, usize>,
    anomalies: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct ObjectRow {
    id: String,
    kind: String,
    revision: usize,
    offset: usize,
    value_type: &'static str,
    dict_type: Option<String>,
    stream_kind: Option<String>,
}

#[derive(Serialize)]
struct StageRow {
    index: usize,
    length: usize,
}

#[derive(Serialize)]
struct StreamReport {
    id: String,
    kind: String,
    encoded_length: usize,
    decoded_length: usize,
    stages: Vec<StageRow>,
    locked: bool,
    failure: Option<String>,
}

#[derive(Serialize)]
struct AnomalyRow<'a> {
    owner: String,
    notification: String,
    #[serde(flatten)]
    anomaly: &'a Anomaly,
}

#[derive(Serialize)]
struct XRefRow {
    number: i64,
    offset: u64,
    generation: u32,
    in_use: bool,
}

#[derive(Serialize)]
struct XRefStreamReport {
    id: String,
    entries: Vec<XRefStreamEntry>,
}

#[derive(Serialize)]
struct XRefReport {
    table: Vec<XRefRow>,
    streams: Vec<XRefStreamReport>,
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "pdfinspect=debug,pdf_inspect=debug"
    } else {
        "pdfinspect=info,pdf_inspect=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn open(input: &Path, password: Option<&str>) -> Result<Document> {
    let mut options = ParseOptions::default();
    if let Some(password) = password {
        options = options.with_password(password);
    }
    debug!(file = %input.display(), "parsing");
    Document::open_with_options(input, options)
        .with_context(|| format!("Failed to parse {}", input.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

fn info_command(input: &Path, doc: &Document, json: bool) -> Result<()> {
    doc.decode_all_streams();
    let stats = doc.statistics();
    let mut anomalies = BTreeMap::new();
    for notification in [
        NotificationType::Corruption,
        NotificationType::UnsupportedFeature,
        NotificationType::AreaOfInterest,
        NotificationType::PotentiallyHarmful,
    ] {
        anomalies.insert(notification.to_string(), stats.anomalies().count(notification));
    }
    let report = InfoReport {
        file: input.display().to_string(),
        version: stats.version().to_string(),
        binary_marker: doc.header().has_binary_marker,
        revisions: stats.nb_revisions,
        indirect_objects: stats.nb_indirect_objects,
        streamed_objects: stats.nb_streamed_objects,
        streams: stats.nb_streams,
        trailers: stats.nb_trailers,
        encrypted: stats.is_encrypted(),
        password_required: stats.is_password_required(),
        filters: stats.filters_used().iter().cloned().collect(),
        tokens: stats.tokens().clone(),
        anomalies,
    };
    if json {
        return print_json(&report);
    }

    println!("PDF Information for: {}", report.file);
    println!("==========================================");
    print!("{}", stats.description());
    if let Some(root) = doc.trailer_attribute("Root").and_then(|root| root.as_dict()) {
        if let Some(root_type) = root.get_type() {
            println!("Catalog Type: {root_type}");
        }
    }
    let tokens = stats.tokens_summary();
    if !tokens.is_empty() {
        println!("\nSuspicious tokens:{tokens}");
    }
    print!("{}", stats.corruptions_summary());
    println!();
    Ok(())
}

fn objects_command(doc: &Document, type_filter: Option<&str>, json: bool) -> Result<()> {
    let kinds: BTreeMap<ObjectId, String> = doc
        .streams()
        .iter()
        .map(|entry| (entry.id, doc.stream_kind(entry).to_string()))
        .collect();
    let rows: Vec<ObjectRow> = doc
        .get_object_list()
        .into_iter()
        .filter_map(|object| {
            let dict_type = object
                .value
                .dictionary()
                .and_then(|dict| doc.get_attribute(dict, "Type"))
                .and_then(|value| value.as_name())
                .map(|name| name.as_str().to_string());
            if type_filter.is_some() && dict_type.as_deref() != type_filter {
                return None;
            }
            let kind = if object.is_trailer() {
                "trailer".to_string()
            } else if let Some(container) = object.container() {
                format!("in {container}")
            } else {
                "indirect".to_string()
            };
            Some(ObjectRow {
                id: object.id.to_string(),
                kind,
                revision: object.revision,
                offset: object.span.start,
                value_type: object.value.type_name(),
                dict_type,
                stream_kind: kinds.get(&object.id).cloned(),
            })
        })
        .collect();
    if json {
        return print_json(&rows);
    }

    for row in &rows {
        let mut line = format!(
            "{:<12} rev {:<3} {:#010x} {:<10} {}",
            row.id, row.revision, row.offset, row.value_type, row.kind
        );
        if let Some(dict_type) = &row.dict_type {
            line.push_str(&format!(" /{dict_type}"));
        }
        if let Some(stream_kind) = &row.stream_kind {
            line.push_str(&format!(" [{stream_kind}]"));
        }
        println!("{line}");
    }
    info!(count = rows.len(), "objects listed");
    Ok(())
}

struct StreamRequest {
    id: ObjectId,
    raw: bool,
    stages: bool,
    output: Option<PathBuf>,
}

fn stream_command(doc: &Document, request: StreamRequest, json: bool) -> Result<()> {
    let id = request.id;
    let object = doc.get_object(id).ok_or(InspectError::ObjectNotFound(id))?;
    let stream = object
        .value
        .as_stream()
        .ok_or(InspectError::NotAStream(id))?;

    if request.stages || json {
        let decoded = doc.decode(stream);
        let kind = doc
            .streams()
            .iter()
            .find(|entry| entry.id == id)
            .map_or_else(|| "stream".to_string(), |entry| doc.stream_kind(entry).to_string());
        let report = StreamReport {
            id: id.to_string(),
            kind,
            encoded_length: stream.encoded_data().len(),
            decoded_length: decoded.data.len(),
            stages: decoded
                .snapshots
                .iter()
                .enumerate()
                .map(|(index, snapshot)| StageRow {
                    index,
                    length: snapshot.len(),
                })
                .collect(),
            locked: decoded.locked,
            failure: decoded.failure.as_ref().map(ToString::to_string),
        };
        if json {
            return print_json(&report);
        }
        println!("Stream {} ({})", report.id, report.kind);
        println!("Encoded: {} bytes", report.encoded_length);
        for stage in &report.stages {
            println!("Stage {}: {} bytes", stage.index, stage.length);
        }
        println!("Decoded: {} bytes", report.decoded_length);
        if report.locked {
            println!("Encrypted: no key available");
        }
        if let Some(failure) = &report.failure {
            println!("Failure: {failure}");
        }
        return Ok(());
    }

    let data = if request.raw {
        stream.encoded_data()
    } else {
        doc.decoded_data(stream)
    };
    match request.output {
        Some(path) => {
            std::fs::write(&path, data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(bytes = data.len(), path = %path.display(), "stream written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(data).context("Failed to write to stdout")?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn anomalies_command(doc: &Document, json: bool) -> Result<()> {
    doc.decode_all_streams();
    let stats = doc.statistics();
    if json {
        let rows: Vec<AnomalyRow> = stats
            .anomalies()
            .iter()
            .map(|(owner, anomaly)| AnomalyRow {
                owner: owner.to_string(),
                notification: anomaly.notification_type().to_string(),
                anomaly,
            })
            .collect();
        return print_json(&rows);
    }
    if stats.anomalies().is_empty() {
        println!("No anomalies found");
        return Ok(());
    }
    print!("{}", stats.anomalies_summary());
    Ok(())
}

fn xref_command(doc: &Document, json: bool) -> Result<()> {
    let report = XRefReport {
        table: doc
            .xref_table()
            .iter()
            .map(|(number, entry)| XRefRow {
                number,
                offset: entry.offset,
                generation: entry.generation,
                in_use: entry.in_use,
            })
            .collect(),
        streams: doc
            .xref_stream_entries()
            .into_iter()
            .map(|(id, entries)| XRefStreamReport {
                id: id.to_string(),
                entries,
            })
            .collect(),
    };
    if json {
        return print_json(&report);
    }

    if !report.table.is_empty() {
        println!("Cross-reference table:");
        for row in &report.table {
            println!(
                "{:>6} {:010} {:05} {}",
                row.number,
                row.offset,
                row.generation,
                if row.in_use { "n" } else { "f" }
            );
        }
    }
    for stream in &report.streams {
        println!("Cross-reference stream {}:", stream.id);
        for entry in &stream.entries {
            println!("  {entry}");
        }
    }
    if report.table.is_empty() && report.streams.is_empty() {
        println!("No cross-reference data found");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let password = cli.password.as_deref();

    match cli.command {
        Commands::Info { input } => {
            let doc = open(&input, password)?;
            info_command(&input, &doc, cli.json)?;
        }

        Commands::Objects { input, type_filter } => {
            let doc = open(&input, password)?;
            objects_command(&doc, type_filter.as_deref(), cli.json)?;
        }

        Commands::Stream {
            input,
            number,
            generation,
            raw,
            stages,
            output,
        } => {
            let doc = open(&input, password)?;
            let request = StreamRequest {
                id: ObjectId::new(number, generation),
                raw,
                stages,
                output,
            };
            stream_command(&doc, request, cli.json)?;
        }

        Commands::Anomalies { input } => {
            let doc = open(&input, password)?;
            anomalies_command(&doc, cli.json)?;
        }

        Commands::Xref { input } => {
            let doc = open(&input, password)?;
            xref_command(&doc, cli.json)?;
        }
    }

    Ok(())
}
