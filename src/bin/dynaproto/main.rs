//! dynaproto CLI
//!
//! Converts protobuf payloads to JSON and back using schemas supplied at
//! runtime.
//!
//! # Usage
//!
//! ```bash
//! # Decode a topic dump, fetching schemas from a schema registry
//! dynaproto dump records.bin --schema-registry https://registry:8081
//!
//! # Binary payload -> JSON
//! dynaproto to-json --proto animal.proto --type Animal payload.bin
//!
//! # JSON -> binary payload
//! echo '{"name":"Iguanodon"}' | dynaproto to-binary --proto animal.proto --type Animal > out.bin
//!
//! # Index path -> type name
//! dynaproto resolve --proto animal.proto --path 0,1
//! ```

mod schema_client;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dynaproto::dump::{annotate_record, DumpReader};
use dynaproto::{codec, framing, proto_parser, DecodeOptions, EncodeOptions, SchemaRegistry};
use tracing::info;
use tracing_subscriber::EnvFilter;

use schema_client::{HttpSchemaSource, SchemaRegistryClient, SchemaSource, MAIN_SCHEMA};

#[derive(Parser, Debug)]
#[command(name = "dynaproto")]
#[command(about = "Convert protobuf payloads to JSON and back using runtime schemas")]
#[command(version)]
struct Cli {
    /// Emit 64-bit integers as JSON strings
    #[arg(long, global = true)]
    int64_as_string: bool,

    /// Also emit unset fields with their default values
    #[arg(long, global = true)]
    emit_defaults: bool,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    /// Schema file to load
    #[arg(long)]
    proto: PathBuf,

    /// Extra directory to search for imports (repeatable)
    #[arg(short = 'I', long = "include")]
    include: Vec<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Decode a topic dump whose records carry framed payloads
    Dump {
        /// Dump file, "-" for stdin
        file: PathBuf,

        /// Base URL of the schema registry
        #[arg(long, env = "DYNAPROTO_SCHEMA_REGISTRY")]
        schema_registry: String,

        /// Accept invalid TLS certificates from the schema registry
        #[arg(long)]
        insecure: bool,
    },

    /// Convert a binary payload to JSON
    ToJson {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Fully qualified message type
        #[arg(long = "type")]
        type_name: String,

        /// Payload file (stdin when omitted)
        input: Option<PathBuf>,
    },

    /// Convert JSON to a binary payload
    ToBinary {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Fully qualified message type
        #[arg(long = "type")]
        type_name: String,

        /// Ignore JSON keys that name no field
        #[arg(long)]
        allow_unknown_fields: bool,

        /// JSON file (stdin when omitted)
        input: Option<PathBuf>,
    },

    /// Resolve a message index path to a type name
    Resolve {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Comma separated index path, e.g. 0,1
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, required = true)]
        path: Vec<i32>,
    },

    /// Print the outline of a message type
    Describe {
        #[command(flatten)]
        schema: SchemaArgs,

        /// Fully qualified message type
        #[arg(long = "type")]
        type_name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let encode_options = EncodeOptions {
        int64_as_string: cli.int64_as_string,
        emit_default_fields: cli.emit_defaults,
        pretty: cli.pretty,
    };

    match cli.command {
        Commands::Dump {
            file,
            schema_registry,
            insecure,
        } => cmd_dump(&file, &schema_registry, insecure, &encode_options),
        Commands::ToJson {
            schema,
            type_name,
            input,
        } => {
            let (registry, _) = load_registry(&schema)?;
            let payload = read_input(input.as_deref())?;
            let json = codec::payload_to_json_with_options(&registry, &type_name, &payload, &encode_options)?;
            println!("{json}");
            Ok(())
        }
        Commands::ToBinary {
            schema,
            type_name,
            allow_unknown_fields,
            input,
        } => {
            let (registry, _) = load_registry(&schema)?;
            let json = String::from_utf8(read_input(input.as_deref())?).context("input is not UTF-8")?;
            let options = DecodeOptions {
                deny_unknown_fields: !allow_unknown_fields,
            };
            let payload = codec::json_to_payload_with_options(&registry, &type_name, &json, &options)?;
            io::stdout().lock().write_all(&payload)?;
            Ok(())
        }
        Commands::Resolve { schema, path } => {
            let (registry, filename) = load_registry(&schema)?;
            println!("{}", registry.resolve_by_path(&filename, &path)?);
            Ok(())
        }
        Commands::Describe { schema, type_name } => {
            let (registry, _) = load_registry(&schema)?;
            let descriptor = registry.find_type(&type_name)?;
            let outline = proto_parser::describe_message(&descriptor);
            println!("{}", serde_json::to_string_pretty(&outline)?);
            Ok(())
        }
    }
}

fn cmd_dump(file: &Path, schema_registry: &str, insecure: bool, options: &EncodeOptions) -> Result<()> {
    let reader: Box<dyn BufRead> = if file == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let handle = File::open(file).with_context(|| format!("opening {}", file.display()))?;
        Box::new(BufReader::new(handle))
    };

    let mut client = SchemaRegistryClient::new(HttpSchemaSource::new(schema_registry, insecure)?);
    let count = write_dump(reader, &mut client, options, &mut io::stdout().lock())?;

    info!(records = count, "dump decoded");
    Ok(())
}

/// Decode every record of a dump, writing one annotated JSON line each.
fn write_dump<S: SchemaSource>(
    reader: impl BufRead,
    client: &mut SchemaRegistryClient<S>,
    options: &EncodeOptions,
    out: &mut impl Write,
) -> Result<usize> {
    let mut count = 0usize;

    for record in DumpReader::new(reader) {
        let record = record?;
        let context = || format!("record at offset {}", record.offset);

        let envelope = framing::parse_envelope(&record.value).with_context(context)?;
        let registry = client.registry_for_id(envelope.schema_id)?;
        let json = framing::envelope_to_json(registry, MAIN_SCHEMA, &envelope, options)
            .with_context(context)?;

        writeln!(out, "{}", annotate_record(&record, &json))?;
        count += 1;
    }

    Ok(count)
}

fn load_registry(schema: &SchemaArgs) -> Result<(SchemaRegistry, String)> {
    let mut registry = SchemaRegistry::new();
    let file = registry
        .add_schema_file(&schema.proto, &schema.include)
        .with_context(|| format!("loading {}", schema.proto.display()))?;
    let filename = file.name().to_string();
    Ok((registry, filename))
}

fn read_input(path: Option<&Path>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match path {
        Some(path) if path != Path::new("-") => {
            File::open(path)
                .and_then(|mut file| file.read_to_end(&mut buf))
                .with_context(|| format!("reading {}", path.display()))?;
        }
        _ => {
            io::stdin().lock().read_to_end(&mut buf).context("reading stdin")?;
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use dynaproto::framing::Envelope;

    use super::*;
    use crate::schema_client::tests::StaticSource;

    const READINGS: &str = r#"syntax = "proto3";
        message Header { string site = 1; }
        message Reading { int32 value = 1; }"#;

    fn record(offset: &str, key: &str, schema_id: u32, indexes: Vec<i32>, payload: &[u8]) -> Vec<u8> {
        let value = Envelope {
            schema_id,
            message_indexes: indexes,
            payload,
        }
        .to_bytes();

        let mut bytes = format!("{offset}\n{key}\n").into_bytes();
        bytes.extend_from_slice(&(value.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&value);
        bytes
    }

    #[test]
    fn dump_records_become_annotated_json_lines() {
        let mut stream = record("10", "sensor-1", 3, vec![1], &[0x08, 0x07]);
        stream.extend(record("11", "sensor-2", 3, vec![0], &[0x0A, 0x01, b'a']));

        let source = StaticSource::default().with_id(3, READINGS, &[]);
        let mut client = SchemaRegistryClient::new(source);
        let mut out = Vec::new();

        let count = write_dump(stream.as_slice(), &mut client, &EncodeOptions::default(), &mut out)
            .expect("dump should decode");

        assert_eq!(count, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"@offset\":10,\"@key\":\"sensor-1\",\"value\":7}\n\
             {\"@offset\":11,\"@key\":\"sensor-2\",\"site\":\"a\"}\n"
        );
    }

    #[test]
    fn dump_errors_name_the_failing_record() {
        let mut stream = record("10", "k", 3, vec![0], &[]);
        stream.extend(record("11", "k", 3, vec![5], &[]));

        let source = StaticSource::default().with_id(3, READINGS, &[]);
        let mut client = SchemaRegistryClient::new(source);
        let mut out = Vec::new();

        let err = write_dump(stream.as_slice(), &mut client, &EncodeOptions::default(), &mut out)
            .expect_err("index 5 does not exist");
        assert!(format!("{err:#}").contains("record at offset 11"));
        assert_eq!(String::from_utf8(out).unwrap(), "{\"@offset\":10,\"@key\":\"k\"}\n");
    }
}
