//! Command-line interface for schemaxml

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::fs;
#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::rc::Rc;
#[cfg(feature = "cli")]
use std::sync::Arc;

#[cfg(feature = "cli")]
use schemaxml::{diff_schema, import_xsd, merge_schema, BuildOptions, Builder, Fixture, Location, SchemaNode};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "schemaxml")]
#[command(author, version, about = "Schema-driven XML generation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an XSD into a generation schema (JSON)
    Import {
        /// Path, file:// URL or inline text of the XSD
        #[arg(value_name = "XSD")]
        xsd: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge two schemas, the second extending the first
    Merge {
        /// Base schema
        #[arg(value_name = "BASE")]
        base: PathBuf,

        /// Schema merged into the base
        #[arg(value_name = "OVERLAY")]
        overlay: PathBuf,

        /// Leave #comment notes where the schemas disagree
        #[arg(long)]
        diff: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two schemas; exits with status 1 when they differ
    Diff {
        /// First schema
        #[arg(value_name = "A")]
        a: PathBuf,

        /// Second schema
        #[arg(value_name = "B")]
        b: PathBuf,
    },

    /// Generate the XML document for an entity
    Build {
        /// Generation schema (JSON)
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Entity fixture (JSON)
        #[arg(short, long, value_name = "FILE")]
        entity: PathBuf,

        /// Document name used in error messages (defaults to the schema file name)
        #[arg(short, long)]
        name: Option<String>,

        /// Insert an empty element in place of a missing required value
        #[arg(long)]
        force_empty_values: bool,

        /// Log occurrence and missing-field errors instead of failing
        #[arg(long)]
        suppress_errors: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import { xsd, output } => cmd_import(xsd, output),
        Commands::Merge {
            base,
            overlay,
            diff,
            output,
        } => cmd_merge(base, overlay, diff, output),
        Commands::Diff { a, b } => cmd_diff(a, b),
        Commands::Build {
            schema,
            entity,
            name,
            force_empty_values,
            suppress_errors,
            output,
        } => cmd_build(schema, entity, name, force_empty_values, suppress_errors, output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "cli")]
fn read_schema(path: &Path) -> Result<SchemaNode, Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    Ok(SchemaNode::from_json(&text)?)
}

#[cfg(feature = "cli")]
fn write_output(text: &str, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    match output {
        Some(path) => fs::write(&path, text)?,
        None => print!("{}", text),
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_import(xsd: String, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let location = Location::parse(&xsd)?;
    let schema = import_xsd(&location)?;
    write_output(&format!("{}\n", schema.to_json_pretty()?), output)
}

#[cfg(feature = "cli")]
fn cmd_merge(
    base: PathBuf,
    overlay: PathBuf,
    diff: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = read_schema(&base)?;
    let overlay = read_schema(&overlay)?;
    let merged = if diff {
        schemaxml::schema::merge_schema_annotated(&base, &overlay)?
    } else {
        merge_schema(&base, &overlay)?
    };
    write_output(&format!("{}\n", merged.to_json_pretty()?), output)
}

#[cfg(feature = "cli")]
fn cmd_diff(a: PathBuf, b: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let a = read_schema(&a)?;
    let b = read_schema(&b)?;
    let diff = diff_schema(&a, &b);
    println!("{}", diff);
    if !diff.is_equal() {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn cmd_build(
    schema_path: PathBuf,
    entity: PathBuf,
    name: Option<String>,
    force_empty_values: bool,
    suppress_errors: bool,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = read_schema(&schema_path)?;
    let fixture = Fixture::from_file(&entity)?;
    let name = name.unwrap_or_else(|| {
        schema_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string())
    });

    let options = BuildOptions::new()
        .with_force_empty_values(force_empty_values)
        .with_suppress_errors(suppress_errors);
    let mut builder = Builder::new(name, Arc::new(schema), options).with_relations(Rc::new(fixture.relations));
    let xml = builder.build(fixture.root)?;

    if !builder.warnings().is_empty() {
        eprintln!("{} warning(s) while building", builder.warnings().len());
    }
    write_output(&xml, output)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
