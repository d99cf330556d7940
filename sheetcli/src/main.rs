use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::debug;
use serde_json::{Value, json};
use sheetread::{CellValue, Number, ReaderConfig, SheetVisibility, Workbook, Worksheet};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sheetcli")]
#[command(about = "Inspect XLSX and XLS workbooks", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List sheet names in declaration order
    Sheets {
        /// Path to the workbook
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print decoded cell values
    Dump {
        /// Path to the workbook
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Only dump these sheets (repeatable)
        #[arg(long = "sheet", value_name = "NAME")]
        sheets: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Key rows by the first row instead of emitting a plain grid
        #[arg(long)]
        records: bool,

        /// Reader options in TOML
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON document with one entry per sheet
    Json,
    /// Comma-separated values of a single sheet
    Csv,
}

fn main() -> Result<()> {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::Builder::from_env(env_logger::Env::default())
            .target(env_logger::Target::Stderr)
            .init();
    }

    let cli = Cli::parse();
    match cli.command {
        Command::Sheets { file } => {
            let names = sheetread::list_sheet_names(&file)
                .with_context(|| format!("Failed to read file: {}", file.display()))?;
            for name in names {
                println!("{name}");
            }
        }
        Command::Dump {
            file,
            sheets,
            format,
            records,
            config,
        } => {
            let config = reader_config(config.as_deref(), sheets)?;
            let workbook = sheetread::load_with_config(&file, &config)
                .with_context(|| format!("Failed to read file: {}", file.display()))?;
            debug!(
                "{} sheet(s) decoded from {}",
                workbook.sheet_count(),
                workbook.source()
            );
            match format {
                OutputFormat::Json => {
                    let output = workbook_json(&workbook, records);
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Csv => write_csv(&workbook, records, io::stdout())?,
            }
        }
    }
    Ok(())
}

fn reader_config(path: Option<&Path>, sheets: Vec<String>) -> Result<ReaderConfig> {
    let mut config = match path {
        Some(path) => ReaderConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => ReaderConfig::default(),
    };
    if !sheets.is_empty() {
        config.sheets = Some(sheets);
    }
    Ok(config)
}

fn value_json(value: &CellValue) -> Value {
    match value {
        CellValue::Empty => Value::Null,
        CellValue::Text(s) => json!(s),
        CellValue::Number(Number::Int(i)) => json!(i),
        CellValue::Number(Number::Float(f)) => json!(f),
        CellValue::Boolean(b) => json!(b),
        CellValue::Temporal(_) => json!(value.to_string()),
        CellValue::FormulaCached(inner) => value_json(inner),
    }
}

fn visibility_name(visibility: SheetVisibility) -> &'static str {
    match visibility {
        SheetVisibility::Visible => "visible",
        SheetVisibility::Hidden => "hidden",
        SheetVisibility::VeryHidden => "very_hidden",
    }
}

fn sheet_json(sheet: &Worksheet, records: bool) -> Value {
    let rows: Vec<Value> = if records {
        sheet
            .to_associative_array()
            .iter()
            .map(|record| {
                let object: serde_json::Map<String, Value> = record
                    .iter()
                    .map(|(key, value)| (key.clone(), value_json(value)))
                    .collect();
                Value::Object(object)
            })
            .collect()
    } else {
        sheet
            .to_array()
            .iter()
            .map(|row| Value::Array(row.iter().map(value_json).collect()))
            .collect()
    };
    json!({
        "name": sheet.name(),
        "index": sheet.index(),
        "visibility": visibility_name(sheet.visibility()),
        "rows": rows,
    })
}

fn workbook_json(workbook: &Workbook, records: bool) -> Value {
    json!({
        "source": workbook.source(),
        "sheets": workbook.sheets().map(|s| sheet_json(s, records)).collect::<Vec<_>>(),
    })
}

fn write_csv<W: io::Write>(workbook: &Workbook, records: bool, out: W) -> Result<()> {
    let mut sheets = workbook.sheets();
    let sheet = sheets.next().context("No sheets to dump")?;
    if sheets.next().is_some() {
        anyhow::bail!("CSV output holds a single sheet. Pick one with --sheet <NAME>.");
    }

    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);
    if records {
        let rows = sheet.to_associative_array();
        if let Some(first) = rows.first() {
            writer.write_record(first.iter().map(|(key, _)| key.as_str()))?;
        }
        for row in &rows {
            writer.write_record(row.iter().map(|(_, value)| value.to_string()))?;
        }
    } else {
        for row in sheet.to_array() {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
    }
    writer.flush()?;
    Ok(())
}
