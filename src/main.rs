// Entry point and high-level CLI flow.
//
// - Load every input file (bad files are reported and skipped).
// - Build the report: classification, month filter, phase pivots, KPIs.
// - Print Markdown previews and write the workbook plus a JSON summary.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use td_fases::config::{DetectionStrategy, MonthBasis, ReportConfig};
use td_fases::loader::{self, LoadReport};
use td_fases::output;
use td_fases::pipeline::{build_report, Report};
use td_fases::reports::headline_message;
use td_fases::types::Table;
use td_fases::util::format_int;

#[derive(Parser, Debug)]
#[command(name = "td_fases")]
#[command(about = "Tablas dinámicas por fase (TD) from service-record spreadsheets", long_about = None)]
struct Cli {
    /// Input files: .xlsx, .xlsm, .xls, .ods or .csv
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Which month column defines the report month
    #[arg(long, value_enum)]
    month_basis: Option<MonthBasis>,

    /// Only keep these months (default: all). Repeat the flag or separate with commas
    #[arg(long, value_delimiter = ',')]
    months: Vec<String>,

    /// Phase column detection strategy
    #[arg(long, value_enum)]
    strategy: Option<DetectionStrategy>,

    /// JSON file with column roles and detection rules
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "td_tablas_fases.xlsx")]
    output: PathBuf,

    #[arg(long, default_value = "td_summary.json")]
    summary: PathBuf,

    /// Rows shown per table in the console preview
    #[arg(long, default_value_t = 3)]
    preview_rows: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file first, CLI flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<ReportConfig> {
    let mut cfg = match &cli.config {
        Some(path) => ReportConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if let Some(basis) = cli.month_basis {
        cfg.month_basis = basis;
    }
    if let Some(strategy) = cli.strategy {
        cfg.phases.strategy = strategy;
    }
    Ok(cfg)
}

fn handle_load(cli: &Cli, cfg: &ReportConfig) -> anyhow::Result<(Table, LoadReport)> {
    let (table, report) = loader::load_all(&cli.inputs, &cfg.sheet_name)?;
    println!(
        "Loaded {} file(s), {} rows.",
        format_int(report.files_loaded),
        format_int(report.total_rows)
    );
    for (path, reason) in &report.failures {
        println!("Skipped {}: {}", path.display(), reason);
    }
    println!();
    Ok((table, report))
}

fn print_previews(report: &Report, rows: usize) {
    println!("{}\n", headline_message(&report.headline));

    println!("Tablas dinámicas por Fase (formato TD)\n");
    if report.detection.is_empty() {
        println!("No se detectaron columnas de Fase a partir de la columna inicial.\n");
    }
    for pivot in &report.pivots {
        println!("{}", pivot.phase_column);
        output::preview_pivot(pivot, rows);
    }

    println!("KPI por Mes del Servicio (basado en Estado de Factura)\n");
    output::preview_table_rows(&report.kpi_mes, rows);
    println!("Facturado / No Facturado por Mes\n");
    output::preview_table_rows(&report.fact_nofact, rows);
}

/// Write both artifacts; one failing does not stop the other.
/// Returns how many were written.
fn handle_export(workbook: &Path, summary: &Path, report: &Report) -> usize {
    let mut written = 0;
    match output::write_workbook(workbook, report) {
        Ok(()) => {
            println!("(Full tables exported to {})", workbook.display());
            written += 1;
        }
        Err(e) => eprintln!("Write error: {}", e),
    }
    match output::write_json(summary, &report.summary()) {
        Ok(()) => {
            println!("(Summary exported to {})", summary.display());
            written += 1;
        }
        Err(e) => eprintln!("Write error: {}", e),
    }
    written
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let cfg = load_config(cli)?;
    let (table, _) = handle_load(cli, &cfg)?;
    let report = build_report(table, &cfg, &cli.months);
    print_previews(&report, cli.preview_rows);
    if handle_export(&cli.output, &cli.summary, &report) == 0 {
        anyhow::bail!("no output could be written");
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
