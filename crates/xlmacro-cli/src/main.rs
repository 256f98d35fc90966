//! xlmacro CLI - run a macro in Excel, stamp a footer, export PDF

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;
use xlmacro::{ExcelBridge, ExcelBridgeConfig, ExportJob, FooterPosition, SheetRef};

/// Without arguments, uses `Workbook.xlsx`, `TestMacro.macro` and
/// `Workbook.pdf` next to the executable.
#[derive(Parser)]
#[command(name = "xlmacro")]
#[command(
    author,
    version,
    about = "Run a VBA macro in Excel and export the workbook as PDF"
)]
struct Cli {
    /// Workbook to open
    #[arg(long)]
    workbook: Option<PathBuf>,

    /// VBA module file to import into the workbook
    #[arg(long = "macro-file")]
    macro_file: Option<PathBuf>,

    /// Sub to run inside the imported module
    #[arg(long = "macro-name")]
    macro_name: Option<String>,

    /// PDF to write (replaced if it exists)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Worksheet that gets the footer: 0-based index or name
    #[arg(short, long, default_value = "0")]
    sheet: String,

    /// Which footer to set
    #[arg(long, value_enum, default_value_t = Footer::Center)]
    footer: Footer,

    /// Open the PDF once it is written. Interactive Excel export scripts
    /// usually do; xlmacro leaves it off for unattended runs
    #[arg(long)]
    open: bool,

    /// Path to excel-com-bridge.exe
    #[arg(long)]
    bridge_exe: Option<PathBuf>,

    /// Program used to launch the bridge (default: wine on Linux)
    #[arg(long)]
    launcher: Option<PathBuf>,

    /// Run the bridge executable directly instead of through a launcher
    #[arg(long, conflicts_with = "launcher")]
    no_launcher: bool,

    /// WINEPREFIX for the bridge process
    #[arg(long)]
    wine_prefix: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Footer {
    Left,
    Center,
    Right,
}

impl From<Footer> for FooterPosition {
    fn from(footer: Footer) -> Self {
        match footer {
            Footer::Left => FooterPosition::Left,
            Footer::Center => FooterPosition::Center,
            Footer::Right => FooterPosition::Right,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let base_dir = exe_dir()?;
    let job = build_job(&cli, &base_dir);

    let mut config = ExcelBridgeConfig {
        bridge_exe_path: cli.bridge_exe.clone(),
        wine_prefix: cli.wine_prefix.clone(),
        ..Default::default()
    };
    if cli.no_launcher {
        config.launcher = None;
    } else if let Some(launcher) = &cli.launcher {
        config.launcher = Some(launcher.clone());
    }

    let bridge = ExcelBridge::start(config).context("Failed to start the Excel COM bridge")?;

    let outcome = job.run(&bridge);
    let shutdown = bridge.shutdown();

    let report = outcome.with_context(|| {
        format!(
            "Export of '{}' failed",
            job.workbook_path.display()
        )
    })?;
    if let Err(e) = shutdown {
        tracing::warn!(error = %e, "Bridge did not shut down cleanly");
    }

    tracing::info!(
        macro_name = %report.macro_name,
        footer = %report.footer,
        "Wrote '{}'",
        report.output_path.display()
    );
    Ok(())
}

fn build_job(cli: &Cli, base_dir: &Path) -> ExportJob {
    let mut job = ExportJob::in_dir(base_dir);
    if let Some(path) = &cli.workbook {
        job.workbook_path = path.clone();
    }
    if let Some(path) = &cli.macro_file {
        job.macro_path = path.clone();
    }
    if let Some(name) = &cli.macro_name {
        job.entry_point = name.clone();
    }
    if let Some(path) = &cli.output {
        job.output_path = path.clone();
    }
    job.sheet = parse_sheet(&cli.sheet);
    job.footer_position = cli.footer.into();
    job.open_after_publish = cli.open;
    job
}

fn parse_sheet(s: &str) -> SheetRef {
    match s.parse::<u32>() {
        Ok(index) => SheetRef::Index(index),
        Err(_) => SheetRef::Name(s.to_string()),
    }
}

/// Directory holding the running executable; default inputs live there.
fn exe_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("'{}' has no parent directory", exe.display()))
}
