//! # Sheet Merge
//!
//! Merges selected columns of several spreadsheets into one new `.xlsx`
//! workbook, keeping the values and cell formatting of every source cell.
//!
//! ## Features
//!
//! - **Multi-format input**: Excel files (`.xlsx`, `.xlsm`, `.xltx`, `.xltm`)
//!   with their cell formats, plus `.xls`, `.xla`, `.xlsb` and `.ods` values
//! - **Keyed alignment**: rows of all inputs are matched on a reference
//!   column, one output row per distinct reference value
//! - **Positional alignment**: without a reference column, row *i* of every
//!   input lands on output row *i*
//! - **Formatting preserved**: fonts, fills, borders, alignment, number
//!   formats and column widths are carried over
//! - **Safe output**: the destination is replaced only after a complete save
//! - **Background jobs**: progress reports and cooperative cancellation
//!
//! ## Example
//!
//! ```no_run
//! use sheet_merge::{run_merge, CancellationToken, ColumnSelection, InputSpec, MergeOptions, MergeRequest};
//!
//! let request = MergeRequest {
//!     inputs: vec![
//!         InputSpec::new("people.xlsx"),
//!         InputSpec::new("scores.xls").with_columns(ColumnSelection::columns(["score"])),
//!     ],
//!     key: Some("id".to_string()),
//!     output: "merged.xlsx".into(),
//!     options: MergeOptions::default(),
//! };
//! let report = run_merge(&request, &CancellationToken::new(), &mut |_| ())?;
//! println!("{}", report.summary());
//! # Ok::<(), sheet_merge::MergeError>(())
//! ```

pub mod cli;
pub mod error;
mod helpers;
pub mod merge;
pub mod progress;
pub mod report;
pub mod spreadsheet;
pub mod task;
pub mod writer;

pub use crate::error::MergeError;
pub use crate::merge::ColumnSelection;
pub use crate::merge::DuplicateKeyPolicy;
pub use crate::merge::MergeOptions;
pub use crate::merge::MergedTable;
pub use crate::merge::merge_tables;
pub use crate::merge::validate;
pub use crate::progress::CancellationToken;
pub use crate::progress::Progress;
pub use crate::progress::Stage;
pub use crate::report::DataWarning;
pub use crate::report::MergeReport;
pub use crate::spreadsheet::table::LoadOptions;
pub use crate::spreadsheet::table::SourceTable;
pub use crate::spreadsheet::table::TableInfo;
pub use crate::spreadsheet::table::inspect;
pub use crate::task::InputSpec;
pub use crate::task::MergeRequest;
pub use crate::task::MergeTask;
pub use crate::task::TaskHandle;
pub use crate::task::TaskStatus;
pub use crate::task::run as run_merge;

use crate::cli::Cli;
use crate::cli::ColumnsArgs;
use crate::cli::Commands;
use crate::cli::MergeArgs;
use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use log::debug;
use log::info;
use std::env;
use std::sync::OnceLock;

static LOGGER: OnceLock<()> = OnceLock::new();

pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sheet_merge", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// Entry point of the `sheet-merge` binary.
pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Columns(args) => handle_columns(&args),
        Commands::Merge(args) => handle_merge(&args),
    }
}

fn handle_columns(args: &ColumnsArgs) -> Result<()> {
    let options = LoadOptions {
        sheet: args.sheet.to_owned(),
    };
    let info = inspect(&args.file, &options)?;
    println!(
        "Sheet '{}' of '{}' ({} data rows)",
        info.sheet,
        info.path.display(),
        info.rows
    );
    if info.sheets.len() > 1 {
        println!("Other sheets: {}", info.sheets.iter().filter(|sheet| **sheet != info.sheet).cloned().collect::<Vec<_>>().join(", "));
    }
    for (letter, name) in &info.columns {
        println!("{letter}\t{name}");
    }
    Ok(())
}

fn handle_merge(args: &MergeArgs) -> Result<()> {
    let request = args.to_request()?;
    info!(
        "Merging {} inputs into '{}'{}",
        request.inputs.len(),
        request.output.display(),
        request
            .key
            .as_deref()
            .map(|key| format!(" by '{key}'"))
            .unwrap_or_default()
    );
    let token = CancellationToken::new();
    let report = task::run(&request, &token, &mut |progress| debug!("{progress}"))?;
    println!("{}", report.summary());
    Ok(())
}
