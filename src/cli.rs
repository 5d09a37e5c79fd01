use crate::merge::ColumnSelection;
use crate::merge::DEFAULT_BATCH_ROWS;
use crate::merge::DEFAULT_SHEET_NAME;
use crate::merge::DuplicateKeyPolicy;
use crate::merge::MergeOptions;
use crate::task::InputSpec;
use crate::task::MergeRequest;
use anyhow::Result;
use anyhow::bail;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about = "Merge columns of several spreadsheets into one workbook", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the columns of a spreadsheet's header row
    Columns(ColumnsArgs),
    /// Merge selected columns of several spreadsheets into a new .xlsx file
    Merge(MergeArgs),
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    /// Spreadsheet to inspect (.xlsx, .xlsm, .xls, .xlsb, .ods)
    pub file: PathBuf,
    /// Worksheet to read instead of the active one
    #[arg(long)]
    pub sheet: Option<String>,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Input spreadsheets, in merge order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Output .xlsx file; replaced only once the merge succeeds
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Columns taken from one input as INDEX=COL,COL (1-based); `2=` takes none
    #[arg(short = 's', long = "select", action = clap::ArgAction::Append, value_parser = parse_selection)]
    pub select: Vec<(usize, Vec<String>)>,
    /// Worksheet of one input as INDEX=NAME (1-based)
    #[arg(long = "sheet", action = clap::ArgAction::Append, value_parser = parse_sheet)]
    pub sheets: Vec<(usize, String)>,
    /// Reference column aligning rows across inputs
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,
    /// Name of the output worksheet
    #[arg(long = "sheet-name", default_value = DEFAULT_SHEET_NAME)]
    pub sheet_name: String,
    /// Handling of a reference value repeated within one input
    #[arg(long = "on-duplicate", value_enum, default_value_t = OnDuplicate::Last)]
    pub on_duplicate: OnDuplicate,
    /// Rows processed between progress updates
    #[arg(long = "batch-rows", default_value_t = DEFAULT_BATCH_ROWS)]
    pub batch_rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OnDuplicate {
    /// Keep the last row
    Last,
    /// Keep the first row
    First,
    /// Fail the merge
    Reject,
}

impl From<OnDuplicate> for DuplicateKeyPolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::Last => DuplicateKeyPolicy::LastWins,
            OnDuplicate::First => DuplicateKeyPolicy::FirstWins,
            OnDuplicate::Reject => DuplicateKeyPolicy::Reject,
        }
    }
}

impl MergeArgs {
    pub fn to_request(&self) -> Result<MergeRequest> {
        let mut inputs = self.files.iter().map(InputSpec::new).collect::<Vec<_>>();
        let mut selected = vec![false; inputs.len()];

        for (index, columns) in &self.select {
            let position = self.input_position(*index, "--select")?;
            if selected[position] {
                bail!("Input {index} is selected more than once");
            }
            selected[position] = true;
            inputs[position].columns = ColumnSelection::Columns(columns.to_owned());
        }
        for (index, sheet) in &self.sheets {
            let position = self.input_position(*index, "--sheet")?;
            inputs[position].sheet = Some(sheet.to_owned());
        }

        let key = self
            .key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string);
        Ok(MergeRequest {
            inputs,
            key,
            output: self.output.to_owned(),
            options: MergeOptions {
                sheet_name: self.sheet_name.to_owned(),
                duplicate_keys: self.on_duplicate.into(),
                batch_rows: self.batch_rows,
            },
        })
    }

    fn input_position(&self, index: usize, flag: &str) -> Result<usize> {
        if index == 0 || index > self.files.len() {
            bail!("{flag} refers to input {index}, but only {} inputs were given", self.files.len());
        }
        Ok(index - 1)
    }
}

fn split_index(value: &str) -> Result<(usize, &str), String> {
    let (index, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected INDEX=VALUE but got '{value}'"))?;
    let index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| format!("Input index '{index}' is not a positive number"))?;
    Ok((index, rest))
}

pub fn parse_selection(value: &str) -> Result<(usize, Vec<String>), String> {
    let (index, columns) = split_index(value)?;
    let columns = columns
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(str::to_string)
        .collect();
    Ok((index, columns))
}

pub fn parse_sheet(value: &str) -> Result<(usize, String), String> {
    let (index, sheet) = split_index(value)?;
    if sheet.is_empty() {
        return Err("Sheet name cannot be empty".to_string());
    }
    Ok((index, sheet.to_string()))
}
