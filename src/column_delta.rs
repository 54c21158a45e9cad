use super::error::{DeltaError, DeltaResult, ParseError};
use super::utils::{is_blank, parse_finite, read_lines, trunc_to_int, write_text};
use super::VERSION;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Zero-based indices of the columns holding cumulative values.
/// The order given by the user is kept: the first index is the one probed for a header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSelection {
    indices: Vec<usize>,
}

impl ColumnSelection {
    /// Build a selection, dropping repeated indices.
    pub fn new(indices: Vec<usize>) -> ColumnSelection {
        let mut unique: Vec<usize> = Vec::with_capacity(indices.len());
        for i in indices {
            if !unique.contains(&i) {
                unique.push(i);
            }
        }
        ColumnSelection { indices: unique }
    }

    pub fn contains(&self, column: usize) -> bool {
        self.indices.contains(&column)
    }

    pub fn first(&self) -> Option<usize> {
        self.indices.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }
}

impl FromStr for ColumnSelection {
    type Err = String;

    /// Parse "1,2" style lists; an empty string is an empty selection.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(ColumnSelection::default());
        }
        let indices = s
            .split(',')
            .map(|f| {
                f.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("invalid column index '{}': {}", f, e))
            })
            .collect::<Result<Vec<usize>, String>>()?;
        Ok(ColumnSelection::new(indices))
    }
}

/// The transformed table: the optional header line and the rows with deltas in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaTable {
    pub header: Option<String>,
    pub rows: Vec<Vec<String>>,
}

impl DeltaTable {
    /// Header first, then one comma-joined line per row, each newline terminated.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(h) = &self.header {
            out.push_str(h);
            out.push('\n');
        }
        for row in self.rows.iter() {
            out.push_str(&row.join(","));
            out.push('\n');
        }
        out
    }
}

/// Detect the header: the first line is a header when the cell
/// of the first selected column does not parse as a number (or is missing).
fn is_header(line: &str, column: usize) -> bool {
    match line.split(',').nth(column) {
        Some(cell) => cell.trim().parse::<f64>().is_err(),
        None => true,
    }
}

/// Replace the selected cumulative columns with row-over-row integer deltas.
/// Blank lines are dropped, the first data row is a delta from zero,
/// non-selected cells are passed through untouched.
/// A selected cell that is not a finite number stops the transform.
pub fn delta_transform<S>(lines: &[S], selection: &ColumnSelection) -> Result<DeltaTable, ParseError>
where
    S: AsRef<str>,
{
    let data: Vec<(usize, &str)> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| (i + 1, l.as_ref()))
        .filter(|(_, l)| !is_blank(l))
        .collect();

    let header = match (data.first(), selection.first()) {
        (Some((_, l)), Some(c)) if is_header(l, c) => Some(l.to_string()),
        _ => None,
    };
    let body = if header.is_some() { &data[1..] } else { &data[..] };
    debug!(
        "header {}, {} data rows",
        if header.is_some() { "found" } else { "not found" },
        body.len()
    );

    let mut previous: Option<Vec<Option<f64>>> = None;
    let mut rows: Vec<Vec<String>> = Vec::with_capacity(body.len());
    for (line_no, line) in body.iter() {
        let cells: Vec<&str> = line.split(',').collect();
        let mut current: Vec<Option<f64>> = Vec::with_capacity(cells.len());
        let mut row: Vec<String> = Vec::with_capacity(cells.len());
        for (j, cell) in cells.iter().enumerate() {
            if !selection.contains(j) {
                current.push(None);
                row.push(cell.to_string());
                continue;
            }
            let value = parse_finite(cell).ok_or_else(|| {
                ParseError::new(*line_no, "could not parse cumulative value as a number")
                    .with_column(j)
                    .with_value(*cell)
            })?;
            let base = match &previous {
                None => 0.,
                Some(p) => p.get(j).copied().flatten().ok_or_else(|| {
                    ParseError::new(*line_no, "previous row has no value for this column")
                        .with_column(j)
                })?,
            };
            let delta = trunc_to_int(value - base).ok_or_else(|| {
                ParseError::new(*line_no, "delta does not fit a 64-bit integer")
                    .with_column(j)
                    .with_value(*cell)
            })?;
            current.push(Some(value));
            row.push(delta.to_string());
        }
        rows.push(row);
        previous = Some(current);
    }
    Ok(DeltaTable { header, rows })
}

/// Inverse of the delta: running sum starting from the first value.
pub fn cumulative_sum(deltas: &[i64]) -> Vec<i64> {
    deltas
        .iter()
        .scan(0i64, |acc, d| {
            *acc += d;
            Some(*acc)
        })
        .collect()
}

/// Resolved command line of the delta app.
#[derive(Debug, Clone)]
pub struct DeltaArgs {
    pub csvin: Option<PathBuf>,
    pub csvout: Option<PathBuf>,
    pub fields: ColumnSelection,
    pub verbose: bool,
}

/// The clap command, also used to print the usage when no fields are given.
pub fn build_cli() -> Command {
    let arg_input = Arg::new("input")
        .help("input csv file, standard input if not given")
        .short('i')
        .long("input")
        .num_args(1)
        .value_parser(value_parser!(PathBuf));
    let arg_output = Arg::new("output")
        .help("output csv file, standard output if not given")
        .short('o')
        .long("output")
        .num_args(1)
        .value_parser(value_parser!(PathBuf));
    let arg_fields = Arg::new("fields")
        .help("comma separated zero-based indices of the cumulative columns, e.g. -f \"1,2\"")
        .short('f')
        .long("fields")
        .num_args(1)
        .value_parser(ColumnSelection::from_str);
    let arg_verbose = Arg::new("verbose")
        .help("print verbose information")
        .short('v')
        .long("verbose")
        .action(ArgAction::SetTrue);
    Command::new("column_delta")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to turn cumulative csv columns into row-over-row deltas")
        .arg(arg_input)
        .arg(arg_output)
        .arg(arg_fields)
        .arg(arg_verbose)
}

fn args_from_matches(cli_args: &ArgMatches) -> DeltaArgs {
    DeltaArgs {
        csvin: cli_args.get_one::<PathBuf>("input").cloned(),
        csvout: cli_args.get_one::<PathBuf>("output").cloned(),
        fields: cli_args
            .get_one::<ColumnSelection>("fields")
            .cloned()
            .unwrap_or_default(),
        verbose: cli_args.get_flag("verbose"),
    }
}

/// Takes the CLI arguments; on a parsing error clap prints the usage and exits with 2.
pub fn parse_cli() -> DeltaArgs {
    args_from_matches(&build_cli().get_matches())
}

/// Same as [`parse_cli`] but from an explicit argument list, without exiting.
pub fn try_parse_cli_from<I, T>(args: I) -> Result<DeltaArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli_args = build_cli().try_get_matches_from(args)?;
    Ok(args_from_matches(&cli_args))
}

/// Read and transform according to the resolved arguments.
/// The table is written to the output file when one is given and an empty string is returned,
/// otherwise the table is returned for stdout.
pub fn run(args: &DeltaArgs) -> DeltaResult<String> {
    let lines = read_lines(args.csvin.as_ref()).map_err(|source| DeltaError::Io {
        path: args.csvin.clone(),
        source,
    })?;
    info!(
        "read {} lines from {}",
        lines.len(),
        args.csvin
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdin".to_string())
    );
    let table = delta_transform(&lines, &args.fields)?;
    match &args.csvout {
        Some(p) => {
            write_text(Some(p), &table.render()).map_err(|source| DeltaError::Io {
                path: Some(p.clone()),
                source,
            })?;
            info!("saved {} rows to {}", table.rows.len(), p.display());
            Ok(String::new())
        }
        None => Ok(table.render()),
    }
}

/// Run the app: returns what goes to stdout and the process exit code.
/// Without fields the usage is shown and nothing is read.
pub fn execute(args: &DeltaArgs) -> (String, i32) {
    if args.fields.is_empty() {
        return (format!("{}\n", build_cli().render_help()), 0);
    }
    match run(args) {
        Ok(text) => (text, 0),
        Err(e) => {
            error!("{}", e);
            (String::new(), 1)
        }
    }
}
