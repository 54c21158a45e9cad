use super::error::{
    MalformedLineError, ParseError, ReaggregateError, ReaggregateResult, ValidationMismatch,
};
use super::utils::{format_float, is_blank, parse_finite, read_lines, trunc_to_int};
use super::VERSION;
use chrono::prelude::*;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

pub const DEFAULT_DAILY_CSV: &str = "./data/california-cases-per-day.csv";
pub const DEFAULT_WEEKLY_CSV: &str = "./data/california-cases-per-week.csv";
pub const ENV_DAILY_CSV: &str = "CASECOUNT_DAILY_CSV";
pub const ENV_WEEKLY_CSV: &str = "CASECOUNT_WEEKLY_CSV";
const DATE_FMT: &str = "%Y-%m-%d";

/// Paths and anchor dates of the reaggregator.
/// The defaults are the published California files,
/// validated from 2020-01-22; 2020-01-27 is the suggested anchor for the cumulative series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekConfig {
    pub input: PathBuf,
    pub reference: PathBuf,
    pub validation_anchor: NaiveDate,
    pub cumulative_anchor: NaiveDate,
}

impl Default for WeekConfig {
    fn default() -> WeekConfig {
        WeekConfig {
            input: PathBuf::from(DEFAULT_DAILY_CSV),
            reference: PathBuf::from(DEFAULT_WEEKLY_CSV),
            validation_anchor: NaiveDate::from_ymd_opt(2020, 1, 22)
                .expect("constant anchor date is valid"),
            cumulative_anchor: NaiveDate::from_ymd_opt(2020, 1, 27)
                .expect("constant anchor date is valid"),
        }
    }
}

impl WeekConfig {
    /// Defaults, with the input and reference paths taken from the environment when set.
    pub fn from_env() -> WeekConfig {
        let mut config = WeekConfig::default();
        if let Ok(p) = std::env::var(ENV_DAILY_CSV) {
            config.input = PathBuf::from(p);
        }
        if let Ok(p) = std::env::var(ENV_WEEKLY_CSV) {
            config.reference = PathBuf::from(p);
        }
        config
    }
}

/// Which number ends up after the date in the weekly lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Window closing value minus the previous one, truncated to an integer.
    Delta,
    /// Window closing value as read.
    Cumulative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    pub line: usize,
    pub date: NaiveDate,
    /// The date as written in the input, used as window label.
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Blank,
    Row(DailyRow),
    Malformed(MalformedLineError),
}

/// Parse one `date,value` line.
/// A wrong number of fields is reported, not fatal; a bad date or value is fatal.
pub fn parse_row(line_no: usize, line: &str) -> Result<ParsedLine, ParseError> {
    if is_blank(line) {
        return Ok(ParsedLine::Blank);
    }
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() != 2 {
        return Ok(ParsedLine::Malformed(MalformedLineError {
            line: line_no,
            fields: fields.len(),
            text: line.to_string(),
        }));
    }
    let label = fields[0].trim();
    let date = NaiveDate::parse_from_str(label, DATE_FMT).map_err(|e| {
        ParseError::new(line_no, format!("could not parse date: {}", e))
            .with_column(0)
            .with_value(label)
    })?;
    let value = parse_finite(fields[1]).ok_or_else(|| {
        ParseError::new(line_no, "could not parse cumulative value")
            .with_column(1)
            .with_value(fields[1].trim())
    })?;
    Ok(ParsedLine::Row(DailyRow {
        line: line_no,
        date,
        label: label.to_string(),
        value,
    }))
}

/// One completed week.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyPoint {
    pub label: String,
    pub delta: i64,
    pub cumulative: f64,
}

/// Both weekly streams of a run, plus the lines that were skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeeklySeries {
    pub points: Vec<WeeklyPoint>,
    pub diagnostics: Vec<MalformedLineError>,
}

impl WeeklySeries {
    pub fn lines(&self, mode: OutputMode) -> Vec<String> {
        self.points
            .iter()
            .map(|p| match mode {
                OutputMode::Delta => format!("{},{}", p.label, p.delta),
                OutputMode::Cumulative => format!("{},{}", p.label, format_float(p.cumulative)),
            })
            .collect()
    }

    /// Newline terminated `date,value` lines.
    pub fn render(&self, mode: OutputMode) -> String {
        self.lines(mode).iter().map(|l| format!("{}\n", l)).collect()
    }
}

/// Bucket daily cumulative values into 7-day windows starting at the anchor.
///
/// A window closes on the first row dated on or after its boundary;
/// its closing value is the last value seen *before* that row.
/// The first closed window only primes the previous value and is not emitted.
/// Emitted weeks are labelled with the date that opened them.
pub fn reaggregate<S>(lines: &[S], anchor: NaiveDate) -> Result<WeeklySeries, ParseError>
where
    S: AsRef<str>,
{
    let mut series = WeeklySeries::default();
    let mut boundary = anchor;
    let mut label = anchor.format(DATE_FMT).to_string();
    let mut last_seen = 0.;
    let mut closing = 0.;
    let mut primed = false;

    for (i, line) in lines.iter().enumerate() {
        let row = match parse_row(i + 1, line.as_ref())? {
            ParsedLine::Blank => continue,
            ParsedLine::Malformed(m) => {
                warn!("error -- {}", m);
                series.diagnostics.push(m);
                continue;
            }
            ParsedLine::Row(r) => r,
        };
        if row.date >= boundary {
            let previous = closing;
            closing = last_seen;
            if primed {
                let delta = trunc_to_int(closing - previous).ok_or_else(|| {
                    ParseError::new(row.line, "weekly delta does not fit a 64-bit integer")
                        .with_column(1)
                })?;
                series.points.push(WeeklyPoint {
                    label: label.clone(),
                    delta,
                    cumulative: closing,
                });
            } else {
                primed = true;
            }
            if row.date > boundary {
                debug!("boundary {} skipped, closed by {}", boundary, row.label);
            }
            while boundary <= row.date {
                boundary += chrono::Duration::weeks(1);
            }
            label = row.label;
        }
        last_seen = row.value;
    }
    debug!(
        "{} weeks, {} malformed lines",
        series.points.len(),
        series.diagnostics.len()
    );
    Ok(series)
}

/// Outcome of comparing a generated series with the reference lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub generated_len: usize,
    pub reference_len: usize,
    pub mismatch: Option<ValidationMismatch>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Compare line by line up to the longer of the two sequences,
/// stopping at the first difference; a missing line counts as a difference.
pub fn validate_lines<A, B>(generated: &[A], reference: &[B]) -> ValidationReport
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    let n = generated.len().max(reference.len());
    let mismatch = (0..n).find_map(|k| {
        let actual = generated.get(k).map(|l| l.as_ref());
        let expected = reference.get(k).map(|l| l.as_ref());
        if actual == expected {
            None
        } else {
            Some(ValidationMismatch {
                index: k,
                expected: expected.map(str::to_owned),
                actual: actual.map(str::to_owned),
            })
        }
    });
    ValidationReport {
        generated_len: generated.len(),
        reference_len: reference.len(),
        mismatch,
    }
}

pub fn parse_anchor(s: &str) -> ReaggregateResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FMT)
        .map_err(|_| ReaggregateError::InvalidAnchor(s.to_string()))
}

fn read_input(path: &Path) -> ReaggregateResult<Vec<String>> {
    read_lines(Some(path)).map_err(|source| ReaggregateError::Io {
        path: Some(path.to_path_buf()),
        source,
    })
}

/// Recompute the weekly deltas from the daily input and check them against the reference file.
pub fn run_validation(config: &WeekConfig) -> ReaggregateResult<ValidationReport> {
    info!(
        "validate {:?} against {:?} from {}",
        config.input, config.reference, config.validation_anchor
    );
    let daily = read_input(&config.input)?;
    let series = reaggregate(&daily, config.validation_anchor)?;
    let reference = read_input(&config.reference)?;
    let report = validate_lines(&series.lines(OutputMode::Delta), &reference);
    if let Some(m) = &report.mismatch {
        warn!(
            "mismatch at line {}: generated {:?}, reference {:?}",
            m.index, m.actual, m.expected
        );
    }
    Ok(report)
}

/// Weekly cumulative series of the configured input, anchored at the given date.
pub fn run_cumulative(config: &WeekConfig, anchor: NaiveDate) -> ReaggregateResult<String> {
    info!("weekly cumulative series of {:?} from {}", config.input, anchor);
    let daily = read_input(&config.input)?;
    let series = reaggregate(&daily, anchor)?;
    Ok(series.render(OutputMode::Cumulative))
}

/// What the reaggregator was asked to do, decided by the number of positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaggregateMode {
    Validate,
    Cumulative(String),
    Usage,
}

pub fn build_cli() -> Command {
    let arg_anchor = Arg::new("anchor")
        .help("anchor date YYYY-MM-DD for the weekly cumulative series; validate when omitted")
        .num_args(0..)
        .allow_hyphen_values(true)
        .value_parser(value_parser!(String));
    Command::new("reaggregate_by_week")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to reaggregate daily cumulative counts by week")
        .arg(arg_anchor)
}

fn mode_from_matches(cli_args: &ArgMatches) -> ReaggregateMode {
    let anchors: Vec<String> = cli_args
        .get_many::<String>("anchor")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    match anchors.as_slice() {
        [] => ReaggregateMode::Validate,
        [a] => ReaggregateMode::Cumulative(a.clone()),
        _ => ReaggregateMode::Usage,
    }
}

pub fn parse_cli() -> ReaggregateMode {
    mode_from_matches(&build_cli().get_matches())
}

pub fn try_parse_cli_from<I, T>(args: I) -> Result<ReaggregateMode, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli_args = build_cli().try_get_matches_from(args)?;
    Ok(mode_from_matches(&cli_args))
}

/// Run one mode of the app: returns what goes to stdout and the process exit code.
/// Validation prints the `(generated, reference)` line counts, then the first mismatch;
/// the cumulative series is followed by an empty line, as the published script printed it.
pub fn execute(mode: &ReaggregateMode, config: &WeekConfig, prog: &str) -> (String, i32) {
    match mode {
        ReaggregateMode::Validate => match run_validation(config) {
            Ok(report) => {
                let mut out = format!("({}, {})\n", report.generated_len, report.reference_len);
                match &report.mismatch {
                    Some(m) => {
                        out.push_str(&format!("{}\n\n", m));
                        (out, 1)
                    }
                    None => (out, 0),
                }
            }
            Err(e) => {
                error!("{}", e);
                (String::new(), 1)
            }
        },
        ReaggregateMode::Cumulative(anchor) => {
            match parse_anchor(anchor).and_then(|a| run_cumulative(config, a)) {
                Ok(text) => (text + "\n", 0),
                Err(e) => {
                    error!("{}", e);
                    (String::new(), 1)
                }
            }
        }
        ReaggregateMode::Usage => (
            format!("{} {}\n", prog, config.cumulative_anchor.format(DATE_FMT)),
            0,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Consecutive daily rows from `start`, value i for day i.
    fn daily(start: &str, days: usize) -> Vec<String> {
        let d0 = date(start);
        (0..days)
            .map(|i| {
                let d = d0 + chrono::Duration::days(i as i64);
                format!("{},{}", d.format("%Y-%m-%d"), i)
            })
            .collect()
    }

    #[test]
    fn two_weeks_give_one_window_after_priming() {
        let lines = daily("2020-01-22", 14);
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(series.lines(OutputMode::Cumulative), vec!["2020-01-22,6.0"]);
        assert_eq!(series.lines(OutputMode::Delta), vec!["2020-01-22,6"]);
        assert!(series.diagnostics.is_empty());
    }

    #[test]
    fn every_boundary_closes_one_window() {
        let lines = daily("2020-01-22", 29);
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(
            series.lines(OutputMode::Cumulative),
            vec!["2020-01-22,6.0", "2020-01-29,13.0", "2020-02-05,20.0", "2020-02-12,27.0"]
        );
        assert_eq!(
            series.lines(OutputMode::Delta),
            vec!["2020-01-22,6", "2020-01-29,7", "2020-02-05,7", "2020-02-12,7"]
        );
    }

    #[test]
    fn malformed_line_is_reported_and_skipped() {
        let mut lines = daily("2020-01-22", 14);
        lines.insert(5, "2020-01-26,4,extra".to_string());
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(series.lines(OutputMode::Cumulative), vec!["2020-01-22,6.0"]);
        assert_eq!(series.diagnostics.len(), 1);
        assert_eq!(series.diagnostics[0].line, 6);
        assert_eq!(series.diagnostics[0].fields, 3);
        assert_eq!(series.diagnostics[0].text, "2020-01-26,4,extra");
    }

    #[test]
    fn rows_before_the_anchor_only_feed_the_last_value() {
        let lines = daily("2020-01-20", 16);
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        // 2020-01-29 is day 9, closing with the value of day 8
        assert_eq!(series.lines(OutputMode::Cumulative), vec!["2020-01-22,8.0"]);
    }

    #[test]
    fn skipped_boundary_is_closed_by_the_next_row() {
        let mut lines = daily("2020-01-22", 21);
        // drop 2020-01-29 (index 7)
        lines.remove(7);
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(
            series.lines(OutputMode::Cumulative),
            vec!["2020-01-22,6.0", "2020-01-30,13.0"]
        );
    }

    #[test]
    fn fractional_values_are_kept_in_cumulative_and_truncated_in_delta() {
        let lines = [
            "2020-01-01,1.5",
            "2020-01-07,2.5",
            "2020-01-08,3",
            "2020-01-14,10.75",
            "2020-01-15,11",
        ];
        let series = reaggregate(&lines, date("2020-01-01")).unwrap();
        assert_eq!(
            series.lines(OutputMode::Cumulative),
            vec!["2020-01-01,2.5", "2020-01-08,10.75"]
        );
        assert_eq!(
            series.lines(OutputMode::Delta),
            vec!["2020-01-01,2", "2020-01-08,8"]
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        let mut lines = daily("2020-01-22", 14);
        lines.insert(3, "   ".to_string());
        lines.push(String::new());
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(series.lines(OutputMode::Cumulative), vec!["2020-01-22,6.0"]);
        assert!(series.diagnostics.is_empty());
    }

    #[test]
    fn bad_date_or_value_is_fatal() {
        let err = reaggregate(&["2020-01-22,1", "yesterday,2"], date("2020-01-22")).unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, Some(0));
        let err = reaggregate(&["2020-01-22,many"], date("2020-01-22")).unwrap_err();
        assert_eq!(err.column, Some(1));
    }

    #[test]
    fn render_terminates_each_line() {
        let lines = daily("2020-01-22", 15);
        let series = reaggregate(&lines, date("2020-01-22")).unwrap();
        assert_eq!(series.render(OutputMode::Delta), "2020-01-22,6\n2020-01-29,7\n");
    }

    #[test]
    fn identical_sequences_pass() {
        let a = ["x,1", "y,2", "z,3"];
        let report = validate_lines(&a, &a);
        assert!(report.passed());
        assert_eq!((report.generated_len, report.reference_len), (3, 3));
    }

    #[test]
    fn difference_at_index_three_is_reported() {
        let generated = ["a,1", "b,2", "c,3", "d,4", "e,5"];
        let reference = ["a,1", "b,2", "c,3", "d,40", "e,5"];
        let report = validate_lines(&generated, &reference);
        assert!(!report.passed());
        let m = report.mismatch.unwrap();
        assert_eq!(m.index, 3);
        assert_eq!(m.actual.as_deref(), Some("d,4"));
        assert_eq!(m.expected.as_deref(), Some("d,40"));
    }

    #[test]
    fn shorter_side_fails_without_panicking() {
        let generated = ["a,1", "b,2"];
        let reference = ["a,1", "b,2", "c,3"];
        let m = validate_lines(&generated, &reference).mismatch.unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.actual, None);
        assert_eq!(m.expected.as_deref(), Some("c,3"));

        let m = validate_lines(&reference, &generated).mismatch.unwrap();
        assert_eq!(m.index, 2);
        assert_eq!(m.expected, None);
    }

    #[test]
    fn anchor_parsing() {
        assert_eq!(parse_anchor("2020-01-27").unwrap(), date("2020-01-27"));
        assert!(matches!(
            parse_anchor("27/01/2020"),
            Err(ReaggregateError::InvalidAnchor(_))
        ));
    }

    #[test]
    fn mode_follows_argument_count() {
        assert_eq!(
            try_parse_cli_from(["reaggregate_by_week"]).unwrap(),
            ReaggregateMode::Validate
        );
        assert_eq!(
            try_parse_cli_from(["reaggregate_by_week", "2020-01-27"]).unwrap(),
            ReaggregateMode::Cumulative("2020-01-27".to_string())
        );
        assert_eq!(
            try_parse_cli_from(["reaggregate_by_week", "2020-01-27", "2020-02-03"]).unwrap(),
            ReaggregateMode::Usage
        );
    }

    #[test]
    fn validation_and_cumulative_runs_read_the_configured_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("per-day.csv");
        let reference = dir.path().join("per-week.csv");
        std::fs::write(&input, daily("2020-01-22", 21).join("\n")).unwrap();
        std::fs::write(&reference, "2020-01-22,6\n2020-01-29,7\n").unwrap();
        let config = WeekConfig {
            input,
            reference: reference.clone(),
            ..WeekConfig::default()
        };
        let report = run_validation(&config).unwrap();
        assert!(report.passed());

        std::fs::write(&reference, "2020-01-22,6\n2020-01-29,8\n").unwrap();
        let report = run_validation(&config).unwrap();
        assert_eq!(report.mismatch.unwrap().index, 1);

        let text = run_cumulative(&config, date("2020-01-22")).unwrap();
        assert_eq!(text, "2020-01-22,6.0\n2020-01-29,13.0\n");
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = WeekConfig {
            input: dir.path().join("absent.csv"),
            ..WeekConfig::default()
        };
        assert!(matches!(
            run_cumulative(&config, date("2020-01-22")),
            Err(ReaggregateError::Io { .. })
        ));
    }

    #[test]
    fn weekly_delta_beyond_integer_range_is_fatal() {
        let lines = [
            "2020-01-01,0",
            "2020-01-07,1e19",
            "2020-01-08,1e19",
            "2020-01-15,1e19",
        ];
        let err = reaggregate(&lines, date("2020-01-01")).unwrap_err();
        assert_eq!(err.line, 3);
    }

    fn config_with(dir: &Path, reference: &str) -> WeekConfig {
        let input = dir.join("per-day.csv");
        let reference_path = dir.join("per-week.csv");
        std::fs::write(&input, daily("2020-01-22", 21).join("\n")).unwrap();
        std::fs::write(&reference_path, reference).unwrap();
        WeekConfig {
            input,
            reference: reference_path,
            ..WeekConfig::default()
        }
    }

    #[test]
    fn execute_validation_prints_lengths_and_exits_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), "2020-01-22,6\n2020-01-29,7\n");
        let (out, code) = execute(&ReaggregateMode::Validate, &config, "reaggregate_by_week");
        assert_eq!(out, "(2, 2)\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn execute_validation_mismatch_prints_both_lines_and_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), "2020-01-22,6\n2020-01-29,8\n2020-02-05,7\n");
        let (out, code) = execute(&ReaggregateMode::Validate, &config, "reaggregate_by_week");
        assert_eq!(
            out,
            "(2, 3)\nproducing non-matching output 1\n<2020-01-29,7\n>2020-01-29,8\n\n"
        );
        assert_eq!(code, 1);
    }

    #[test]
    fn execute_cumulative_ends_with_an_empty_line() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), "");
        let mode = ReaggregateMode::Cumulative("2020-01-22".to_string());
        let (out, code) = execute(&mode, &config, "reaggregate_by_week");
        assert_eq!(out, "2020-01-22,6.0\n2020-01-29,13.0\n\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn execute_failures_exit_one() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(dir.path(), "");
        let mode = ReaggregateMode::Cumulative("27/01/2020".to_string());
        assert_eq!(execute(&mode, &config, "reaggregate_by_week"), (String::new(), 1));

        let config = WeekConfig {
            input: dir.path().join("absent.csv"),
            ..config
        };
        assert_eq!(
            execute(&ReaggregateMode::Validate, &config, "reaggregate_by_week"),
            (String::new(), 1)
        );
    }

    #[test]
    fn execute_usage_shows_an_example_anchor() {
        let (out, code) = execute(
            &ReaggregateMode::Usage,
            &WeekConfig::default(),
            "reaggregate_by_week",
        );
        assert_eq!(out, "reaggregate_by_week 2020-01-27\n");
        assert_eq!(code, 0);
    }
}
