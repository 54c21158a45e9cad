use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Set up the stderr logger used by both apps.
/// RUST_LOG wins when set, otherwise info, or debug when verbose.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a second init in the same process (tests) is not an error worth reporting
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Read all lines from the given file, or from stdin when no path is given.
pub fn read_lines<P>(fin: Option<P>) -> io::Result<Vec<String>>
where
    P: AsRef<Path>,
{
    match fin {
        Some(p) => {
            let file = File::open(p)?;
            BufReader::new(file).lines().collect()
        }
        None => {
            let mut buf = String::new();
            io::stdin().lock().read_to_string(&mut buf)?;
            Ok(buf.lines().map(str::to_owned).collect())
        }
    }
}

/// Write the whole text block to the given file, or to stdout when no path is given.
pub fn write_text<P>(fout: Option<P>, text: &str) -> io::Result<()>
where
    P: AsRef<Path>,
{
    match fout {
        Some(p) => {
            let file = File::create(p)?;
            let mut buf = BufWriter::new(file);
            buf.write_all(text.as_bytes())?;
            buf.flush()
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(text.as_bytes())?;
            lock.flush()
        }
    }
}

pub fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Parse a numeric cell, ignoring surrounding whitespace.
/// Only finite values are accepted, the result must fit an integer later on.
pub fn parse_finite(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Float to integer, truncating toward zero.
/// `None` when the value does not fit an i64, instead of the saturating `as` cast.
pub fn trunc_to_int(v: f64) -> Option<i64> {
    let t = v.trunc();
    // 2^63 is exactly representable, i64::MAX is not
    if t.is_finite() && t >= -9_223_372_036_854_775_808.0 && t < 9_223_372_036_854_775_808.0 {
        Some(t as i64)
    } else {
        None
    }
}

/// Render a float the way the published weekly files do:
/// whole numbers keep a trailing ".0", the rest use the shortest form.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
