use casecount::reaggregate_by_week::{execute, parse_cli, WeekConfig};
use casecount::utils::init_tracing;
use std::io::Write;
use tracing::error;

fn main() {
    let mode = parse_cli();
    init_tracing(false);
    let config = WeekConfig::from_env();
    let prog = std::env::args()
        .next()
        .unwrap_or_else(|| "reaggregate_by_week".to_string());

    let (out, code) = execute(&mode, &config, &prog);
    print!("{}", out);
    if let Err(e) = std::io::stdout().flush() {
        error!("could not write to stdout: {}", e);
    }
    std::process::exit(code);
}
