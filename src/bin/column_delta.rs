use casecount::column_delta::{execute, parse_cli};
use casecount::utils::init_tracing;
use std::io::Write;
use tracing::{debug, error};

fn main() {
    let args = parse_cli();
    init_tracing(args.verbose);

    if args.verbose {
        debug!("csvin {:?}", args.csvin);
        debug!("csvout {:?}", args.csvout);
        debug!("fields {:?}", args.fields.indices());
    }

    let (out, code) = execute(&args);
    print!("{}", out);
    if let Err(e) = std::io::stdout().flush() {
        error!("could not write to stdout: {}", e);
    }
    std::process::exit(code);
}
