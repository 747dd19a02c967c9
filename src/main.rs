use std::process;

fn main() {
    match cppscan::cli::run_cli() {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("cppscan: {}", e);
            process::exit(1);
        }
    }
}
