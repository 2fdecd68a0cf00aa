//! `meridian` binary entry point.

fn main() {
    let code = meridian_cli::run_cli(std::env::args().collect());
    std::process::exit(code);
}
