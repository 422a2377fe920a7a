fn main() {
    if let Err(e) = nutpipe_cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
