fn main() {
    if let Err(err) = cardvault::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
