fn main() {
    if let Err(err) = csv_pivot::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
