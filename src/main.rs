fn main() {
    if let Err(err) = csv_variance::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
