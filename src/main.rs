fn main() {
    if let Err(err) = items_matcher::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
