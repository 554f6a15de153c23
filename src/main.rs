fn main() {
    if let Err(e) = milehigh::runner::run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
