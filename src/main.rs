fn main() {
    if let Err(err) = diabeaters_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
