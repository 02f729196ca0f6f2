fn main() {
    if let Err(e) = abc_drv::run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
