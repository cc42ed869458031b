fn main() {
    if let Err(e) = counter_pos_lib::run() {
        eprintln!("counter-pos: {e:#}");
        std::process::exit(1);
    }
}
