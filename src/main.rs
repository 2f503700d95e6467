fn main() {
    if let Err(err) = cloudassess::cli::run() {
        cloudassess::ui::eprintln_error(&err);
        std::process::exit(cloudassess::exit::exit_code(&err));
    }
}
