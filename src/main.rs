use colored::Colorize;

fn main() {
    if let Err(e) = artable::app::run_cli() {
        eprintln!("{} {e}", "ERR".bold().red());
        std::process::exit(1);
    }
}
