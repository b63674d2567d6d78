use clap::Parser;

fn main() {
    let cli = cityguidectl::Cli::parse();
    cityguidectl::init_tracing(cli.verbose);
    if let Err(err) = cityguidectl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
