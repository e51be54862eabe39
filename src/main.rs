mod args;
mod kiosk;

use clap::Parser;
use log::LevelFilter;

fn main() {
    let args = args::Args::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();

    if let Err(e) = kiosk::run(&args) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
