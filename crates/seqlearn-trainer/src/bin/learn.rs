use clap::Parser;
use seqlearn_trainer::LearnArgs;
use tracing_subscriber::EnvFilter;

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("seqlearn_trainer=info,seqlearn_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = LearnArgs::parse();
    if let Err(e) = args.run() {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}
