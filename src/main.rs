use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = butler::cli::Cli::parse();
    if let Err(e) = butler::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
