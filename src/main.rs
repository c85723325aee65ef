use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kinetrack_lib::run(kinetrack_lib::cli::Args::parse()).await
}
