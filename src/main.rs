use cadence_lib::{logging::init_logging, CliArgs};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.debug);
    cadence_lib::run(args).await
}
