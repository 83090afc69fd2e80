use structopt::StructOpt;
use tempest_bridge::Opt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tempest_bridge::run(Opt::from_args()).await
}
