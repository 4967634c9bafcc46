mod cli;

use clap::Parser;

use cli::op::{Op, OpContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();
    let ctx = OpContext::new(&args.remote, args.config.clone())?;

    let output = args.command.execute(&ctx).await?;
    println!("{}", output);
    Ok(())
}
