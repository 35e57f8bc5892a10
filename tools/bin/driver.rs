use anyhow::Context;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;

use scale_bench_lambda::driver::{self, DriverArgs};
use scale_bench_lambda::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = DriverArgs::parse();
    let mut rng = StdRng::from_os_rng();

    let path = driver::run(&args, &mut rng)
        .await
        .with_context(|| format!("workload against {} failed", args.target))?;

    println!("results saved to {}", path.display());
    Ok(())
}
