use super::{build_input, parse_values};
use crate::{print_info, print_warn};
use clap::Args;
use singleshot_runtime::cli::ModelArgs;
use singleshot_runtime::{MlError, SingleShot};
use std::time::{Duration, Instant};

#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub model: ModelArgs,
    #[arg(long, default_value_t = 100)]
    pub iterations: u32,
    /// Input values, zeros when omitted
    #[arg(long)]
    pub values: Option<String>,
}

pub fn handle_command(args: BenchArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.iterations > 0, "at least one iteration is needed");
    let single = SingleShot::open(args.model.to_options()?)?;
    let info = single.input_info()?;
    let values = match &args.values {
        Some(values) => parse_values(values)?,
        None => {
            let count = info.tensor_sizes().iter().sum::<usize>() / 4;
            vec![0.0; count]
        }
    };
    let input = build_input(&info, &values)?;

    let mut total = Duration::ZERO;
    let mut slowest = Duration::ZERO;
    let mut timeouts = 0u32;
    let mut failures = 0u32;
    for _ in 0..args.iterations {
        let begin = Instant::now();
        match single.invoke(&input) {
            Ok(output) => {
                let elapsed = begin.elapsed();
                total += elapsed;
                slowest = slowest.max(elapsed);
                drop(output);
            }
            Err(MlError::TimedOut) => timeouts += 1,
            Err(e) => {
                log::debug!("Invocation failed: {e}");
                failures += 1;
            }
        }
    }
    single.close()?;

    let succeeded = args.iterations - timeouts - failures;
    if succeeded > 0 {
        print_info!(
            "{succeeded}/{} invocations of '{}': mean {:?}, slowest {:?}",
            args.iterations,
            args.model.model,
            total / succeeded,
            slowest
        );
    }
    if timeouts + failures > 0 {
        print_warn!("{timeouts} invocations timed out, {failures} failed");
    }
    anyhow::ensure!(succeeded > 0, "no invocation succeeded");
    Ok(())
}
