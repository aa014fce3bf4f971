use super::{build_input, format_tensor, parse_values};
use crate::print_info;
use clap::Args;
use singleshot_runtime::SingleShot;
use singleshot_runtime::cli::ModelArgs;

#[derive(Args, Debug)]
pub struct InvokeArgs {
    #[command(flatten)]
    pub model: ModelArgs,
    /// Input values, filled into the input tensors in order
    #[arg(long)]
    pub values: String,
}

pub fn handle_command(args: InvokeArgs) -> anyhow::Result<()> {
    let single = SingleShot::open(args.model.to_options()?)?;
    let input = build_input(&single.input_info()?, &parse_values(&args.values)?)?;

    let begin = std::time::Instant::now();
    let output = single.invoke(&input)?;
    print_info!("Invoked '{}' in {:?}", args.model.model, begin.elapsed());

    for index in 0..output.count() {
        println!("output[{index}] = {}", format_tensor(&output, index)?);
    }
    drop(output);
    single.close()?;
    Ok(())
}
