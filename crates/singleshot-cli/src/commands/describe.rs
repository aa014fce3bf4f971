use clap::Args;
use singleshot_runtime::SingleShot;
use singleshot_runtime::cli::ModelArgs;

#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub model: ModelArgs,
}

pub fn handle_command(args: DescribeArgs) -> anyhow::Result<()> {
    let single = SingleShot::open(args.model.to_options()?)?;
    let description = serde_json::json!({
        "model": args.model.model,
        "framework": single.framework().to_string(),
        "accelerator": single.hardware().to_string(),
        "input": single.input_info()?,
        "output": single.output_info()?,
    });
    single.close()?;

    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}
