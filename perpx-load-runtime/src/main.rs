use perpx_load_runtime::{init_logging, LoadRuntime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = LoadRuntime::new().with_args();
    init_logging(runtime.ui());
    runtime.run().await?;
    Ok(())
}
