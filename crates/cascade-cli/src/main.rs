#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cascade_cli::run().await
}
