#[tokio::main]
async fn main() -> anyhow::Result<()> {
    driver_ledger::cli::run().await
}
