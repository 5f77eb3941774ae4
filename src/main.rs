#[tokio::main]
async fn main() -> anyhow::Result<()> {
    donation_client::run().await
}
