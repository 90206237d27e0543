#[tokio::main]
async fn main() -> eyre::Result<()> {
    courier::run().await
}
