#[tokio::main]
async fn main() -> anyhow::Result<()> {
    proxypool::service::run().await
}
