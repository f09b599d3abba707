use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    gedis_server::run().await
}
