#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scene_sync_lib::run().await
}
