#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = schoolhub_rust::run().await {
        eprintln!("schoolhub-rust fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
