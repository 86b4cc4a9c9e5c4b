mod booking;
mod device;
mod driver;
mod enforcer;
mod host;
mod reconciler;
mod shelly;
mod simulator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
