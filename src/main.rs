use std::path::PathBuf;

use rdbg_driver::{Driver, DriverConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rdbg_driver::init_tracing();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => DriverConfig::load(&path)?,
        None => DriverConfig::default(),
    };

    let mut driver = Driver::new(config);
    let mut events = driver.start_session().await?;

    while let Some(event) = events.recv().await {
        info!(%event, "session");
        if matches!(event, rdbg_driver::SessionEvent::Disconnected) {
            break;
        }
    }

    driver.stop_session().await;
    Ok(())
}
