use tracing::{error, info};

use tidebot::bot::{self, BotState};
use tidebot::config::BotConfig;
use tidebot::irc::transport::Transport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("bad configuration: {e}");
            return Err(e.into());
        }
    };
    info!(
        host = %config.transport.host,
        channel = %config.transport.channel,
        data_dir = %config.data_dir.display(),
        "tidebot starting"
    );

    let state = BotState::new(&config);
    let mut transport = Transport::new(config.transport);
    if let Err(e) = transport.connect().await {
        error!("could not connect: {e}");
        return Err(e.into());
    }

    if let Err(e) = bot::run(transport, state).await {
        error!("stopped: {e}");
        return Err(e.into());
    }
    info!("bye");
    Ok(())
}
