use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use symptom_atlas::{api, config, logging, processing};
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "symptom-atlas",
    version,
    about = "Serve the symptom vectorization and disease matching API"
)]
struct Cli {
    /// Port to listen on; overrides SERVER_PORT. Without either, the first free port in 4100-4199.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_config().context("Failed to load configuration")?;
    logging::init_tracing();

    let config = config::get_config();
    let service = processing::ProcessingService::new(config)
        .await
        .context("Failed to initialize processing service")?;
    let app = api::create_router(Arc::new(service));

    let (listener, port) = bind_listener(cli.port.or(config.server_port))
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn bind_listener(requested: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = requested {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
