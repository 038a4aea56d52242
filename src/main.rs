use tracing::info;

#[tokio::main]
async fn main() -> miette::Result<()> {
    // Initialize logging
    shifttrack::startup::init_logging()?;

    info!("Starting shifttrack");

    // Load configuration
    let config = shifttrack::startup::load_config()?;

    // Run the server
    shifttrack::startup::start_server(config).await
}
