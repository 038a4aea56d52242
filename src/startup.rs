use crate::config::Config;
use crate::error::Error;
use crate::handlers::{app_router, AppState};
use crate::repo::{MemoryRepository, RedisRepository, ShiftRepository, StaffDirectory};
use crate::service::ShiftService;
use crate::shutdown;
use crate::utils::time::{Clock, SystemClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Environment(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and validate the application config
pub fn load_config() -> miette::Result<Config> {
    match Config::load() {
        Ok(config) => Ok(config),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Connect to Redis, falling back to the in-memory repository when the
/// connection cannot be established
fn build_repository(config: &Config) -> Arc<dyn ShiftRepository> {
    match RedisRepository::new(&config.redis_url) {
        Ok(redis) => {
            info!("Connected to Redis successfully");
            Arc::new(redis)
        }
        Err(e) => {
            error!("Failed to connect to Redis: {}", e);
            info!("Using in-memory repository as fallback");
            Arc::new(MemoryRepository::default())
        }
    }
}

/// Initialize state and run the HTTP server until a shutdown signal
pub async fn start_server(config: Config) -> miette::Result<()> {
    let repo = build_repository(&config);
    let staff = StaffDirectory::load(&config.staff_file)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let service = Arc::new(ShiftService::new(
        repo,
        staff,
        Arc::clone(&clock),
        &config,
    ));

    let state = AppState {
        service,
        clock,
        default_timezone: config.default_timezone.clone(),
    };

    let app = app_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::Io)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_signal())
        .await
        .map_err(Error::Io)?;

    info!("Server stopped");
    Ok(())
}
