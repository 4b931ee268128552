use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};

use filereg::file::{FileRepository, FileService, FileStorage};
use filereg::web::WebServer;
use filereg::{Config, Database};

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load configuration
    let config = match Config::load_with_env(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {config_path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = filereg::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        filereg::logging::init_console_only(&config.logging.level);
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> filereg::Result<()> {
    config.validate()?;

    info!("filereg - file metadata registry");

    let db = Database::open(&config.database.path).await?;
    let storage = FileStorage::new(&config.storage.root)?;
    info!("Storage root: {}", storage.root().display());

    let root = storage.root().to_path_buf();
    let service = FileService::new(
        &root,
        Arc::new(storage),
        Arc::new(FileRepository::new(db.pool().clone())),
    )?;

    let server = WebServer::new(
        &config.server,
        Arc::new(service),
        config.storage.max_upload_bytes(),
    )?;
    server.run().await?;

    Ok(())
}
