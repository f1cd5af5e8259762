#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("engine error: {0}")]
    Engine(#[from] engine::EngineError),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}
