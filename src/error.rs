use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("server start failure: {0}")]
    StartServer(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("not a participant of this conversation")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("media storage error: {0}")]
    Media(String),
}

impl AppError {
    /// Text surfaced to the client on a `*_error` event. Infrastructure
    /// failures collapse to a generic message; the cause stays in server
    /// logs. Authorization failures and unknown ids share one message so
    /// the wire does not reveal whether the entity exists.
    pub fn client_message(&self) -> String {
        match self {
            AppError::Unauthenticated => "not authenticated".into(),
            AppError::Validation(msg) => msg.clone(),
            AppError::Forbidden | AppError::NotFound => {
                "conversation or message not found".into()
            }
            _ => "internal error".into(),
        }
    }

    /// Whether the cause should be logged at error level server-side.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AppError::Config(_)
                | AppError::StartServer(_)
                | AppError::Database(_)
                | AppError::Media(_)
        )
    }
}
