use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Не удалось подключиться к X-серверу: {0}")]
    X11Connect(#[from] x11rb::errors::ConnectError),

    #[error("Ошибка соединения с X-сервером: {0}")]
    X11Connection(#[from] x11rb::errors::ConnectionError),

    #[error("Ошибка ответа X-сервера: {0}")]
    X11Reply(#[from] x11rb::errors::ReplyError),

    #[error("Для выхода {output} нет свободного совместимого CRTC")]
    NoUsableCrtc { output: String },

    #[error("У выхода {output} нет ни одного режима")]
    MissingMode { output: String },

    #[error("Раскладка '{layout}' не включает ни одного выхода")]
    EmptyLayout { layout: String },

    #[error("Источник подсказок недоступен: {0}")]
    SourceUnavailable(String),

    #[error("Неизвестное действие: {0}")]
    UnknownAction(String),

    #[error("Ошибка действия {name}: {reason}")]
    Action { name: String, reason: String },

    #[error("Внутренняя ошибка: {0}")]
    Internal(String),
}

impl AppError {
    pub fn source_unavailable<T>(msg: impl Into<String>) -> Result<T> {
        Err(AppError::SourceUnavailable(msg.into()))
    }

    pub fn action(name: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Action {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! app_error {
    (source_unavailable, $($arg:tt)*) => {
        $crate::error::AppError::SourceUnavailable(format!($($arg)*))
    };
    (unknown_action, $($arg:tt)*) => {
        $crate::error::AppError::UnknownAction(format!($($arg)*))
    };
    (internal, $($arg:tt)*) => {
        $crate::error::AppError::Internal(format!($($arg)*))
    };
}
