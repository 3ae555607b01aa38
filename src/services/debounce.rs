use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Таймер "тихого окна": каждое `touch()` сдвигает срабатывание на `quiet` вперёд,
/// `fired()` завершается, когда с последней активности прошло окно целиком.
///
/// Не зависит от шага цикла опроса, в котором используется.
#[derive(Debug)]
pub struct Debouncer {
    quiet: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
        }
    }

    /// Зафиксировать активность
    pub fn touch(&mut self) {
        self.deadline = Some(Instant::now() + self.quiet);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Дождаться конца тихого окна. Без активности не завершается никогда,
    /// поэтому безопасно стоит в ветке `select!`.
    pub async fn fired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
