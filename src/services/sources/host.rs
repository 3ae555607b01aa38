use crate::error::{AppError, Result};
use crate::hints::{HintKind, HintValue, HostHint};
use std::time::Duration;

use super::r#trait::HintSource;

pub struct HostSource {
    interval: Duration,
}

impl HostSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn current() -> Result<HostHint> {
        let hostname = hostname::get().map_err(AppError::Io)?;
        Ok(HostHint::new(
            std::env::consts::OS,
            hostname.to_string_lossy().into_owned(),
        ))
    }
}

#[async_trait::async_trait]
impl HintSource for HostSource {
    fn kind(&self) -> HintKind {
        HintKind::Host
    }

    async fn query(&self) -> Result<HintValue> {
        Ok(HintValue::Host(Self::current()?))
    }

    fn poll_interval(&self) -> Duration {
        self.interval
    }
}
