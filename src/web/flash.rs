use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::web::FLASH_KEY;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashLevel {
    Success,
    Error,
}

/// One-shot notification rendered on the next page load and then dropped.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn success(message: &str) -> Self {
        Self {
            level: FlashLevel::Success,
            message: message.to_owned(),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            level: FlashLevel::Error,
            message: message.to_owned(),
        }
    }

    pub fn class(&self) -> &'static str {
        match self.level {
            FlashLevel::Success => "flash flash-success",
            FlashLevel::Error => "flash flash-error",
        }
    }
}

pub async fn set_flash(session: &Session, flash: Flash) -> Result<(), anyhow::Error> {
    session.insert(FLASH_KEY, &flash).await?;
    Ok(())
}

pub async fn take_flash(session: &Session) -> Result<Option<Flash>, anyhow::Error> {
    Ok(session.remove::<Flash>(FLASH_KEY).await?)
}
