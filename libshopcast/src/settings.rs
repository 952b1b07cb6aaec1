//! Settings store: platform tokens and the autopilot record
//!
//! Both live in the `settings` key/value table as JSON. They are read once at
//! the start of an invocation and passed down explicitly.

use std::collections::HashMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::Database;
use crate::error::{ConfigError, DbError, Result};
use crate::types::{AutopilotSettings, Platform};

const AUTOPILOT_KEY: &str = "autopilot";

fn token_key(platform: Platform) -> String {
    format!("token:{}", platform)
}

/// Bearer token for one platform
#[derive(Debug)]
pub struct PlatformToken {
    pub access_token: SecretString,
    /// Unix seconds; `None` means the token does not expire
    pub expires_at: Option<i64>,
    /// Instagram business account or Facebook page the token acts for
    pub account_id: Option<String>,
}

impl PlatformToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            expires_at: None,
            account_id: None,
        }
    }

    pub fn with_expiry(mut self, expires_at: i64) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn with_account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }

    pub fn expose(&self) -> &str {
        self.access_token.expose_secret()
    }
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    expires_at: Option<i64>,
    account_id: Option<String>,
}

/// Tokens resolved for one invocation
#[derive(Debug, Default)]
pub struct Credentials {
    tokens: HashMap<Platform, PlatformToken>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, platform: Platform, token: PlatformToken) {
        self.tokens.insert(platform, token);
    }

    pub fn get(&self, platform: Platform) -> Option<&PlatformToken> {
        self.tokens.get(&platform)
    }

    pub fn take(&mut self, platform: Platform) -> Option<PlatformToken> {
        self.tokens.remove(&platform)
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.tokens.keys().copied().collect();
        platforms.sort();
        platforms
    }
}

impl Database {
    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn save_token(&self, platform: Platform, token: &PlatformToken) -> Result<()> {
        let stored = StoredToken {
            access_token: token.expose().to_string(),
            expires_at: token.expires_at,
            account_id: token.account_id.clone(),
        };
        let value = serde_json::to_string(&stored).map_err(|e| ConfigError::InvalidSetting {
            key: token_key(platform),
            reason: e.to_string(),
        })?;
        self.put_setting(&token_key(platform), &value).await?;
        tracing::debug!(platform = %platform, "Stored platform token");
        Ok(())
    }

    pub async fn load_token(&self, platform: Platform) -> Result<Option<PlatformToken>> {
        let key = token_key(platform);
        let Some(raw) = self.get_setting(&key).await? else {
            return Ok(None);
        };

        let stored: StoredToken =
            serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidSetting {
                key,
                reason: e.to_string(),
            })?;

        Ok(Some(PlatformToken {
            access_token: SecretString::from(stored.access_token),
            expires_at: stored.expires_at,
            account_id: stored.account_id,
        }))
    }

    /// Resolve a valid token for each requested platform
    ///
    /// Fails with a configuration error if any platform has no token or an
    /// expired one.
    pub async fn load_credentials(&self, platforms: &[Platform], now: i64) -> Result<Credentials> {
        let mut credentials = Credentials::new();

        for &platform in platforms {
            let token = self
                .load_token(platform)
                .await?
                .ok_or_else(|| ConfigError::MissingCredentials(platform.to_string()))?;

            if let Some(expired_at) = token.expires_at.filter(|_| token.is_expired(now)) {
                return Err(ConfigError::ExpiredToken {
                    platform: platform.to_string(),
                    expired_at,
                }
                .into());
            }

            credentials.insert(platform, token);
        }

        Ok(credentials)
    }

    /// Autopilot settings, or the defaults when none were saved
    pub async fn load_autopilot_settings(&self) -> Result<AutopilotSettings> {
        match self.get_setting(AUTOPILOT_KEY).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| {
                ConfigError::InvalidSetting {
                    key: AUTOPILOT_KEY.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(AutopilotSettings::default()),
        }
    }

    pub async fn save_autopilot_settings(&self, settings: &AutopilotSettings) -> Result<()> {
        let value = serde_json::to_string(settings).map_err(|e| ConfigError::InvalidSetting {
            key: AUTOPILOT_KEY.to_string(),
            reason: e.to_string(),
        })?;
        self.put_setting(AUTOPILOT_KEY, &value).await
    }
}
