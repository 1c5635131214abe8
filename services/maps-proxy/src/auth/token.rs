use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{TokenError, TokenExchanger};

/// Tokens this close to expiry are treated as stale
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Upper bound applied to `expires_in` reported by the identity provider
const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - now > Duration::seconds(REFRESH_MARGIN_SECS)
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Single-slot token store. Writes replace the slot wholesale.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(token: CachedToken) -> Self {
        Self {
            slot: RwLock::new(Some(token)),
        }
    }

    pub fn get(&self) -> Option<CachedToken> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: CachedToken) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.valid_token(now).is_some()
    }

    fn valid_token(&self, now: DateTime<Utc>) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|token| token.is_valid_at(now))
            .map(|token| token.access_token.clone())
    }
}

/// Serves bearer tokens from the cache, exchanging a new one when the slot is stale.
///
/// Concurrent refreshes are coalesced behind `refresh_guard`; callers that find a valid
/// token never touch the guard.
pub struct TokenProvider {
    cache: Arc<TokenCache>,
    exchanger: Arc<dyn TokenExchanger>,
    clock: Arc<dyn Clock>,
    refresh_guard: Mutex<()>,
}

impl TokenProvider {
    pub fn new(exchanger: Arc<dyn TokenExchanger>) -> Self {
        Self::with_parts(Arc::new(TokenCache::new()), exchanger, Arc::new(SystemClock))
    }

    pub fn with_parts(
        cache: Arc<TokenCache>,
        exchanger: Arc<dyn TokenExchanger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache,
            exchanger,
            clock,
            refresh_guard: Mutex::new(()),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_token(&self) -> Result<String, TokenError> {
        if let Some(token) = self.cache.valid_token(self.clock.now()) {
            debug!("serving cached bearer token");
            return Ok(token);
        }

        let _refresh = self.refresh_guard.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(token) = self.cache.valid_token(self.clock.now()) {
            debug!("bearer token refreshed by concurrent caller");
            return Ok(token);
        }

        let exchanged = match self.exchanger.exchange().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error_code = e.code(), "token exchange failed");
                return Err(e);
            }
        };

        let expires_in = exchanged.expires_in_secs.min(MAX_TOKEN_LIFETIME_SECS) as i64;
        let expires_at = self.clock.now() + Duration::seconds(expires_in);
        self.cache
            .set(CachedToken::new(exchanged.access_token.clone(), expires_at));

        info!(
            expires_in_secs = exchanged.expires_in_secs,
            expires_at = %expires_at,
            "bearer token refreshed"
        );

        Ok(exchanged.access_token)
    }
}
