mod credential;
mod error;
mod exchange;
mod token;

pub use credential::{CredentialDefaults, CredentialResolver, ResolvedCredential};
pub use error::{CredentialError, TokenError};
pub use exchange::{EntraTokenClient, ExchangedToken, TokenExchanger};
pub use token::{CachedToken, Clock, SystemClock, TokenCache, TokenProvider, REFRESH_MARGIN_SECS};

pub const SUBSCRIPTION_KEY_HEADER: &str = "subscription-key";
pub const MAPS_CLIENT_ID_HEADER: &str = "x-ms-client-id";

/// Default scope requested for the maps resource
pub const DEFAULT_TOKEN_SCOPE: &str = "https://atlas.microsoft.com/.default";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
