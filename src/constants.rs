/// Default upstream host
pub const DEFAULT_UPSTREAM_HOST: &str = "chat.openai.com";

/// Create-conversation path (relative to `/api`); its body is augmented and
/// its response is always relayed as an event stream
pub const CONVERSATION_PATH: &str = "/conversation";

/// Conversation limit check, the only path served from `/public-api`
pub const CONVERSATION_LIMIT_PATH: &str = "/conversation_limit";

/// Role given to the first message when the client leaves it empty
pub const DEFAULT_ROLE: &str = "user";

/// Models with this prefix require an arkose token on conversation create
pub const ARKOSE_MODEL_PREFIX: &str = "gpt-4";

/// Session cookie kept alive by the credential refresher
pub const PUID_COOKIE: &str = "_puid";

/// Upstream tracking cookie stripped from the jar before every relay call
pub const TRACKING_COOKIE: &str = "_cfuvid";

/// Chunk size used when relaying upstream bodies
pub const RELAY_CHUNK_SIZE: usize = 4096;

/// Largest inbound body accepted on `/api` (2 MiB, axum's default limit)
pub const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Overall transport timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 360;

/// Refresh interval of the session credential: one week
pub const PUID_REFRESH_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

/// User agent presented on relayed requests (mimics desktop Chrome)
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

pub const SEC_CH_UA: &str = "\"Chromium\";v=\"112\", \"Brave\";v=\"112\", \"Not:A-Brand\";v=\"99\"";
pub const SEC_CH_UA_PLATFORM: &str = "\"Linux\"";

// --- Arkose ---

pub const ARKOSE_PUBLIC_KEY: &str = "35536E1E-65B4-4D96-9D97-6ADB7EFF8147";
pub const ARKOSE_SITE: &str = "https://chat.openai.com";
pub const ARKOSE_ORIGIN: &str = "https://tcr9i.chat.openai.com";
pub const ARKOSE_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";
pub const ARKOSE_CAPI_VERSION: &str = "1.5.2";
pub const ARKOSE_CAPI_MODE: &str = "lightbox";
pub const ARKOSE_STYLE_THEME: &str = "default";

/// Token endpoint for the given public key
pub fn arkose_token_url(public_key: &str) -> String {
    format!("{ARKOSE_ORIGIN}/fc/gt2/public_key/{public_key}")
}

// --- Identity provider ---

pub const AUTH_TOKEN_URL: &str = "https://auth0.openai.com/oauth/token";
pub const AUTH_CLIENT_ID: &str = "pdlLIX2Y72MIl2rhLhTE9VV9bN905kBh";
pub const AUTH_AUDIENCE: &str = "https://api.openai.com/v1";
pub const AUTH_REALM: &str = "Username-Password-Authentication";
pub const AUTH_SCOPE: &str = "openid email profile offline_access model.request model.read organization.read";
