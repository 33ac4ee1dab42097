pub mod authenticator;
pub mod refresher;
pub mod session;

pub use authenticator::{AuthError, Authenticator, OpenAiAuthenticator};
pub use refresher::{PuidRefresher, RefresherStatus};
pub use session::SessionCredential;
