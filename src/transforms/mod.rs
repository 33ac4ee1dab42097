//! Request/response transformations for the upstream proxy.
//!
//! - `translate`: inbound path and query to upstream URL
//! - `conversation`: create-conversation body augmentation
//! - `streaming`: chunked body relay

pub mod conversation;
pub mod streaming;
pub mod translate;

pub use conversation::augment_conversation;
pub use streaming::relay_body;
pub use translate::upstream_url;
