//! Inbound webhook trust boundary

pub mod challenge;
pub mod guard;
pub mod provider;

pub use challenge::url_verification_challenge;
pub use guard::{
    VerificationStage, WebhookGuard, WebhookSecrets, WebhookVerificationContext,
    WebhookVerificationError,
};
pub use provider::{UnknownProvider, WebhookHeaders, WebhookProvider};
