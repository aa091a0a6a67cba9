//! Services layer for invite-service.
//!
//! The identity provider adapter, the directory store and the invitation
//! state machine that coordinates them.

pub mod error;
pub mod identity;
mod invitation;
pub mod metrics;
pub mod store;

pub use error::InviteError;
pub use identity::{
    AuthenticatedUser, IdentityProvider, InviteMetadata, MockIdentityProvider, ProviderError,
    SupabaseAuthClient,
};
pub use invitation::{validate_email, InvitationService, InviteAction, InviteOutcome, InviteRequest};
pub use store::{
    DirectoryStore, InMemoryDirectoryStore, PostgresDirectoryStore, StoreError,
};
