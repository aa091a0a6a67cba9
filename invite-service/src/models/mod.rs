pub mod directory_entry;

pub use directory_entry::{
    email_key, AccessLevel, DirectoryEntry, DirectoryEntryRow, IdentityUserId, InviteStatus,
};
