pub mod invitation;

pub use invitation::{
    DirectoryEntryResponse, EmailRequest, InvitationResponse, InviteRequestDto,
};
