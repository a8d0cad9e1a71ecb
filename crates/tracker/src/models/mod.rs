//! Domain models for tracked applications and synced mail

mod application;
mod company;
mod event;
mod message;
mod sync_state;

pub use application::{Application, ApplicationStatus, NewApplication, StatusParseError};
pub use company::{Company, normalize_name};
pub use event::{ApplicationEvent, EMAIL_UPDATE, NewApplicationEvent};
pub use message::{EmailAddress, MailMessage, MessageId};
pub use sync_state::SyncState;
