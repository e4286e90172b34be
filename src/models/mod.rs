pub mod authorization;
pub mod notification;

pub use authorization::{Amount, AuthorizationOutcome, ResultCode};
pub use notification::{NotificationEvent, NotificationRequest};
