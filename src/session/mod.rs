mod manager;
mod message_counts;
mod switch;

pub use manager::{Clock, SessionManager};
pub use message_counts::MessageCounts;
pub use switch::SwitchSession;
