mod channel;
mod status;

pub use channel::{Channel, ChannelEvent, ChannelOptions};
pub use status::StatusBoard;
