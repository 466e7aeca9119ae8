mod clock;
mod message;
mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use message::{content_path, Content, Message, MessageMetadata};
pub use types::{MessageType, ParseEnumError, Priority, MESSAGE_TYPES, MESSAGE_TYPE_COUNT, PRIORITIES};

#[cfg(test)]
mod tests;
