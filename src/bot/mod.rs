//! Bot module - watches a channel's live chat and answers it.

pub mod clock;
pub mod engine;
pub mod limits;
pub mod message;
pub mod phrases;
pub mod responder;
pub mod session;


pub use clock::{Clock, SystemClock};
pub use engine::{Bot, BotConfig};
pub use message::ChatMessage;
pub use phrases::ResponseBook;
pub use responder::{BotMode, Responder};
