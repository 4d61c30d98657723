mod common;
mod elevenlabs;
mod message;
mod openai;

pub use self::common::*;
pub use self::elevenlabs::*;
pub use self::message::*;
pub use self::openai::*;
