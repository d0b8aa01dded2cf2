mod chat;
mod common;
mod document;
mod settings;
mod upload;

pub use chat::*;
pub use common::*;
pub use document::*;
pub use settings::*;
pub use upload::*;
