pub mod chat;
pub mod config;
pub mod conversation;
pub mod events;
pub mod prompt;
pub mod runs;
