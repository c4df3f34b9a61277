pub mod analysis;
pub mod config;
pub mod events;
pub mod layout;
pub mod preferences;
pub mod prompts;
pub mod screen_text;
