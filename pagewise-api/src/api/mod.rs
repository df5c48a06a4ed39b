pub mod conversations;
pub mod entities;
pub mod events;
pub mod notifications;
pub mod settings;
pub mod stats;
pub mod turns;
