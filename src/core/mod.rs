pub mod api;
pub mod auth;
pub mod events;
pub mod poller;
pub mod registry;
pub mod store;
pub mod terminal;
pub mod tools;
