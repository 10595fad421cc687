pub mod event;
pub mod gps;
pub mod order;
pub mod registry;
pub mod user;
pub mod warehouse;
