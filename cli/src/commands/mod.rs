pub mod apply;
pub mod chat;
pub mod geocode;
pub mod markers;
pub mod tools;
pub mod transfer;
pub mod view;
