pub mod application;
pub mod types;
pub mod view;
