pub mod catalog;
pub mod clock;
pub mod config;
pub mod events;
pub mod repository;
pub mod rotation;
pub mod sink;
pub mod tasks {
    pub mod scheduler;
    pub mod viewer;
}
