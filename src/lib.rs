mod database {
    pub mod actions;
    pub mod error;
    pub mod memory;
    pub mod pagination;
    pub mod postgres;
    pub mod schema;
    pub mod store;
}
mod authentication {
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod constants;

pub mod config;
pub mod media;
pub mod routes;

pub use authentication::*;
pub use constants::*;
pub use database::*;
