// src/handlers/mod.rs

pub mod auth;
pub mod feed;
pub mod follows;
pub mod likes;
pub mod posts;
