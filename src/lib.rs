pub mod catalog;
pub mod config;
pub mod error;
pub mod geometry;
pub mod localization;
pub mod registry;
pub mod render;
pub mod resolution;
pub mod services;
pub mod system;
