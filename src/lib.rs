pub mod config;
pub mod transfer;
pub mod web;
