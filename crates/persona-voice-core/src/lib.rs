//! Core types, config, errors, character table and provider registry for Persona Voice.

pub mod character;
pub mod config;
pub mod error;
pub mod voice;
