//! Transport-facing handlers

pub mod websocket;
