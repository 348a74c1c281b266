//! Integration tests for quoter-bot.
//!
//! These tests verify the interaction between components:
//! - WebSocket session lifecycle against a mock exchange
//! - Quoting loop against the paper venue

pub mod common;
