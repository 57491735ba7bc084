//! # courier-transports
//!
//! Chat platform adapters. Each adapter implements
//! [`courier_core::traits::Transport`]: it reports new messages and the
//! highest markers it observed; the gateway owns cursor persistence,
//! authorization, and dispatch.

pub mod telegram;
pub mod teams;

pub use telegram::TelegramTransport;
pub use teams::TeamsTransport;
