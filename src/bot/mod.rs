//! Chat transport: Telegram Bot API client and the update dispatcher.
//!
//! This module provides:
//! * [`ChatTransport`]: async trait over the three calls the bot makes.
//! * [`BotApi`]: `getUpdates` / `sendMessage` / `getFile` over reqwest.
//! * [`Dispatcher`]: long-poll loop, per-chat routing, expiry notices.
//! * [`classify`]: maps a raw message to a command, audio, or text.

pub mod dispatcher;
pub mod telegram;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use dispatcher::{classify, Command, Dispatcher, Inbound};
pub use telegram::{BotApi, BotError, ChatTransport, FileRef, Message, Update};
