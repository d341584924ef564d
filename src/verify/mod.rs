//! The backward-verification dialogue controller.
//!
//! Translates `start`/`answer` turns into session-store operations, delegates
//! every hypothesis-narrowing decision to the rule engine, and shapes the
//! protocol reply for the caller.

mod controller;

pub use controller::{
    AbandonReply, AnswerParams, AnswerReply, SessionSnapshot, StartParams, StartReply, Verifier,
};
