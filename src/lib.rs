//! dango: the core of a VT-compatible terminal emulator
//!
//! This crate wires the pieces together: pty bytes flow through the
//! UTF-8 decoder and VT state machine of [`dango_parser`], the
//! [`Terminal`] controller interprets the resulting events against the
//! grid model of [`dango_core`], and accumulated damage is flushed out
//! through the [`Renderer`] trait as batched same-style runs.
//!
//! The windowing layer, pty lifecycle, clipboard and key translation all
//! live on the far side of the [`Renderer`] and [`Tty`] traits; the core
//! is pure in-memory state driven by a single execution context.

mod config;
mod renderer;
mod terminal;
mod tty;

pub use config::Config;
pub use renderer::Renderer;
pub use terminal::Terminal;
pub use tty::Tty;

pub use dango_core as core;
pub use dango_parser as parser;
