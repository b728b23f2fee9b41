//! Debugger core for a multi-system retro-console emulator.
//!
//! This crate observes every CPU instruction and every memory access an
//! emulation core reports through [`multidbg_arch`]'s capability traits, and
//! decides — per access — whether to pause, log, annotate, or invoke user
//! scripts, without perceptibly slowing emulation. It never emulates a
//! console itself.
//!
//! The six subsystems (expression evaluator, label store, disassembly cache,
//! CDL recorder, breakpoint engine, call-stack/profiler) plus the step
//! coordinator, script bridge, frozen-address filter, and event recorder are
//! composed by [`facade::Debugger`], the single entry point an emulation
//! core talks to.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod breakpoint;
pub mod callstack;
pub mod cdl;
pub mod cfg;
pub mod disasm;
pub mod error;
pub mod event;
pub mod expr;
pub mod facade;
pub mod frozen;
pub mod label;
pub mod profiler;
pub mod script;
pub mod step;
pub mod trace;

pub use multidbg_arch as arch;

pub use self::error::{Error, Result};
pub use self::facade::Debugger;
