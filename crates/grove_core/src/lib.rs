//! Core utilities for grove.
//!
//! This crate provides foundational types shared by the syntax and runtime layers:
//! - `span`: Source location tracking
//! - `location`: Byte offset to line/column mapping
//! - `diagnostics`: Error reporting

pub mod diagnostics;
pub mod location;
pub mod span;

pub use diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSeverity, Label};
pub use location::{LineIndex, Location};
pub use span::Span;
