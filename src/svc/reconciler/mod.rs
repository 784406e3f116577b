//! # Reconciler module
//!
//! This module provides the three interchangeable [`super::watcher::ResourceController`]
//! implementations selected on the command line: a reconciler that only
//! logs the events it receives (`--nop`), one that renders a directory of
//! text templates and shells out to `kubectl` (`--templates`), and one that
//! renders an embedded chart and tracks helm-style releases (`--helm-chart`).

pub mod chart;
pub mod print;
pub mod template;
