//! Bailout: adaptive inline caches and frame deoptimization
//!
//! The two halves of the speculation machinery of a tiered JavaScript engine:
//!
//! - **Inline caches** specialize every property access, call, comparison and
//!   arithmetic site on the receiver shapes and operand types it has seen, and widen
//!   the specialization when an assumption fails.
//! - **The deoptimizer** rebuilds unoptimized frames from an optimized frame when
//!   optimized code bails out, and runs the reverse translation for on-stack
//!   replacement.
//!
//! # Quick Start
//!
//! ```no_run
//! use bailout::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut isolate = Isolate::new();
//!     let x = isolate.heap_mut().intern("x");
//!     let object = isolate.heap_mut().new_object();
//!     isolate.heap_mut().add_property(object, x, Value::Smi(1), PropertyAttributes::empty());
//!
//!     let mut site = isolate.new_site(IcKind::Load, ExtraIcState::default());
//!     let value = isolate.load(&mut site, Value::Object(object), x)?;
//!     println!("{} via a {} site", value, site.state());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! | Category | Modules |
//! |----------|---------|
//! | **Object model** | [`heap`] |
//! | **Speculation** | [`ic`], [`deopt`] |
//! | **Context** | [`isolate`], [`config`], [`error`](Error) |
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::new_without_default)]

pub mod config;
pub mod deopt;
pub mod error;
pub mod heap;
pub mod ic;
pub mod isolate;
pub mod prelude;

pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use heap::{Heap, Value};
pub use isolate::Isolate;

/// Bailout version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
