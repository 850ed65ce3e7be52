//! Marshalling layer between host code and an embedded Lua runtime
//!
//! The guest runtime keeps its values on a call stack reachable only through
//! a stack-indexed API. This crate provides:
//! - **Argument**: a tagged dynamic value covering everything the guest can
//!   produce, usable as a guest-table key (value equality and hashing)
//! - **StackBridge**: parses stack slots into Arguments, pushes Arguments
//!   back (nested tables included), and drives protected guest calls
//! - **GuestVm**: the trait describing the runtime surface the bridge
//!   consumes; the runtime itself stays an external collaborator
//! - **ModuleApi**: registration glue for guest-callable entry points with
//!   catch-and-convert failure handling
//!
//! # Example
//!
//! ```rust,ignore
//! use lua_bridge::{Argument, ArgumentKind, ModuleApi, StackBridge};
//!
//! let mut api = ModuleApi::new();
//! api.register("add", |bridge: &mut StackBridge<MyVm>| {
//!     let args = bridge.capture_typed(&[ArgumentKind::Number, ArgumentKind::Number])?;
//!     let sum = args[0].as_number()? + args[1].as_number()?;
//!     bridge.push_one(&Argument::Number(sum))?;
//!     Ok(1)
//! });
//! ```

mod bridge;
mod collection;
mod error;
pub mod mock;
mod module;
mod object;
mod value;
mod vm;

pub use bridge::StackBridge;
pub use collection::{list_from_map, map_from_list};
pub use error::{Error, Result};
pub use module::{EntryPoint, ModuleApi};
pub use object::{ObjectId, ObjectRef};
pub use value::{Argument, ArgumentKind};
pub use vm::{CallStatus, GuestVm, RawType, REGISTRY_INDEX};
