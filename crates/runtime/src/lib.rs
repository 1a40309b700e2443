//! SwiftScript runtime: heap, reference counting, and the bytecode VM.
//!
//! The runtime restores an [`swive_core::Assembly`] and executes it on a
//! single-threaded stack machine with an explicitly managed object heap:
//!
//! - `object` / `heap`: object variants and the all-objects table
//! - `rc`: retain/release/adopt, weak references, the deferred-release
//!   drain with its deleted-set cycle guard
//! - `vm`: opcode dispatch, the call convention, property access with
//!   observer re-entry, closures and upvalue lifetime management
//!
//! Globals, the object table and the deferred queue are per-VM; a `Vm`
//! must not be shared across threads.

pub mod error;
pub mod heap;
pub mod object;
pub mod rc;
pub mod stats;
pub mod vm;

pub use error::RuntimeError;
pub use heap::{Header, Heap};
pub use object::{ObjBody, ObjKind};
pub use stats::MemoryStats;
pub use vm::{CallFrame, MAX_FRAMES, Vm, VmConfig};

pub use swive_core::value::{ObjId, ObjRef, RefKind, Value};
