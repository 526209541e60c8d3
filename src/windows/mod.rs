//! Win32 plumbing for the bridge.
//!
//! Two independent pieces live here:
//!
//! - [`FsuipcLink`]: the client side of FSUIPC's window-message IPC, used by
//!   [`crate::source::FsuipcSource`]
//! - [`Win32Backend`]: the named file mapping and liveness mutex the consumer
//!   reads, used by [`crate::publisher::SharedBufferPublisher`]
//!
//! Both map memory directly and release their kernel objects on drop.

mod fsuipc_link;
mod named_region;

pub use fsuipc_link::FsuipcLink;
pub use named_region::{Win32Backend, Win32Liveness, Win32Region};
