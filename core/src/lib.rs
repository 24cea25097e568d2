pub mod config;
pub mod error;
pub mod stream;
pub mod util;
pub mod val;

// Context model, exception routing, dispatch and offline disassembly
pub mod vm;

pub use config::VmConfig;
pub use error::{Fault, Thrown};
pub use val::Val;
