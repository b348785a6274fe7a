mod install;
mod scc;

pub use install::*;
pub use scc::*;
