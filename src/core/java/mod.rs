pub mod runtime;

pub use runtime::find_java_binary;
pub use runtime::java_exe;
pub use runtime::{JavaRuntime, RuntimeSource};
