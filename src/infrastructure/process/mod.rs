pub mod invoker;
pub mod toolchain;

pub use invoker::CommandSpec;
pub use toolchain::ToolChain;
