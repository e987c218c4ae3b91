//! Static analysis for the tagcss compiler core.
//!
//! * [`scope`] resolves every identifier to the binding that declares it
//! * [`normalize`] turns ESM and compiled CommonJS into one table of imports
//!   and exports
//! * [`graph`] records what each top-level node needs in order to evaluate
//! * [`shaker`] prunes a module down to the code behind a set of exports
//! * [`prepare`] runs the whole pipeline and lowers the result for the sandbox

pub mod esm_to_cjs;
pub mod graph;
pub mod normalize;
pub mod prepare;
pub mod scope;
pub mod shaker;
pub mod static_value;
pub mod utils;

pub use graph::DependencyGraph;
pub use normalize::normalize;
pub use normalize::NormalizedModule;
pub use prepare::prepare_for_sandbox;
pub use prepare::PrepareOptions;
pub use prepare::PreparedModule;
pub use prepare::ShakerError;
pub use shaker::shake;
pub use shaker::ShakeResult;
pub use shaker::ShakerOptions;
pub use static_value::static_value;
pub use static_value::StaticValue;
pub use static_value::StaticValueError;
pub use utils::Warning;
