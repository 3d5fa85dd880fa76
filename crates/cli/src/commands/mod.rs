pub mod analyze;
pub mod samples;
pub mod storage;
pub mod util;

pub use analyze::*;
pub use samples::*;
pub use storage::*;
pub use util::*;
