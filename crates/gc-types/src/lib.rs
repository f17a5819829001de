pub mod basis;
pub mod cancel;
pub mod errors;
pub mod params;
pub mod record;

pub use basis::*;
pub use cancel::*;
pub use errors::*;
pub use params::*;
pub use record::*;
