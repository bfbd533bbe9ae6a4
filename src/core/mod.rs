pub mod cancel;
pub mod error;
pub mod names;
pub mod value;

pub use cancel::CancelToken;
pub use error::{Result, ThingError};
pub use value::Value;
