pub mod claude;
pub mod error;
pub mod util;

pub use claude::{Claude, Completion};
pub use error::{AiError, Result};
