pub mod candidate;
pub mod errors;
pub mod problem;
pub mod template;
pub mod value;

pub use candidate::*;
pub use errors::*;
pub use problem::*;
pub use template::*;
pub use value::*;
