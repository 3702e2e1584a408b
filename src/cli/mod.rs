pub mod options;
pub mod report;

mod error;
pub use self::error::Error;
