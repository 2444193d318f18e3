//! Record handler implementations

mod log;

pub use self::log::LogHandler;
