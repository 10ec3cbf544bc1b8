mod error;
mod files;
mod svr;

pub use svr::startup;
