pub mod bbox;
pub mod cli;
pub mod config;
pub mod cutoff;
pub mod db;
pub mod error;
pub mod extract;
pub mod matcher;
pub mod model;
pub mod pipeline;

pub use config::Opts;
pub use db::ReferenceDatabase;
pub use error::{Error, Result};
pub use pipeline::{Identification, MatchContext};
