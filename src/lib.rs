pub mod capture;
pub mod client;
pub mod config;
pub mod error;
pub mod input;
pub mod pcm;
pub mod playback;
pub mod presentation;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;
pub mod turns;

pub use error::{ClientError, Result};
