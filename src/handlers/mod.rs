//! 핸들러 모듈

pub mod connection;
pub mod error;
pub mod room;
pub mod score;

pub use connection::*;
pub use error::*;
pub use room::*;
pub use score::*;
