//! 점수 장부: 저장소, 정산, 점수 이동 조정

pub mod coordinator;
pub mod error;
pub mod model;
pub mod settlement;
pub mod store;

pub use coordinator::*;
pub use error::*;
pub use model::*;
pub use store::*;
