//! 回复生成层：协作方抽象与 Mock 实现

pub mod mock;
pub mod traits;

pub use mock::MockResponseGenerator;
pub use traits::{GenerationContext, ResponseGenerator};
