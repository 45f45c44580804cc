//! 辅导层：请求分类、分发、讲解模板、性格化文案与翻译

pub mod classifier;
pub mod dispatcher;
pub mod explanations;
pub mod personality;
pub mod translation;

pub use classifier::{extract_topic, RequestClassifier};
pub use dispatcher::{
    HandlerContext, HandlerOutput, ResponseDispatcher, ResponseHandler, APOLOGY_MESSAGE,
};
pub use explanations::{explanation_template, Complexity};
pub use personality::{farewell_message, personality_suffix, welcome_message, with_personality};
pub use translation::{PlaceholderTranslator, Translator};
