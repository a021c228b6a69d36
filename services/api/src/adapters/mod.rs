pub mod db;
pub mod translation_llm;

pub use db::DbAdapter;
pub use translation_llm::OpenAiTranslationAdapter;
