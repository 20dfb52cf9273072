pub mod db;
pub mod questions_llm;
pub mod script;
pub mod youtube;
pub mod ytdlp;

pub use db::DbAdapter;
pub use questions_llm::OpenAiQuestionAdapter;
pub use script::ScriptStrategy;
pub use youtube::{TimedTextStrategy, YouTubeMetadataAdapter};
pub use ytdlp::YtDlpStrategy;
