pub mod library;

pub use library::PromptLibrary;
