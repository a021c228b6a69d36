pub mod domain;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod ports;
pub mod quota;
pub mod reconciler;
pub mod session;
pub mod translator;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use domain::{
    FinalStatus, Flashcard, FlashcardSource, GenerationSession, NewFlashcard,
    SessionFinalization, SessionStatus,
};
pub use error::{GenerationError, GenerationResult};
pub use pipeline::{GenerationPipeline, GenerationSettings};
pub use ports::{DatabaseService, PortError, PortResult, TranslationError, TranslationService};
pub use quota::{QuotaStatus, QuotaWindow};
pub use reconciler::GenerationOutcome;
