//! Core modules for the survey runner

pub mod timer;
pub mod similarity;
pub mod session;
pub mod gateway;
pub mod sink;
pub mod writer;
pub mod driver;
pub mod api;

pub use similarity::{is_rejected, levenshtein, RejectKind, SimilarityFilter};
pub use session::SessionState;
pub use gateway::{
    coerce_label, CategorizationGateway, Categorizer, OfflineCategorizer, OpenAiCategorizer,
};
pub use sink::{build_sink, CsvFileSink, FallbackSink, RemoteSink, Sink};
pub use writer::{TrialWriter, WriterStats};
pub use driver::{SessionParams, SurveySession};
pub use api::{create_router, run_server};
