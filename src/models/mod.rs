pub mod config;
pub mod evaluation;
pub mod field_type;
pub mod loaders;
pub mod marker;
pub mod result;
pub mod template;

pub use config::ConfigSnapshot;
pub use evaluation::{EvaluationSpec, ExpectedAnswer, MarkingScheme, QuestionVerdict, Verdict};
pub use field_type::Direction;
pub use loaders::read_optional_bytes;
pub use marker::{MarkerAsset, MarkerSource, ResolvedMarker};
pub use result::{
    Answers, BatchResult, ItemFailure, ItemReport, ProcessOptions, ProcessOutcome,
    ProcessingItem, ProcessingResult, ResultMetadata,
};
pub use template::{
    CustomLabel, Field, FieldBlock, MaterializedTemplate, PreProcessor, TemplateSpec,
};
