//! 服务层
//!
//! 纯业务规则：配置合并、标记解析、模板物化、结果拼接、评分、导出

pub mod config_resolver;
pub mod csv_export;
pub mod evaluator;
pub mod marker_resolver;
pub mod response_assembler;
pub mod template_materializer;

pub use config_resolver::{deep_merge, ConfigLayer, ConfigResolver};
pub use csv_export::results_to_csv;
pub use evaluator::{evaluate, Evaluation};
pub use marker_resolver::MarkerResolver;
pub use response_assembler::concatenate_response;
pub use template_materializer::{TemplateMaterializer, TemplateValidation};
