use std::fmt;

/// 应用程序错误类型
///
/// 只描述"共享上下文"层面的错误（配置、模板、标记、文件、请求）。
/// 这些错误会在任何图像被处理之前终止整个请求。
/// 单张图像的错误（解码、识别）不在这里，见 `workflow::ItemError`。
#[derive(Debug)]
pub enum AppError {
    /// 配置错误
    Config(ConfigError),
    /// 模板错误
    Template(TemplateError),
    /// 标记图像错误
    Marker(MarkerError),
    /// 文件操作错误
    File(FileError),
    /// 请求格式错误
    Request(RequestError),
    /// 评分配置错误
    Evaluation(EvaluationError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl AppError {
    /// 错误分类名称（对外暴露在响应的 `error` 字段中）
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "ConfigValidationError",
            AppError::Template(_) => "TemplateValidationError",
            AppError::Marker(_) => "MarkerResolutionError",
            AppError::File(FileError::DirectoryNotFound { .. }) => "DirectoryNotFoundError",
            AppError::File(FileError::MissingRequired { .. }) => "MissingRequiredFileError",
            AppError::File(_) => "FileError",
            AppError::Request(RequestError::PayloadTooLarge { .. }) => "PayloadTooLargeError",
            AppError::Request(_) => "InvalidRequestError",
            AppError::Evaluation(_) => "EvaluationConfigError",
            AppError::Other(_) => "InternalError",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Template(e) => write!(f, "模板错误: {}", e),
            AppError::Marker(e) => write!(f, "标记错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Request(e) => write!(f, "请求错误: {}", e),
            AppError::Evaluation(e) => write!(f, "评分配置错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Template(e) => Some(e),
            AppError::Marker(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Request(e) => Some(e),
            AppError::Evaluation(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 用户配置不是 JSON 对象
    NotAnObject {
        source_name: String,
    },
    /// 用户配置不是合法的 JSON
    MalformedJson {
        source_name: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 合并后的配置字段类型不正确
    InvalidField {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 尺寸超出允许范围
    DimensionOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotAnObject { source_name } => {
                write!(f, "{} 必须是 JSON 对象", source_name)
            }
            ConfigError::MalformedJson {
                source_name,
                source,
            } => {
                write!(f, "{} 不是合法的 JSON: {}", source_name, source)
            }
            ConfigError::InvalidField { source } => {
                write!(f, "配置字段类型不正确: {}", source)
            }
            ConfigError::DimensionOutOfRange { field, value, max } => {
                write!(f, "dimensions.{} = {} 超出允许范围 (1..={})", field, value, max)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::MalformedJson { source, .. } | ConfigError::InvalidField { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            ConfigError::NotAnObject { .. } | ConfigError::DimensionOutOfRange { .. } => None,
        }
    }
}

/// 模板错误
#[derive(Debug)]
pub enum TemplateError {
    /// 模板结构校验失败（逐条列出）
    Invalid {
        errors: Vec<String>,
        warnings: Vec<String>,
    },
    /// 模板不是合法的 JSON
    MalformedJson {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateError::Invalid { errors, .. } => {
                write!(f, "模板校验失败: {}", errors.join("; "))
            }
            TemplateError::MalformedJson { source } => {
                write!(f, "模板不是合法的 JSON: {}", source)
            }
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TemplateError::MalformedJson { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            TemplateError::Invalid { .. } => None,
        }
    }
}

/// 标记图像错误
#[derive(Debug)]
pub enum MarkerError {
    /// 三个来源都无法提供可读的标记图像
    Unresolved {
        step: String,
        attempts: Vec<String>,
    },
    /// 持久化临时标记文件失败
    PersistFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerError::Unresolved { step, attempts } => {
                if attempts.is_empty() {
                    write!(f, "预处理步骤 {} 需要标记图像，但未提供任何来源", step)
                } else {
                    write!(
                        f,
                        "预处理步骤 {} 需要标记图像，所有来源均不可用: {}",
                        step,
                        attempts.join("; ")
                    )
                }
            }
            MarkerError::PersistFailed { source } => {
                write!(f, "无法保存临时标记文件: {}", source)
            }
        }
    }
}

impl std::error::Error for MarkerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MarkerError::PersistFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            MarkerError::Unresolved { .. } => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 必需文件不存在
    MissingRequired {
        name: String,
        location: String,
    },
    /// 目录不存在
    DirectoryNotFound {
        path: String,
    },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::MissingRequired { name, location } => {
                write!(f, "缺少必需文件 {} (位置: {})", name, location)
            }
            FileError::DirectoryNotFound { path } => write!(f, "目录不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 请求格式错误
#[derive(Debug)]
pub enum RequestError {
    /// 没有上传任何图像
    NoImages,
    /// 图像文件扩展名不被允许
    InvalidImageFile {
        file_name: String,
    },
    /// 图像总大小超过上限
    PayloadTooLarge {
        actual: usize,
        limit: usize,
    },
    /// 请求体无法解析
    Malformed {
        message: String,
    },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::NoImages => write!(f, "未提供图像文件"),
            RequestError::InvalidImageFile { file_name } => {
                write!(f, "不支持的图像文件: {}", file_name)
            }
            RequestError::PayloadTooLarge { actual, limit } => {
                write!(
                    f,
                    "图像总大小 {} 字节超过上限 {} 字节 ({}MB)",
                    actual,
                    limit,
                    limit / (1024 * 1024)
                )
            }
            RequestError::Malformed { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for RequestError {}

/// 评分配置错误
#[derive(Debug)]
pub enum EvaluationError {
    /// 评分配置结构不正确
    InvalidSpec {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 题目数量与答案数量不一致
    LengthMismatch {
        questions: usize,
        answers: usize,
    },
    /// 缺少 DEFAULT 评分方案
    MissingDefaultScheme,
    /// 分值无法解析
    InvalidScore {
        value: String,
    },
    /// 题号范围无法解析
    InvalidQuestions {
        message: String,
    },
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationError::InvalidSpec { source } => write!(f, "评分配置结构不正确: {}", source),
            EvaluationError::LengthMismatch { questions, answers } => {
                write!(
                    f,
                    "题目数量 ({}) 与答案数量 ({}) 不一致",
                    questions, answers
                )
            }
            EvaluationError::MissingDefaultScheme => write!(f, "缺少 DEFAULT 评分方案"),
            EvaluationError::InvalidScore { value } => write!(f, "无法解析分值: {}", value),
            EvaluationError::InvalidQuestions { message } => write!(f, "题号无法解析: {}", message),
        }
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvaluationError::InvalidSpec { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建必需文件缺失错误
    pub fn missing_file(name: impl Into<String>, location: impl Into<String>) -> Self {
        AppError::File(FileError::MissingRequired {
            name: name.into(),
            location: location.into(),
        })
    }

    /// 创建请求格式错误
    pub fn malformed_request(message: impl Into<String>) -> Self {
        AppError::Request(RequestError::Malformed {
            message: message.into(),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_follow_taxonomy() {
        assert_eq!(
            AppError::missing_file("template.json", "/tmp").kind(),
            "MissingRequiredFileError"
        );
        assert_eq!(
            AppError::File(FileError::DirectoryNotFound {
                path: "/nope".to_string()
            })
            .kind(),
            "DirectoryNotFoundError"
        );
        assert_eq!(
            AppError::Request(RequestError::PayloadTooLarge {
                actual: 10,
                limit: 5
            })
            .kind(),
            "PayloadTooLargeError"
        );
        assert_eq!(
            AppError::Template(TemplateError::Invalid {
                errors: vec!["x".to_string()],
                warnings: vec![],
            })
            .kind(),
            "TemplateValidationError"
        );
    }

    #[test]
    fn test_template_error_lists_every_sub_error() {
        let err = AppError::Template(TemplateError::Invalid {
            errors: vec![
                "Missing 'pageDimensions'".to_string(),
                "Missing or empty 'fieldBlocks'".to_string(),
            ],
            warnings: vec![],
        });
        let text = err.to_string();
        assert!(text.contains("pageDimensions"));
        assert!(text.contains("fieldBlocks"));
    }
}
