//! 评分配置模型
//!
//! 评分配置格式：
//!
//! ```json
//! {
//!   "options": { "questions_in_order": ["q1..4"], "answers_in_order": ["A", ["B", "C"], "D", "A"] },
//!   "marking_schemes": {
//!     "DEFAULT": { "correct": "3", "incorrect": "-1", "unmarked": "0" },
//!     "SECTION_1": { "questions": ["q1..2"], "marking": { "correct": 4, "incorrect": 0, "unmarked": 0 } }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::EvaluationError;
use crate::models::template::parse_field_labels;

const DEFAULT_SCHEME: &str = "DEFAULT";

/// 标准答案：单个选项，或多个可接受选项中的任意一个
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedAnswer {
    Single(String),
    AnyOf(Vec<String>),
}

impl ExpectedAnswer {
    pub fn accepts(&self, marked: &str) -> bool {
        match self {
            ExpectedAnswer::Single(answer) => answer == marked,
            ExpectedAnswer::AnyOf(answers) => answers.iter().any(|a| a == marked),
        }
    }
}

/// 评分方案（分值已解析为数字）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkingScheme {
    pub correct: f64,
    pub incorrect: f64,
    pub unmarked: f64,
}

/// 分区评分方案
#[derive(Debug, Clone, PartialEq)]
pub struct SectionScheme {
    pub name: String,
    pub questions: Vec<String>,
    pub marking: MarkingScheme,
}

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Correct,
    Incorrect,
    Unmarked,
}

/// 单题评分明细
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionVerdict {
    pub question: String,
    pub marked: String,
    pub expected: ExpectedAnswer,
    pub verdict: Verdict,
    pub delta: f64,
}

/// 已校验的评分配置
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationSpec {
    questions: Vec<(String, ExpectedAnswer)>,
    default_scheme: MarkingScheme,
    sections: Vec<SectionScheme>,
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    options: RawOptions,
    marking_schemes: Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct RawOptions {
    questions_in_order: Vec<String>,
    answers_in_order: Vec<ExpectedAnswer>,
}

#[derive(Debug, Deserialize)]
struct RawMarking {
    correct: JsonValue,
    incorrect: JsonValue,
    unmarked: JsonValue,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    questions: Vec<String>,
    marking: RawMarking,
}

impl EvaluationSpec {
    /// 从 JSON 解析并校验评分配置
    pub fn from_value(raw: &JsonValue) -> Result<Self, EvaluationError> {
        let doc: RawEvaluation = serde_json::from_value(raw.clone()).map_err(invalid_spec)?;

        let questions = parse_field_labels(&doc.options.questions_in_order)
            .map_err(|message| EvaluationError::InvalidQuestions { message })?;
        let answers = doc.options.answers_in_order;
        if questions.len() != answers.len() {
            return Err(EvaluationError::LengthMismatch {
                questions: questions.len(),
                answers: answers.len(),
            });
        }

        let default_raw = doc
            .marking_schemes
            .get(DEFAULT_SCHEME)
            .ok_or(EvaluationError::MissingDefaultScheme)?;
        let default_marking: RawMarking =
            serde_json::from_value(default_raw.clone()).map_err(invalid_spec)?;
        let default_scheme = MarkingScheme::from_raw(&default_marking)?;

        let mut sections = Vec::new();
        for (name, value) in &doc.marking_schemes {
            if name == DEFAULT_SCHEME {
                continue;
            }
            let section: RawSection = serde_json::from_value(value.clone()).map_err(invalid_spec)?;
            let section_questions = parse_field_labels(&section.questions)
                .map_err(|message| EvaluationError::InvalidQuestions { message })?;
            sections.push(SectionScheme {
                name: name.clone(),
                questions: section_questions,
                marking: MarkingScheme::from_raw(&section.marking)?,
            });
        }

        Ok(Self {
            questions: questions.into_iter().zip(answers).collect(),
            default_scheme,
            sections,
        })
    }

    /// 解析原始评分配置文本（上传内容或磁盘文件）
    pub fn parse_bytes(bytes: &[u8]) -> Result<JsonValue, EvaluationError> {
        serde_json::from_slice(bytes).map_err(invalid_spec)
    }

    /// 按顺序列出 (题号, 标准答案)
    pub fn questions(&self) -> &[(String, ExpectedAnswer)] {
        &self.questions
    }

    /// 题目适用的评分方案（分区优先，否则 DEFAULT）
    pub fn scheme_for(&self, question: &str) -> &MarkingScheme {
        self.sections
            .iter()
            .find(|s| s.questions.iter().any(|q| q == question))
            .map(|s| &s.marking)
            .unwrap_or(&self.default_scheme)
    }

    pub fn sections(&self) -> &[SectionScheme] {
        &self.sections
    }
}

impl MarkingScheme {
    fn from_raw(raw: &RawMarking) -> Result<Self, EvaluationError> {
        Ok(Self {
            correct: parse_score(&raw.correct)?,
            incorrect: parse_score(&raw.incorrect)?,
            unmarked: parse_score(&raw.unmarked)?,
        })
    }
}

fn invalid_spec(err: serde_json::Error) -> EvaluationError {
    EvaluationError::InvalidSpec {
        source: Box::new(err),
    }
}

/// 解析分值：数字、数字字符串或分数字符串（如 "-1/4"）
pub fn parse_score(value: &JsonValue) -> Result<f64, EvaluationError> {
    let invalid = || EvaluationError::InvalidScore {
        value: value.to_string(),
    };
    match value {
        JsonValue::Number(n) => n.as_f64().ok_or_else(invalid),
        JsonValue::String(s) => {
            let s = s.trim();
            match s.split_once('/') {
                Some((num, den)) => {
                    let num: f64 = num.trim().parse().map_err(|_| invalid())?;
                    let den: f64 = den.trim().parse().map_err(|_| invalid())?;
                    if den == 0.0 {
                        return Err(invalid());
                    }
                    Ok(num / den)
                }
                None => s.parse().map_err(|_| invalid()),
            }
        }
        _ => Err(invalid()),
    }
}
