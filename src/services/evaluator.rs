//! 评分服务

use crate::models::{Answers, EvaluationSpec, QuestionVerdict, Verdict};

/// 单张答题卡的评分结果
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f64,
    pub verdicts: Vec<QuestionVerdict>,
}

/// 按评分配置给拼接后的答案打分
///
/// 答案缺失或等于 `empty_value` 视为未作答。
pub fn evaluate(spec: &EvaluationSpec, response: &Answers, empty_value: &str) -> Evaluation {
    let mut score = 0.0;
    let mut verdicts = Vec::with_capacity(spec.questions().len());

    for (question, expected) in spec.questions() {
        let marked = response.get(question).unwrap_or(empty_value);
        let scheme = spec.scheme_for(question);

        let (verdict, delta) = if marked.is_empty() || marked == empty_value {
            (Verdict::Unmarked, scheme.unmarked)
        } else if expected.accepts(marked) {
            (Verdict::Correct, scheme.correct)
        } else {
            (Verdict::Incorrect, scheme.incorrect)
        };

        score += delta;
        verdicts.push(QuestionVerdict {
            question: question.clone(),
            marked: marked.to_string(),
            expected: expected.clone(),
            verdict,
            delta,
        });
    }

    Evaluation { score, verdicts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scores_each_verdict() {
        let spec = EvaluationSpec::from_value(&json!({
            "options": {
                "questions_in_order": ["q1..4"],
                "answers_in_order": ["A", ["B", "C"], "D", "A"]
            },
            "marking_schemes": {
                "DEFAULT": { "correct": "3", "incorrect": "-1", "unmarked": "0" }
            }
        }))
        .unwrap();
        let response: Answers = [("q1", "A"), ("q2", "C"), ("q3", "B"), ("q4", "")]
            .into_iter()
            .collect();

        let evaluation = evaluate(&spec, &response, "");
        assert_eq!(evaluation.score, 5.0);
        let verdicts: Vec<Verdict> = evaluation.verdicts.iter().map(|v| v.verdict).collect();
        assert_eq!(
            verdicts,
            vec![Verdict::Correct, Verdict::Correct, Verdict::Incorrect, Verdict::Unmarked]
        );
    }
}
