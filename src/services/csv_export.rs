//! CSV 导出服务

use crate::models::ProcessingResult;

/// 把结果导出为 CSV，每张图像一行
///
/// 列：`file_name,status[,score],<答案列（首次出现顺序）>,message`
pub fn results_to_csv(results: &[ProcessingResult]) -> Result<Vec<u8>, csv::Error> {
    let mut answer_columns: Vec<&str> = Vec::new();
    let mut has_score = false;
    for report in results.iter().filter_map(|r| r.report()) {
        has_score |= report.score.is_some();
        for label in report.response.labels() {
            if !answer_columns.contains(&label) {
                answer_columns.push(label);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["file_name", "status"];
    if has_score {
        header.push("score");
    }
    header.extend(answer_columns.iter().copied());
    header.push("message");
    writer.write_record(&header)?;

    for result in results {
        let mut row: Vec<String> = vec![result.file_name().to_string()];
        match result {
            ProcessingResult::Success(report) => {
                row.push("success".to_string());
                if has_score {
                    row.push(report.score.map(|s| s.to_string()).unwrap_or_default());
                }
                for column in &answer_columns {
                    row.push(report.response.get(column).unwrap_or_default().to_string());
                }
                row.push(String::new());
            }
            ProcessingResult::Error(failure) => {
                row.push("error".to_string());
                if has_score {
                    row.push(String::new());
                }
                row.extend(answer_columns.iter().map(|_| String::new()));
                row.push(failure.message.clone());
            }
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answers, ItemReport, ResultMetadata};

    fn success(file_name: &str, answers: &[(&str, &str)], score: Option<f64>) -> ProcessingResult {
        ProcessingResult::Success(ItemReport {
            file_name: file_name.to_string(),
            response: answers.iter().copied().collect::<Answers>(),
            raw_response: Answers::new(),
            metadata: ResultMetadata {
                multi_marked: false,
                multi_roll: false,
                multi_marked_count: 0,
                image_dimensions: [400, 300],
            },
            score,
            evaluation: None,
            processed_image: None,
        })
    }

    #[test]
    fn test_csv_rows_and_columns() {
        let results = vec![
            success("a.png", &[("q1", "A"), ("q2", "B")], Some(6.0)),
            ProcessingResult::failure("b.png", "图像解码失败"),
            success("c.png", &[("q1", "C"), ("q3", "D")], None),
        ];
        let csv = String::from_utf8(results_to_csv(&results).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "file_name,status,score,q1,q2,q3,message");
        assert_eq!(lines[1], "a.png,success,6,A,B,,");
        assert_eq!(lines[2], "b.png,error,,,,,图像解码失败");
        assert_eq!(lines[3], "c.png,success,,C,,D,");
    }
}
