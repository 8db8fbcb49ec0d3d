//! 结果拼接服务
//!
//! 把流水线输出的逐字段结果拼接为逻辑答案：
//! 自定义标签（如学号）按声明的字段顺序拼成一个答案，其余字段原样保留。

use crate::models::{Answers, MaterializedTemplate};

/// 拼接逐字段结果
///
/// 输出顺序：自定义标签在前，其余字段按模板声明顺序；
/// 模板声明了 `outputColumns` 时，列出的列排在最前并按其顺序排列。
pub fn concatenate_response(raw: &Answers, template: &MaterializedTemplate) -> Answers {
    let mut concatenated = Answers::new();

    for custom in template.custom_labels() {
        let value: String = custom
            .fields
            .iter()
            .filter_map(|field| raw.get(field))
            .collect();
        concatenated.insert(custom.name.clone(), value);
    }

    for (label, value) in raw.iter() {
        if template.custom_label_of(label).is_none() {
            concatenated.insert(label, value);
        }
    }

    let columns = &template.spec().output_columns;
    if columns.is_empty() {
        return concatenated;
    }

    let mut ordered = Answers::new();
    for column in columns {
        if let Some(value) = concatenated.get(column) {
            ordered.insert(column.clone(), value);
        }
    }
    for (label, value) in concatenated.iter() {
        if ordered.get(label).is_none() {
            ordered.insert(label, value);
        }
    }
    ordered
}
