//! 集成测试共用的合成答题卡
//!
//! 页面 300x400，气泡 20x20：
//! - MCQ 块: QTYPE_MCQ4，origin [40, 40]，q1..q4 每行一题
//! - Roll 块: QTYPE_INT，origin [200, 40]，r1..r2 两列，自定义标签 Roll
#![allow(dead_code)]

use std::path::Path;

use image::{GrayImage, Luma};
use omr_checker_api::Config;
use serde_json::{json, Value};

pub const PAGE_WIDTH: u32 = 300;
pub const PAGE_HEIGHT: u32 = 400;
const BUBBLE: u32 = 20;

/// 默认涂卡：q1=A q2=C q3=D q4=B，学号 42
pub const DEFAULT_ANSWERS: [(&str, &str); 4] = [("q1", "A"), ("q2", "C"), ("q3", "D"), ("q4", "B")];
pub const DEFAULT_ROLL: [u8; 2] = [4, 2];

pub fn sheet_template() -> Value {
    json!({
        "pageDimensions": [PAGE_WIDTH, PAGE_HEIGHT],
        "bubbleDimensions": [BUBBLE, BUBBLE],
        "customLabels": { "Roll": ["r1..2"] },
        "fieldBlocks": {
            "MCQ": {
                "fieldType": "QTYPE_MCQ4",
                "origin": [40, 40],
                "bubblesGap": 40,
                "labelsGap": 40,
                "fieldLabels": ["q1..4"]
            },
            "Roll": {
                "fieldType": "QTYPE_INT",
                "origin": [200, 40],
                "bubblesGap": 30,
                "labelsGap": 40,
                "fieldLabels": ["r1..2"]
            }
        }
    })
}

/// 处理尺寸与页面一致，缩放不改变像素
pub fn sheet_config() -> Value {
    json!({
        "dimensions": {
            "processing_width": PAGE_WIDTH,
            "processing_height": PAGE_HEIGHT
        }
    })
}

/// q3 答案故意与默认涂卡不同：得分 3 + 3 - 1 + 3 = 8
pub fn sheet_evaluation() -> Value {
    json!({
        "options": {
            "questions_in_order": ["q1..4"],
            "answers_in_order": ["A", "C", "A", "B"]
        },
        "marking_schemes": {
            "DEFAULT": { "correct": "3", "incorrect": "-1", "unmarked": "0" }
        }
    })
}

fn fill_bubble(image: &mut GrayImage, left: u32, top: u32) {
    for y in top..top + BUBBLE {
        for x in left..left + BUBBLE {
            image.put_pixel(x, y, Luma([0]));
        }
    }
}

/// 按给定答案绘制答题卡
pub fn sheet_image(answers: &[(&str, &str)], roll: [u8; 2]) -> GrayImage {
    let mut image = GrayImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Luma([255]));
    for (label, answer) in answers {
        let row: u32 = label.trim_start_matches('q').parse().unwrap();
        let top = 40 + 40 * (row - 1);
        for choice in answer.chars() {
            let column = "ABCD".find(choice).unwrap() as u32;
            fill_bubble(&mut image, 40 + 40 * column, top);
        }
    }
    for (column, digit) in roll.iter().enumerate() {
        fill_bubble(&mut image, 200 + 40 * column as u32, 40 + 30 * u32::from(*digit));
    }
    image
}

pub fn encode_png(image: &GrayImage) -> Vec<u8> {
    let mut buffer = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageLuma8(image.clone())
        .write_to(&mut buffer, image::ImageFormat::Png)
        .unwrap();
    buffer.into_inner()
}

pub fn sheet_png() -> Vec<u8> {
    encode_png(&sheet_image(&DEFAULT_ANSWERS, DEFAULT_ROLL))
}

/// 截断的 PNG：文件头有效，数据不完整
pub fn truncated_png() -> Vec<u8> {
    let mut bytes = sheet_png();
    bytes.truncate(40);
    bytes
}

pub fn write_json(path: &Path, value: &Value) {
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// 写入一个完整的输入目录：模板 + 配置 + 图像
pub fn write_sheet_dir(dir: &Path, images: &[(&str, Vec<u8>)]) {
    write_json(&dir.join("template.json"), &sheet_template());
    write_json(&dir.join("config.json"), &sheet_config());
    for (name, bytes) in images {
        std::fs::write(dir.join(name), bytes).unwrap();
    }
}

/// 指向临时资源目录的服务配置
pub fn test_config(inputs_dir: &Path) -> Config {
    Config {
        bind_addr: "127.0.0.1:0".to_string(),
        inputs_dir: inputs_dir.display().to_string(),
        ..Config::default()
    }
}
