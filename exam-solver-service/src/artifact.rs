//! The downloadable answers file.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::AnswerRecord;

pub const ANSWERS_FILE_NAME: &str = "answers.txt";

/// Each answer trimmed and followed by a blank line, in solve order
pub fn render_answers(answers: &[AnswerRecord]) -> String {
    answers
        .iter()
        .map(|record| format!("{}\n\n", record.display().trim()))
        .collect()
}

/// Write `answers.txt` into `dir`, returning the written path
pub async fn save_answers(dir: &Path, answers: &[AnswerRecord]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(ANSWERS_FILE_NAME);
    tokio::fs::write(&path, render_answers(answers)).await?;
    info!(path = %path.display(), answers = answers.len(), "saved answers");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, answer: &str) -> AnswerRecord {
        AnswerRecord {
            index,
            question: format!("question {index}"),
            answer: answer.to_string(),
            interrupted: false,
        }
    }

    #[test]
    fn empty_answers_render_empty() {
        assert_eq!(render_answers(&[]), "");
    }

    #[test]
    fn answers_appear_verbatim_in_order() {
        let answers = vec![
            record(1, "Step 1: add\nFinal Answer: 4"),
            record(2, "படி 1: பெருக்கு\nFinal Answer: 9"),
        ];
        let rendered = render_answers(&answers);

        assert_eq!(
            rendered,
            "### Q1:\nStep 1: add\nFinal Answer: 4\n\n### Q2:\nபடி 1: பெருக்கு\nFinal Answer: 9\n\n"
        );
        let blocks: Vec<&str> = rendered.trim_end().split("\n\n").collect();
        assert_eq!(blocks, vec![answers[0].display(), answers[1].display()]);
    }

    #[tokio::test]
    async fn save_writes_fixed_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_answers(dir.path(), &[record(1, "  Final Answer: 1  ")])
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), ANSWERS_FILE_NAME);
        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written, "### Q1:\n  Final Answer: 1\n\n");
    }
}
