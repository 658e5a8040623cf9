//! Shaping stored question sets into outward responses.

use chapterquiz_shared::{
    Chapter, FormattedQuestion, GenerationResponse, GradedAnswer, McqOptions, QuestionType, RowId,
    STATUS_SUCCESS, ValidationResponse,
};
use chrono::{DateTime, Utc};

/// Flatten chapters into at most `limit` questions, chapter order first.
pub fn flatten_questions(chapters: &[Chapter], limit: usize) -> Vec<FormattedQuestion> {
    chapters
        .iter()
        .flat_map(|chapter| {
            chapter.questions_answers.iter().filter_map(move |q| {
                let question_id = q.question_id?;
                let options = match q.question_type {
                    QuestionType::Mcq => McqOptions::from_slice(&q.options),
                    _ => None,
                };
                Some(FormattedQuestion {
                    question: q.question.clone(),
                    question_type: q.question_type,
                    chapter_name: chapter.chapter_name.clone(),
                    chapter_number: chapter.chapter_number,
                    question_id,
                    options,
                })
            })
        })
        .take(limit)
        .collect()
}

/// Build the response of a generation run.
pub fn generation_response(
    user_id: &str,
    book_id: &str,
    row_id: &RowId,
    created_on: DateTime<Utc>,
    chapters: &[Chapter],
    limit: usize,
) -> GenerationResponse {
    GenerationResponse {
        user_id: user_id.to_string(),
        book_id: book_id.to_string(),
        created_on,
        status: STATUS_SUCCESS.to_string(),
        row_id: row_id.clone(),
        list: flatten_questions(chapters, limit),
    }
}

/// Build the response of a validation run, stamped now.
pub fn validation_response(user_id: &str, graded: Vec<GradedAnswer>) -> ValidationResponse {
    ValidationResponse {
        user_id: user_id.to_string(),
        created_on: Utc::now(),
        status: STATUS_SUCCESS.to_string(),
        list: graded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{numbered_chapters, sample_chapters};

    #[test]
    fn truncates_to_limit_in_order() {
        // 45 questions over 3 chapters
        let chapters = numbered_chapters(&[15, 20, 10]);
        let list = flatten_questions(&chapters, 40);

        assert_eq!(list.len(), 40);
        let ids: Vec<u32> = list.iter().map(|q| q.question_id).collect();
        assert_eq!(ids, (100..140).collect::<Vec<_>>());
        assert_eq!(list[14].chapter_number, 1);
        assert_eq!(list[15].chapter_number, 2);
        assert_eq!(list[39].chapter_number, 3);
    }

    #[test]
    fn short_sets_are_not_padded() {
        let list = flatten_questions(&numbered_chapters(&[2, 3]), 40);
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn mcq_options_are_rekeyed_in_order() {
        let list = flatten_questions(&sample_chapters(), 40);
        let mcq = list
            .iter()
            .find(|q| q.question_type == QuestionType::Mcq)
            .unwrap();
        let opts = mcq.options.as_ref().unwrap();
        assert_eq!(
            (opts.option1.as_str(), opts.option2.as_str(), opts.option3.as_str(), opts.option4.as_str()),
            ("Paris", "Rome", "Berlin", "Madrid")
        );
        assert!(list.iter().filter(|q| q.question_type != QuestionType::Mcq).all(|q| q.options.is_none()));
    }

    #[test]
    fn generation_response_fields() {
        let created = Utc::now();
        let row_id = RowId::from("ABCDEFGHIJKLMNOP");
        let resp = generation_response("u1", "b1", &row_id, created, &sample_chapters(), 2);
        assert_eq!(resp.status, "success");
        assert_eq!(resp.row_id, row_id);
        assert_eq!(resp.list.len(), 2);

        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["list"][0]["question_type"], "Text");
        assert!(json["list"][0].get("options").is_none());
        assert_eq!(json["list"][1]["options"]["option3"], "Berlin");
    }
}
