//! In-memory collaborators and fixtures for tests.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chapterquiz_shared::{
    AnswerValue, Chapter, ChapterText, GenerationModel, Prompt, Question, QuestionStore,
    QuestionType, QuizError, Result, RowId, S3Locator, StorageResolver, StoredQuestionSet,
    TextExtractor, VectorIndex,
};
use chrono::Utc;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn question(id: u32, text: &str, kind: QuestionType, options: &[&str], answer: AnswerValue) -> Question {
    Question {
        question_id: Some(id),
        question: text.into(),
        question_type: kind,
        options: options.iter().map(|s| s.to_string()).collect(),
        answer,
    }
}

/// One chapter with one question of each type, ids 100..=103.
pub fn sample_chapters() -> Vec<Chapter> {
    vec![Chapter {
        chapter_name: "Making Choices".into(),
        chapter_number: 1,
        questions_answers: vec![
            question(
                100,
                "Your friend asks you to skip work. What do you do?",
                QuestionType::Text,
                &[],
                AnswerValue::Text("Think about the consequences first.".into()),
            ),
            question(
                101,
                "Which city is the capital of Germany?",
                QuestionType::Mcq,
                &["Paris", "Rome", "Berlin", "Madrid"],
                AnswerValue::Text("Berlin".into()),
            ),
            question(
                102,
                "Planning ahead helps avoid trouble.",
                QuestionType::TrueFalse,
                &[],
                AnswerValue::Flag(true),
            ),
            question(
                103,
                "Success takes ___.",
                QuestionType::FillInTheBlanks,
                &[],
                AnswerValue::Text("patience".into()),
            ),
        ],
    }]
}

/// Chapters holding `counts[i]` text questions each, ids from 100.
pub fn numbered_chapters(counts: &[usize]) -> Vec<Chapter> {
    let mut next_id = 100;
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| Chapter {
            chapter_name: format!("Chapter {}", i + 1),
            chapter_number: i as u32 + 1,
            questions_answers: (0..count)
                .map(|_| {
                    let q = question(
                        next_id,
                        &format!("Question {next_id}?"),
                        QuestionType::Text,
                        &[],
                        AnswerValue::Text("answer".into()),
                    );
                    next_id += 1;
                    q
                })
                .collect(),
        })
        .collect()
}

/// A well-formed generation reply for `chapter_name`.
pub fn generation_reply(chapter_name: &str) -> String {
    serde_json::json!({
        "chapter_name": chapter_name,
        "questions_answers": [
            { "question": format!("What would you do in {chapter_name}?"), "question_type": "Text", "answer": "Stop and think." },
            { "question": "Pick one", "question_type": "MCQ", "options": ["A", "B", "C", "D"], "answer": "B" },
            { "question": "Habits can change.", "question_type": "True/False", "answer": true },
            { "question": "A goal needs a ___.", "question_type": "Fill_in_the_blanks", "answer": "plan" }
        ]
    })
    .to_string()
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

type Responder = Box<dyn Fn(&Prompt) -> Result<String> + Send + Sync>;

/// Model double returning queued replies or computing them from the prompt.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<Prompt>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    /// Replies are returned in order; running out is a generation error.
    pub fn new<I, T>(replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn from_fn(f: impl Fn(&Prompt) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Every call fails as a transport error.
    pub fn failing() -> Self {
        Self::from_fn(|_| Err(QuizError::Generation("connection refused".into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationModel for ScriptedModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        if let Some(responder) = &self.responder {
            return responder(prompt);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| QuizError::Generation("no scripted reply left".into()))
    }
}

// ---------------------------------------------------------------------------
// MemoryIndex
// ---------------------------------------------------------------------------

/// Vector index double keeping whole chapters as chunks.
#[derive(Default)]
pub struct MemoryIndex {
    books: Mutex<HashMap<String, Vec<ChapterText>>>,
    index_calls: AtomicUsize,
    fail_index: bool,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that rejects writes.
    pub fn failing() -> Self {
        Self {
            fail_index: true,
            ..Self::default()
        }
    }

    pub fn with_book(book_id: &str, chapters: Vec<ChapterText>) -> Self {
        let index = Self::default();
        index.books.lock().unwrap().insert(book_id.into(), chapters);
        index
    }

    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn exists(&self, book_id: &str) -> Result<bool> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .get(book_id)
            .is_some_and(|c| !c.is_empty()))
    }

    async fn index(&self, book_id: &str, chapters: &[ChapterText]) -> Result<()> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_index {
            return Err(QuizError::Persistence("index unavailable".into()));
        }
        self.books
            .lock()
            .unwrap()
            .insert(book_id.into(), chapters.to_vec());
        Ok(())
    }

    async fn chapters(&self, book_id: &str, k: usize) -> Result<Vec<String>> {
        let books = self.books.lock().unwrap();
        let mut names: Vec<String> = Vec::new();
        for chunk in books.get(book_id).into_iter().flatten() {
            if !names.contains(&chunk.chapter_name) {
                names.push(chunk.chapter_name.clone());
            }
        }
        names.truncate(k);
        Ok(names)
    }

    /// Chunks whose chapter name occurs in the query rank first.
    async fn top_k(&self, book_id: &str, query: &str, k: usize) -> Result<Vec<ChapterText>> {
        let books = self.books.lock().unwrap();
        let Some(chunks) = books.get(book_id) else {
            return Ok(Vec::new());
        };
        let mut ranked: Vec<ChapterText> = chunks.clone();
        if !query.is_empty() {
            ranked.sort_by_key(|c| !query.contains(&c.chapter_name));
        }
        ranked.truncate(k);
        Ok(ranked)
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Question store double.
#[derive(Default)]
pub struct MemoryStore {
    sets: Mutex<HashMap<(String, String), StoredQuestionSet>>,
    upserts: AtomicUsize,
    fail_upsert: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_upsert: true,
            ..Self::default()
        }
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn upsert(
        &self,
        user_id: &str,
        book_id: &str,
        row_id: &RowId,
        chapters: &[Chapter],
    ) -> Result<RowId> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_upsert {
            return Err(QuizError::Persistence("database is locked".into()));
        }
        self.sets.lock().unwrap().insert(
            (user_id.into(), book_id.into()),
            StoredQuestionSet {
                row_id: row_id.clone(),
                chapters: chapters.to_vec(),
                created_on: Utc::now(),
            },
        );
        Ok(row_id.clone())
    }

    async fn fetch_by_user_book(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Option<StoredQuestionSet>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .get(&(user_id.to_string(), book_id.to_string()))
            .cloned())
    }

    async fn fetch_by_row_id(&self, row_id: &RowId) -> Result<Option<Vec<Chapter>>> {
        Ok(self
            .sets
            .lock()
            .unwrap()
            .values()
            .find(|set| &set.row_id == row_id)
            .map(|set| set.chapters.clone()))
    }
}

// ---------------------------------------------------------------------------
// Source doubles
// ---------------------------------------------------------------------------

/// Storage resolver serving fixed objects by locator.
#[derive(Default)]
pub struct MemoryResolver {
    objects: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn with_object(locator: &str, bytes: &[u8]) -> Self {
        let mut objects = HashMap::new();
        objects.insert(locator.to_string(), bytes.to_vec());
        Self { objects }
    }
}

#[async_trait]
impl StorageResolver for MemoryResolver {
    async fn fetch(&self, locator: &S3Locator) -> Result<Vec<u8>> {
        self.objects
            .get(&locator.to_string())
            .cloned()
            .ok_or_else(|| QuizError::Storage(format!("{locator}: HTTP 404 Not Found")))
    }
}

/// Extractor returning fixed chapters for any existing file.
pub struct FixedExtractor {
    chapters: Vec<ChapterText>,
    fail: bool,
}

impl FixedExtractor {
    pub fn new(chapters: Vec<ChapterText>) -> Self {
        Self {
            chapters,
            fail: false,
        }
    }

    /// Extractor that finds no chapter headings.
    pub fn failing() -> Self {
        Self {
            chapters: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl TextExtractor for FixedExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<ChapterText>> {
        if !path.exists() {
            return Err(QuizError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "scratch file missing"),
            ));
        }
        if self.fail {
            return Err(QuizError::input("No chapter titles found."));
        }
        Ok(self.chapters.clone())
    }
}

/// Two short chapters used by generation tests.
pub fn two_chapters() -> Vec<ChapterText> {
    vec![
        ChapterText::new("Making Choices", "Every choice has a consequence."),
        ChapterText::new("Finding Work", "A resume lists your skills."),
    ]
}
