use crate::editor::Editor;
use crate::error::StoreError;
use crate::eval::{Evaluator, Variables};
use crate::path::SandboxRoot;
use crate::store::{ConfigData, ConfigStore, Lesson};
use std::time::{SystemTime, UNIX_EPOCH};

/// Mutable state of one REPL session.
///
/// Handlers get `&Session` when deciding whether a line is theirs and `&mut Session` when
/// they handle it. Storage is only reachable through the [`ConfigStore`] held here.
pub struct Session {
    data: ConfigData,
    lesson: Option<Lesson>,
    quiz: Option<Quiz>,
    rng: XorShift,
    evaluator: Evaluator,
    root: SandboxRoot,
    store: Box<dyn ConfigStore>,
    editor: Editor,
}

impl Session {
    pub fn new(root: SandboxRoot, store: Box<dyn ConfigStore>) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            data: ConfigData::default(),
            lesson: None,
            quiz: None,
            rng: XorShift::new(seed),
            evaluator: Evaluator::default(),
            root,
            store,
            editor: Editor::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_editor(mut self, editor: Editor) -> Self {
        self.editor = editor;
        self
    }

    /// Fix the quiz generator seed, for reproducible question sequences.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = XorShift::new(seed);
        self
    }

    pub fn evaluator(&self) -> Evaluator {
        self.evaluator
    }

    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    pub fn editor(&self) -> Editor {
        self.editor
    }

    pub fn data(&self) -> &ConfigData {
        &self.data
    }

    pub fn variables(&self) -> &Variables {
        &self.data.variables
    }

    pub fn variable(&self, name: &str) -> Option<f64> {
        self.data.variables.get(name).copied()
    }

    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.data.variables.insert(name.to_string(), value);
    }

    pub fn last_answer(&self) -> Option<f64> {
        self.data.last_answer
    }

    pub fn set_last_answer(&mut self, value: f64) {
        self.data.last_answer = Some(value);
    }

    pub fn problems_solved(&self) -> u32 {
        self.data.problems_solved
    }

    pub fn streak(&self) -> u32 {
        self.data.streak
    }

    /// Replace the in-memory state with what the store holds.
    pub fn restore(&mut self) -> Result<(), StoreError> {
        self.data = self.store.read()?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), StoreError> {
        self.store.write(&self.data)
    }

    pub fn lesson(&self) -> Option<&Lesson> {
        self.lesson.as_ref()
    }

    pub fn set_lesson(&mut self, lesson: Lesson) {
        self.lesson = Some(lesson);
    }

    pub fn quiz(&self) -> Option<&Quiz> {
        self.quiz.as_ref()
    }

    /// Start a new quiz at the difficulty earned so far, replacing any active one.
    pub fn start_quiz(&mut self) -> &Quiz {
        let quiz = Quiz::generate(&mut self.rng, difficulty_for(self.data.problems_solved));
        self.quiz.insert(quiz)
    }

    /// Check an answer against the active quiz. `None` when there is no quiz.
    pub fn answer_quiz(&mut self, answer: f64) -> Option<QuizOutcome> {
        let quiz = self.quiz.as_mut()?;
        quiz.attempts += 1;

        if (answer - quiz.answer as f64).abs() < 1e-9 {
            self.data.problems_solved += 1;
            self.data.streak += 1;
            let next = Quiz::generate(&mut self.rng, difficulty_for(self.data.problems_solved));
            let solved = std::mem::replace(quiz, next.clone());
            Some(QuizOutcome::Correct {
                solved,
                next,
                streak: self.data.streak,
                total: self.data.problems_solved,
            })
        } else {
            self.data.streak = 0;
            Some(QuizOutcome::Wrong {
                attempts: quiz.attempts,
                clue: quiz.clue(),
            })
        }
    }
}

/// A single arithmetic question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quiz {
    pub question: String,
    pub answer: i64,
    pub difficulty: u8,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuizOutcome {
    Correct {
        solved: Quiz,
        next: Quiz,
        streak: u32,
        total: u32,
    },
    Wrong {
        attempts: u32,
        clue: Option<String>,
    },
}

/// Attempts before a clue is offered.
pub const CLUE_AFTER: u32 = 3;

impl Quiz {
    fn generate(rng: &mut XorShift, difficulty: u8) -> Quiz {
        let (a, op, b, answer) = match difficulty {
            1 => {
                let (a, b) = (rng.range(1, 10), rng.range(1, 10));
                (a, '+', b, a + b)
            }
            2 => {
                let a = rng.range(5, 20);
                let b = rng.range(1, a);
                if rng.coin() { (a, '+', b, a + b) } else { (a, '-', b, a - b) }
            }
            3 => {
                if rng.coin() {
                    let (a, b) = (rng.range(2, 10), rng.range(2, 10));
                    (a, '×', b, a * b)
                } else {
                    let a = rng.range(20, 50);
                    let b = rng.range(1, a);
                    (a, '-', b, a - b)
                }
            }
            _ => {
                let (b, q) = (rng.range(2, 12), rng.range(2, 12));
                if rng.coin() { (b * q, '÷', b, q) } else { (b, '×', q, b * q) }
            }
        };
        Quiz {
            question: format!("What is {} {} {}?", a, op, b),
            answer,
            difficulty,
            attempts: 0,
        }
    }

    fn clue(&self) -> Option<String> {
        if self.attempts < CLUE_AFTER {
            return None;
        }
        let n = self.answer;
        Some(if n < 10 {
            "The answer is less than 10.".to_string()
        } else if n < 50 {
            format!("The answer is between {} and {}.", n / 10 * 10, (n / 10 + 1) * 10)
        } else {
            let first = n.to_string().chars().next().unwrap_or('0');
            format!("The answer starts with {}.", first)
        })
    }
}

/// Difficulty rises with the number of problems solved: 1 below 5, 2 below 15, 3 below 30,
/// then 4.
pub fn difficulty_for(solved: u32) -> u8 {
    match solved {
        0..5 => 1,
        5..15 => 2,
        15..30 => 3,
        _ => 4,
    }
}

/// xorshift64* generator; plenty for picking quiz numbers.
#[derive(Debug, Clone)]
struct XorShift(u64);

impl XorShift {
    fn new(seed: u64) -> Self {
        // zero is a fixed point of xorshift
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform-enough integer in `lo..=hi`.
    fn range(&mut self, lo: i64, hi: i64) -> i64 {
        let span = (hi - lo + 1) as u64;
        lo + (self.next_u64() % span) as i64
    }

    fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }
}
