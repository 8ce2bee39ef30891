//! The routes of the standard handler table, in precedence order.

use crate::dispatch::{Captures, Fallback, Handler, HandlerTable};
use crate::editor::Editor;
use crate::error::{DispatchError, EvalError};
use crate::path::validate;
use crate::response::{Action, Response};
use crate::session::{QuizOutcome, Session};
use crate::store::load_lesson;
use crate::symbols::Symbol;
use argh::{EarlyExit, FromArgs};
use regex::Regex;
use std::marker::PhantomData;
use std::sync::LazyLock;
use tracing::warn;

/// Words that start a command and so can't be used as variable names.
pub const COMMAND_WORDS: [&str; 9] = [
    "help", "bye", "quit", "exit", "vars", "edit", "load", "save", "quiz",
];

/// Longest name accepted on the left of `=`.
pub const MAX_VARIABLE_NAME_LEN: usize = 10;

const MAX_NUMBER_FACTS: u32 = 10_000;
const MAX_FACTORIAL_FACT: u32 = 10;

static IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z_][A-Za-z0-9_]*\b").unwrap());
static BARE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static QUIZ_ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:answer|ans):\s*(.*)|([+-]?\d+(?:\.\d+)?))$").unwrap()
});
static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)\s*=\s*(.*)$").unwrap());
static MULTIPLY_X: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9)])\s*[x×]\s*([0-9(])").unwrap());
static CALL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Za-z_]\w*\s*\(").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The handler table the shell runs with.
pub fn standard_table() -> Result<HandlerTable, DispatchError> {
    HandlerTable::builder()
        .route(CommandRoute::<Help>::default())
        .route(CommandRoute::<Bye>::default())
        .route(CommandRoute::<Vars>::default())
        .route(CommandRoute::<Edit>::default())
        .route(CommandRoute::<Load>::default())
        .route(CommandRoute::<Save>::default())
        .route(CommandRoute::<StartQuiz>::default())
        .route(QuizAnswer)
        .route(LessonLookup)
        .route(VariableLookup)
        .route(NumberFacts)
        .route(Assignment)
        .route(MathExpression)
        .route(RepeatedChars)
        .route(Gibberish)
        .fallback(NotUnderstood)
        .build()
}

/// Format a result the way a child writes it: `4`, not `4.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn coaching(name: &str) -> Response {
    Response::text(format!(
        "Let's set a value for {name} first. Try: {name} = 3. Then try: {name} + 2."
    ))
}

/// First name in `expr` a child could still define as a variable. Called names are left
/// to the evaluator, since variables can never be called.
fn undefined_name<'a>(expr: &'a str, session: &Session) -> Option<&'a str> {
    let evaluator = session.evaluator();
    IDENT
        .find_iter(expr)
        .filter(|m| !expr[m.end()..].trim_start().starts_with('('))
        .map(|m| m.as_str())
        .find(|name| {
            !evaluator.is_reserved(name)
                && session.variable(name).is_none()
                && name.chars().all(|c| c.is_ascii_alphabetic())
                && name.len() <= MAX_VARIABLE_NAME_LEN
        })
}

/// In-shell commands. Arguments are parsed with [`argh`], like the builtins of a regular
/// shell; `--help` works for every one of them.
trait ShellCommand: Sized + FromArgs {
    /// Words that start this command; the first one is used in usage text.
    fn names() -> &'static [&'static str];

    fn run(self, session: &mut Session) -> Response;
}

/// Route for one [`ShellCommand`].
struct CommandRoute<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Default for CommandRoute<T> {
    fn default() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<T: ShellCommand> Handler for CommandRoute<T> {
    fn name(&self) -> &'static str {
        T::names()[0]
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        let word = line.split_whitespace().next()?.to_ascii_lowercase();
        T::names()
            .contains(&word.as_str())
            .then(|| Captures::none().with(word))
    }

    fn handle(&self, line: &str, captures: Captures, session: &mut Session) -> Response {
        let name = captures.get(0).unwrap_or(T::names()[0]);
        let args: Vec<&str> = line.split_whitespace().skip(1).collect();
        match T::from_args(&[name], &args) {
            Ok(cmd) => cmd.run(session),
            Err(EarlyExit { output, status }) => match status {
                Ok(()) => Response::text(output.trim_end()),
                Err(()) => Response::error(output.trim_end()),
            },
        }
    }
}

#[derive(FromArgs)]
/// Show what the shell can do.
struct Help {}

impl ShellCommand for Help {
    fn names() -> &'static [&'static str] {
        &["help"]
    }

    fn run(self, _session: &mut Session) -> Response {
        Response::text(
            "Try these:\n\
             \x20 2 + 3 * 4        do math (also sqrt(16), 8 x 6, pi)\n\
             \x20 x = 5            remember a number, then try x + 2\n\
             \x20 12               learn about a number\n\
             \x20 quiz             get a math question\n\
             \x20 vars             see the numbers you saved\n\
             \x20 load FILE        load a lesson from your data folder\n\
             \x20 edit FILE        open a file in your data folder\n\
             \x20 save             save your progress\n\
             \x20 bye              leave",
        )
    }
}

#[derive(FromArgs)]
/// Leave the shell.
struct Bye {}

impl ShellCommand for Bye {
    fn names() -> &'static [&'static str] {
        &["bye", "quit", "exit"]
    }

    fn run(self, _session: &mut Session) -> Response {
        Response::Action(Action::Exit)
    }
}

#[derive(FromArgs)]
/// List the variables you have set.
struct Vars {}

impl ShellCommand for Vars {
    fn names() -> &'static [&'static str] {
        &["vars"]
    }

    fn run(self, session: &mut Session) -> Response {
        if session.variables().is_empty() {
            return Response::text("No variables yet. Try: x = 3");
        }
        let lines: Vec<String> = session
            .variables()
            .iter()
            .map(|(name, value)| format!("{} = {}", name, format_number(*value)))
            .collect();
        Response::text(lines.join("\n"))
    }
}

#[derive(FromArgs)]
/// Open a file from your data folder in an editor.
struct Edit {
    #[argh(positional)]
    /// file name inside the data folder, like notes.txt
    file: String,

    #[argh(option)]
    /// editor to use: nano, vim, vi, emacs or notepad
    editor: Option<String>,
}

impl ShellCommand for Edit {
    fn names() -> &'static [&'static str] {
        &["edit"]
    }

    fn run(self, session: &mut Session) -> Response {
        let editor = match self.editor.as_deref() {
            None => session.editor(),
            Some(name) => match Editor::from_name(name) {
                Some(editor) => editor,
                None => {
                    warn!(editor = name, "editor not on the allowlist");
                    return Response::error(
                        "I can only open nano, vim, vi, emacs or notepad.",
                    );
                }
            },
        };
        match validate(&self.file, session.root()) {
            Ok(path) => Response::Action(Action::Edit { editor, path }),
            Err(e) => Response::error(e.user_message()),
        }
    }
}

#[derive(FromArgs)]
/// Load a lesson file from your data folder.
struct Load {
    #[argh(positional)]
    /// lesson file name, like animals.json
    file: String,
}

impl ShellCommand for Load {
    fn names() -> &'static [&'static str] {
        &["load"]
    }

    fn run(self, session: &mut Session) -> Response {
        let lesson = validate(&self.file, session.root())
            .map_err(Into::into)
            .and_then(|path| load_lesson(&path));
        match lesson {
            Ok(lesson) => {
                let text = format!("Loaded {} words from {}.", lesson.len(), lesson.name());
                session.set_lesson(lesson);
                Response::text(text)
            }
            Err(e) => {
                warn!(error = %e, "lesson not loaded");
                Response::error(e.user_message())
            }
        }
    }
}

#[derive(FromArgs)]
/// Save your variables and progress.
struct Save {}

impl ShellCommand for Save {
    fn names() -> &'static [&'static str] {
        &["save"]
    }

    fn run(self, session: &mut Session) -> Response {
        match session.save() {
            Ok(()) => Response::text("Saved!"),
            Err(e) => {
                warn!(error = %e, "save failed");
                Response::error(e.user_message())
            }
        }
    }
}

#[derive(FromArgs)]
/// Get a math question to answer.
struct StartQuiz {}

impl ShellCommand for StartQuiz {
    fn names() -> &'static [&'static str] {
        &["quiz"]
    }

    fn run(self, session: &mut Session) -> Response {
        let quiz = session.start_quiz();
        Response::text(format!("{} (type the answer)", quiz.question))
    }
}

/// Answers to the active quiz: a plain number, or `answer: N` / `ans: N`.
struct QuizAnswer;

impl Handler for QuizAnswer {
    fn name(&self) -> &'static str {
        "quiz_answer"
    }

    fn matches(&self, line: &str, session: &Session) -> Option<Captures> {
        session.quiz()?;
        let caps = QUIZ_ANSWER.captures(line)?;
        let answer = caps.get(1).or_else(|| caps.get(2))?;
        Some(Captures::none().with(answer.as_str().trim()))
    }

    fn handle(&self, _line: &str, captures: Captures, session: &mut Session) -> Response {
        let text = captures.get(0).unwrap_or_default();
        let Ok(answer) = text.parse::<f64>() else {
            return Response::error("Answer with a number, like: answer: 12");
        };
        let Some(outcome) = session.answer_quiz(answer) else {
            return Response::error("There is no quiz right now. Type quiz to start one.");
        };
        match outcome {
            QuizOutcome::Correct {
                solved,
                next,
                streak,
                total,
            } => Response::text(format!(
                "Correct! The answer is {}. Streak: {}, solved: {}.\nNext: {}",
                solved.answer, streak, total, next.question
            )),
            QuizOutcome::Wrong { clue, .. } => {
                let encouragement = match text.parse::<u32>() {
                    Ok(n) if (1..=MAX_NUMBER_FACTS).contains(&n) => {
                        format!("Nice thinking with {}!", n)
                    }
                    _ => "Nice thinking.".to_string(),
                };
                let hint = match clue {
                    Some(clue) => format!("Great persistence! Helpful clue: {}", clue),
                    None => "Great attempt! Keep going on this one.".to_string(),
                };
                let question = session
                    .quiz()
                    .map(|q| q.question.clone())
                    .unwrap_or_default();
                Response::text(format!("{} {}\n{}", encouragement, hint, question))
            }
        }
    }
}

/// Words from the loaded lesson.
struct LessonLookup;

impl Handler for LessonLookup {
    fn name(&self) -> &'static str {
        "lesson"
    }

    fn matches(&self, line: &str, session: &Session) -> Option<Captures> {
        if line.trim().is_empty() {
            return None;
        }
        let value = session.lesson()?.lookup(line)?;
        Some(Captures::none().with(value))
    }

    fn handle(&self, _line: &str, captures: Captures, _session: &mut Session) -> Response {
        Response::text(captures.get(0).unwrap_or_default())
    }
}

/// A line that is just the name of a variable or constant.
struct VariableLookup;

impl Handler for VariableLookup {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn matches(&self, line: &str, session: &Session) -> Option<Captures> {
        named_value(line, session).map(|_| Captures::none())
    }

    fn handle(&self, line: &str, _captures: Captures, session: &mut Session) -> Response {
        let Some(value) = named_value(line, session) else {
            return Response::error(format!("I don't know {} yet.", line));
        };
        session.set_last_answer(value);
        Response::text(format!("{} = {}", line, format_number(value)))
    }
}

/// Value of a constant or variable called exactly `name`.
fn named_value(name: &str, session: &Session) -> Option<f64> {
    if !BARE_NAME.is_match(name) {
        return None;
    }
    match session.evaluator().symbols().lookup(name) {
        Some(Symbol::Constant(c)) => Some(c),
        Some(Symbol::Function(_)) => None,
        None => session.variable(name),
    }
}

/// Facts about a whole number from 1 to 10000.
struct NumberFacts;

impl Handler for NumberFacts {
    fn name(&self) -> &'static str {
        "number_facts"
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        if !line.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let n: u32 = line.parse().ok()?;
        (1..=MAX_NUMBER_FACTS)
            .contains(&n)
            .then(|| Captures::none().with(n.to_string()))
    }

    fn handle(&self, _line: &str, captures: Captures, session: &mut Session) -> Response {
        let Some(n) = captures.get(0).and_then(|s| s.parse::<u32>().ok()) else {
            return Response::error("That number is too big for me.");
        };
        session.set_last_answer(n as f64);
        Response::text(number_facts(n))
    }
}

fn factor_pairs(n: u32) -> Vec<(u32, u32)> {
    (1..=n)
        .take_while(|&i| u64::from(i) * u64::from(i) <= u64::from(n))
        .filter(|i| n % i == 0)
        .map(|i| (i, n / i))
        .collect()
}

fn is_prime(n: u32) -> bool {
    n >= 2 && factor_pairs(n).len() == 1
}

/// Summary shown for a number: properties, factor pairs and a few operations.
pub fn number_facts(n: u32) -> String {
    let pairs = factor_pairs(n);
    let mut properties = vec![if n % 2 == 0 { "Even number" } else { "Odd number" }.to_string()];
    for d in [3, 5, 10] {
        if n % d == 0 {
            properties.push(format!("Divisible by {}", d));
        }
    }
    if is_prime(n) {
        properties.push("Prime number".to_string());
    } else if pairs.iter().any(|&(a, b)| a > 1 && is_prime(a) && is_prime(b)) {
        properties.push("Semiprime".to_string());
    }
    let root = (n as f64).sqrt();
    if root.fract() == 0.0 {
        properties.push(format!("Perfect square ({}²)", root as u32));
    }

    let factorial = if n <= MAX_FACTORIAL_FACT {
        (1..=n as u64).product::<u64>().to_string()
    } else {
        "Too large".to_string()
    };
    let pairs: Vec<String> = pairs
        .iter()
        .map(|(a, b)| format!("{} × {}", a, b))
        .collect();

    format!(
        "{n}\n  {}\n  Factor pairs: {}\n  Square root: {:.2} | Squared: {} | Doubled: {} | Halved: {:.1} | Factorial: {}",
        properties.join(", "),
        pairs.join(", "),
        root,
        u64::from(n) * u64::from(n),
        u64::from(n) * 2,
        n as f64 / 2.0,
        factorial,
    )
}

/// `name = expr` for a short alphabetic name.
struct Assignment;

impl Handler for Assignment {
    fn name(&self) -> &'static str {
        "assignment"
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        let caps = ASSIGNMENT.captures(line)?;
        let name = caps.get(1)?.as_str();
        (name.len() <= MAX_VARIABLE_NAME_LEN).then(|| Captures::from_regex(&caps))
    }

    fn handle(&self, _line: &str, captures: Captures, session: &mut Session) -> Response {
        let name = captures.get(1).unwrap_or_default();
        let expr = captures.get(2).unwrap_or_default().trim();

        let lower = name.to_ascii_lowercase();
        if session.evaluator().is_reserved(name) || COMMAND_WORDS.contains(&lower.as_str()) {
            return Response::error(format!(
                "'{}' is a special word. Pick another name, like x.",
                name
            ));
        }
        if expr.is_empty() {
            return Response::error(format!("Put a number after =, like {} = 3.", name));
        }
        if let Some(undefined) = undefined_name(expr, session) {
            return coaching(undefined);
        }
        match session.evaluator().evaluate_with(expr, session.variables()) {
            Ok(value) => {
                session.set_variable(name, value);
                Response::text(format!("{} = {}", name, format_number(value)))
            }
            Err(e) => {
                warn!(kind = e.kind(), "assignment rejected");
                Response::error(e.user_message())
            }
        }
    }
}

/// Arithmetic: anything with an operator or a call, or `x`/`×` between numbers.
struct MathExpression;

impl MathExpression {
    /// Rewrite `8 x 6` and `8×6` as `8 * 6`. Returns whether anything changed.
    fn normalize_times(expr: &str) -> (String, bool) {
        let mut out = expr.to_string();
        let mut changed = false;
        // matches can overlap ("2x3x4"), so repeat until none are left
        while MULTIPLY_X.is_match(&out) {
            out = MULTIPLY_X.replace_all(&out, "$1 * $2").into_owned();
            changed = true;
        }
        (out, changed)
    }
}

impl Handler for MathExpression {
    fn name(&self) -> &'static str {
        "math"
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        let is_math = line.contains(['+', '-', '*', '/', '%', '^'])
            || CALL.is_match(line)
            || MULTIPLY_X.is_match(line);
        is_math.then(Captures::none)
    }

    fn handle(&self, line: &str, _captures: Captures, session: &mut Session) -> Response {
        let expr = WHITESPACE.replace_all(line.trim(), " ");
        let (mut expr, times_note) = Self::normalize_times(&expr);

        if expr.starts_with(['+', '-', '*', '/', '%', '^']) {
            if let Some(last) = session.last_answer() {
                expr = format!("{} {}", format_number(last), expr);
            }
        }
        if let Some(undefined) = undefined_name(&expr, session) {
            return coaching(undefined);
        }

        match session.evaluator().evaluate_with(&expr, session.variables()) {
            Ok(value) => {
                session.set_last_answer(value);
                let mut text = format!("{} = {}", expr, format_number(value));
                if times_note {
                    text.push_str(
                        "\n(I read x as times here. Tip: x can also be a variable, like x = 3.)",
                    );
                }
                Response::text(text)
            }
            Err(EvalError::SyntaxError(_)) if expr != line => {
                // positions refer to the rewritten text
                warn!(kind = "SyntaxError", "expression rejected");
                Response::error("I couldn't read that math problem.")
            }
            Err(e) => {
                warn!(kind = e.kind(), "expression rejected");
                Response::error(e.user_message())
            }
        }
    }
}

/// One letter typed over and over: `aaaaaaa` → `7 x a`.
struct RepeatedChars;

impl Handler for RepeatedChars {
    fn name(&self) -> &'static str {
        "repeated_chars"
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        let mut chars = line.chars();
        let first = chars.next()?;
        let all_same = first.is_alphabetic() && chars.all(|c| c == first);
        (all_same && line.chars().count() > 5).then(Captures::none)
    }

    fn handle(&self, line: &str, _captures: Captures, _session: &mut Session) -> Response {
        let first = line.chars().next().unwrap_or_default();
        Response::text(format!("{} x {}", line.chars().count(), first))
    }
}

/// Long keyboard mashing: count each letter.
struct Gibberish;

impl Handler for Gibberish {
    fn name(&self) -> &'static str {
        "gibberish"
    }

    fn matches(&self, line: &str, _session: &Session) -> Option<Captures> {
        (line.chars().count() > 10 && line.chars().any(char::is_alphabetic)).then(Captures::none)
    }

    fn handle(&self, line: &str, _captures: Captures, _session: &mut Session) -> Response {
        let mut counts = std::collections::BTreeMap::new();
        for c in line.chars().filter(|c| c.is_alphabetic()) {
            *counts.entry(c).or_insert(0usize) += 1;
        }
        let summary: Vec<String> = counts
            .iter()
            .map(|(c, n)| format!("{}: {}", c, n))
            .collect();
        Response::text(summary.join(", "))
    }
}

struct NotUnderstood;

impl Fallback for NotUnderstood {
    fn handle(&self, line: &str, _session: &mut Session) -> Response {
        if line.is_empty() {
            return Response::text("Type a math problem like 2 + 2, a number like 12, or help.");
        }
        Response::text(format!(
            "I didn't understand '{}'. Type help to see what I can do.",
            line
        ))
    }
}
