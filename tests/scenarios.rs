use kidshell::Shell;
use kidshell::error::{EvalError, PathError};
use kidshell::eval::Evaluator;
use kidshell::handlers::standard_table;
use kidshell::path::{SandboxRoot, validate};
use kidshell::response::{Action, Response};
use kidshell::session::Session;
use kidshell::store::{FileConfigStore, MemoryConfigStore};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn shell_in(dir: &TempDir) -> Shell {
    let root = SandboxRoot::open(dir.path()).unwrap();
    let session = Session::new(root, Box::new(MemoryConfigStore::default())).with_seed(5);
    Shell::new(Arc::new(standard_table().unwrap()), session)
}

#[test]
fn code_injection_never_evaluates() {
    let evaluator = Evaluator::default();
    for payload in [
        "__import__('os')",
        "import os",
        "exec(1)",
        "eval(1)",
        "open(1)",
        "globals()",
        "getattr(1, 2)",
        "os.system('ls')",
        "().__class__",
        "[].__class__.__base__",
        "__class__",
        "sqrt.__call__(4)",
        "lambda x: x",
        "x; y",
        "{}",
        "'abc'",
        "1 if 1 else 2",
        "a = 1",
        "`ls`",
        "$(ls)",
        "2 @ 3",
    ] {
        let result = evaluator.evaluate(payload);
        assert!(
            matches!(
                result,
                Err(EvalError::UnknownSymbol(_)) | Err(EvalError::SyntaxError(_))
            ),
            "{:?} -> {:?}",
            payload,
            result
        );
    }
}

const NAME_START: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_";
const NAME_REST: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz_0123456789";

fn random_name(rng: &mut StdRng) -> String {
    let len = rng.random_range(0..=40);
    let mut name = String::with_capacity(len + 1);
    name.push(NAME_START[rng.random_range(0..NAME_START.len())] as char);
    for _ in 0..len {
        name.push(NAME_REST[rng.random_range(0..NAME_REST.len())] as char);
    }
    name
}

#[test]
fn names_outside_the_symbol_set_are_unknown() {
    let evaluator = Evaluator::default();
    let dangerous = [
        "__import__", "__builtins__", "__class__", "__dict__", "__globals__",
        "__subclasses__", "__loader__", "import", "system", "subprocess", "popen", "_",
        "os", "sys", "exec", "eval", "open", "compile", "getattr", "globals", "locals",
        "lambda", "input", "print",
    ];
    for name in dangerous {
        assert!(!evaluator.is_reserved(name), "{}", name);
    }

    let mut rng = StdRng::seed_from_u64(0x6b1d_5e11);
    let generated: Vec<String> = (0..500).map(|_| random_name(&mut rng)).collect();
    let names = dangerous
        .iter()
        .map(|s| s.to_string())
        .chain(generated)
        .filter(|name| !evaluator.is_reserved(name));

    for name in names {
        let unknown = Err(EvalError::UnknownSymbol(name.clone()));
        assert_eq!(evaluator.evaluate(&name), unknown, "{}", name);
        assert_eq!(evaluator.evaluate(&format!("{}(1)", name)), unknown, "{}(1)", name);
    }
}

#[test]
fn long_chains_within_the_line_bound_are_answered() {
    let table = Arc::new(standard_table().unwrap());
    let handle = std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(move || {
            let dir = TempDir::new().unwrap();
            let root = SandboxRoot::open(dir.path()).unwrap();
            let session = Session::new(root, Box::new(MemoryConfigStore::default()))
                .with_evaluator(Evaluator::with_max_len(4096));
            let mut sh = Shell::new(table, session).with_max_line_len(4096);
            sh.dispatch(&format!("{}1", "1+".repeat(2047)));
            sh.session().last_answer()
        })
        .unwrap();
    assert_eq!(handle.join().unwrap(), Some(2048.0));
}

#[test]
fn huge_values_are_bounded() {
    let evaluator = Evaluator::default();
    assert_eq!(evaluator.evaluate("2 ** 2 ** 2 ** 2 ** 2"), Err(EvalError::Overflow));
    assert_eq!(evaluator.evaluate("factorial(171)"), Err(EvalError::Domain("factorial".into())));
    assert_eq!(evaluator.evaluate("comb(1001, 2)"), Err(EvalError::Domain("comb".into())));
    assert_eq!(evaluator.evaluate(&"9".repeat(40)), Err(EvalError::Overflow));
}

#[test]
fn dispatch_answers_every_line() {
    let dir = TempDir::new().unwrap();
    let mut sh = shell_in(&dir);

    let long = "1+".repeat(50_000);
    let odd = [
        "",
        "   ",
        "\t\n",
        ">",
        "\u{0}",
        "🦖🦖🦖",
        "((((((((",
        "))))",
        "=",
        "= 3",
        "-",
        "x =",
        "answer:",
        "édit fichier",
        long.as_str(),
    ];
    for line in odd {
        match sh.dispatch(line) {
            Response::Text(_) | Response::Error(_) => {}
            Response::Action(action) => panic!("{:?} produced {:?}", line, action),
        }
    }
    assert!(sh.dispatch(&long).is_error());
}

#[test]
fn empty_line_gets_a_friendly_prompt() {
    let dir = TempDir::new().unwrap();
    let mut sh = shell_in(&dir);
    assert!(matches!(sh.dispatch(""), Response::Text(_)));
    assert!(matches!(sh.dispatch("> "), Response::Text(_)));
}

#[test]
fn file_commands_stay_inside_the_data_folder() {
    let outer = TempDir::new().unwrap();
    let data = outer.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(outer.path().join("secret.json"), r#"{"pw": "hunter2"}"#).unwrap();

    let root = SandboxRoot::open(&data).unwrap();
    let session = Session::new(root, Box::new(MemoryConfigStore::default()));
    let mut sh = Shell::new(Arc::new(standard_table().unwrap()), session);

    for name in [
        "../secret.json",
        "../../etc/passwd",
        "/etc/passwd",
        "..\\secret.json",
        "C:\\secret.json",
        "sub/../../secret.json",
    ] {
        let load = sh.dispatch(&format!("load {}", name));
        assert!(load.is_error(), "load {:?} -> {:?}", name, load);
        assert!(!load.message().unwrap_or_default().contains("hunter2"));

        let edit = sh.dispatch(&format!("edit {}", name));
        assert!(edit.is_error(), "edit {:?} -> {:?}", name, edit);
    }
    assert_eq!(sh.dispatch("pw"), Response::text("I didn't understand 'pw'. Type help to see what I can do."));
}

#[cfg(unix)]
#[test]
fn symlinks_out_of_the_data_folder_are_refused() {
    let outer = TempDir::new().unwrap();
    let data = outer.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(outer.path().join("secret.json"), r#"{"pw": "hunter2"}"#).unwrap();
    std::os::unix::fs::symlink(outer.path().join("secret.json"), data.join("lesson.json")).unwrap();

    let root = SandboxRoot::open(&data).unwrap();
    assert_eq!(
        validate("lesson.json", &root),
        Err(PathError::EscapesRoot("lesson.json".to_string()))
    );

    let session = Session::new(root, Box::new(MemoryConfigStore::default()));
    let mut sh = Shell::new(Arc::new(standard_table().unwrap()), session);
    assert_eq!(
        sh.dispatch("load lesson.json"),
        Response::error("'lesson.json' is outside your data folder.")
    );
}

#[test]
fn edit_is_an_action_on_a_validated_path() {
    let dir = TempDir::new().unwrap();
    let mut sh = shell_in(&dir);
    match sh.dispatch("edit stories/dino.txt --editor nano") {
        Response::Action(Action::Edit { path, .. }) => {
            assert!(path.as_path().starts_with(sh.session().root().path()));
            assert_eq!(path.display_name(), "stories/dino.txt");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn session_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let root = SandboxRoot::open(dir.path()).unwrap();
    let table = Arc::new(standard_table().unwrap());

    let session = Session::new(root.clone(), Box::new(FileConfigStore::open(&root).unwrap()));
    let mut first = Shell::new(Arc::clone(&table), session);
    first.dispatch("apples = 4");
    first.dispatch("apples * 3");
    assert_eq!(first.dispatch("save"), Response::text("Saved!"));

    let mut session = Session::new(root.clone(), Box::new(FileConfigStore::open(&root).unwrap()));
    session.restore().unwrap();
    let mut second = Shell::new(table, session);
    assert_eq!(second.dispatch("apples"), Response::text("apples = 4"));
    assert_eq!(second.dispatch("+ 1"), Response::text("12 + 1 = 13"));
}

#[test]
fn one_table_many_sessions() {
    let table = Arc::new(standard_table().unwrap());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let table = Arc::clone(&table);
            std::thread::spawn(move || {
                let dir = TempDir::new().unwrap();
                let root = SandboxRoot::open(dir.path()).unwrap();
                let session = Session::new(root, Box::new(MemoryConfigStore::default()));
                let mut sh = Shell::new(table, session);
                sh.dispatch(&format!("n = {}", i));
                sh.dispatch("n * 10")
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(
            handle.join().unwrap(),
            Response::text(format!("n * 10 = {}", i * 10))
        );
    }
}
