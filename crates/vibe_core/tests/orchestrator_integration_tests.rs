//! Integration tests for the generate/run/fix loop.
//!
//! The model is a scripted generator and processes come from a mock
//! runner, so these tests exercise the real materializer, diagnostics and
//! patch engine on a temporary directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::predicate::*;
use tempfile::tempdir;

use vibe_core::{BuildOutcome, FactoryConfig, FixResolution, FixState, Orchestrator};
use vibe_llm::{LlmError, LlmResult, ScriptedGenerator, TextGenerator};
use vibe_patch::PatchOutcome;
use vibe_runner::{MockResponse, MockRunner};

fn traceback(file: &str, headline: &str) -> String {
    format!(
        "Traceback (most recent call last):\n  File \"{}\", line 1, in <module>\n    main()\n{}\n",
        file, headline
    )
}

fn orchestrator(
    llm: &ScriptedGenerator,
    runner: &MockRunner,
    config: &FactoryConfig,
) -> Orchestrator {
    Orchestrator::new(Arc::new(llm.clone()), Arc::new(runner.clone()), config)
}

fn write(root: &Path, name: &str, content: &str) {
    fs::write(root.join(name), content).unwrap();
}

/// A crashing one-liner is diagnosed, rewritten and passes on the re-run.
#[tokio::test]
async fn test_end_to_end_fix() {
    let temp = tempdir().unwrap();
    let root = temp.path().join("divider");

    let llm = ScriptedGenerator::new()
        .reply(r#"{"app.py": "print(1/0)", "requirements.txt": ""}"#)
        .reply("print(1)");
    let runner = MockRunner::new().on_command(
        "app.py",
        vec![
            MockResponse::failure(1, traceback("app.py", "ZeroDivisionError: division by zero")),
            MockResponse::success("1\n"),
        ],
    );

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .build("divide one by zero", &root, false)
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded, "{}", report.message);
    assert!(report.success);
    assert_eq!(
        report.transitions,
        vec![
            FixState::Generated,
            FixState::Running,
            FixState::Diagnosing,
            FixState::Requesting,
            FixState::Patching,
            FixState::Retrying,
            FixState::Running,
            FixState::Succeeded,
        ]
    );
    assert_eq!(fs::read_to_string(root.join("app.py")).unwrap(), "print(1)\n");
    assert_eq!(report.files.len(), 2);

    let attempt = report.attempt.unwrap();
    assert_eq!(attempt.culprit_file, "app.py");
    assert_eq!(attempt.request_rounds, 0);
    assert!(matches!(
        attempt.resolution,
        Some(FixResolution::Patched { outcome: PatchOutcome::Replaced, .. })
    ));

    // generation + one fix request; no input synthesis for a non-interactive app
    assert_eq!(llm.call_count(), 2);
    let fix_prompt = &llm.prompts()[1].prompt;
    assert!(fix_prompt.contains("ZeroDivisionError: division by zero"));
    assert!(fix_prompt.contains("Code in app.py:\n```python\nprint(1/0)\n```"));

    // empty manifest: nothing installed, app run twice
    assert_eq!(runner.call_count(), 2);
}

/// A first-time success never reaches diagnosis.
#[tokio::test]
async fn test_build_succeeds_first_time() {
    let temp = tempdir().unwrap();
    let llm = ScriptedGenerator::new()
        .reply("```json\n{\"app.py\": \"print('hi')\", \"requirements.txt\": \"rich\\nos\"}\n```");
    let runner = MockRunner::new()
        .on_command("pip install", vec![MockResponse::success("installed")])
        .on_command("app.py", vec![MockResponse::success("hi\n")]);

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .build("say hi", temp.path(), true)
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded);
    assert_eq!(
        report.transitions,
        vec![FixState::Generated, FixState::Running, FixState::Succeeded]
    );
    assert_eq!(report.message, "App ran successfully.");
    assert!(report.attempt.is_none());
    assert_eq!(report.install.unwrap().packages, vec!["rich"]);
    assert!(llm.prompts()[0].streaming);
    assert_eq!(runner.calls_matching("pip install").len(), 1);
}

/// Unparseable generation output is terminal.
#[tokio::test]
async fn test_generation_failure() {
    let temp = tempdir().unwrap();
    let llm = ScriptedGenerator::new().reply("Sure! Here's a calculator app for you.");
    let runner = MockRunner::new();

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .build("calculator", &temp.path().join("calc"), false)
        .await;

    assert_eq!(report.outcome, BuildOutcome::GenerationFailed);
    assert!(!report.success);
    assert_eq!(report.transitions, vec![FixState::GenerationFailed]);
    assert!(report.message.contains("not a JSON file map"));
    assert_eq!(runner.call_count(), 0);
    assert!(!temp.path().join("calc").exists());
}

/// A model that keeps asking for files is cut off after three extra rounds.
#[tokio::test]
async fn test_file_request_bound() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "from helper import go\n\ndef main():\n    go()\n\nmain()\n");
    write(temp.path(), "helper0.py", "def go():\n    raise ValueError('x')\n");

    let llm = ScriptedGenerator::new()
        .with_responder(|_, i| Ok(format!("I need more context. Please show me helper{}.py", i)));
    let runner = MockRunner::new().add_response(MockResponse::failure(
        1,
        traceback("app.py", "ValueError: x"),
    ));

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    // initial request plus exactly three follow-ups
    assert_eq!(llm.call_count(), 4);
    assert_eq!(report.visits(FixState::Requesting), 4);
    assert_eq!(report.visits(FixState::Patching), 1);

    let attempt = report.attempt.clone().unwrap();
    assert_eq!(attempt.request_rounds, 3);
    assert_eq!(
        attempt.requested_files.into_iter().collect::<Vec<_>>(),
        vec!["helper0.py", "helper1.py", "helper2.py"]
    );

    let last_prompt = llm.last_prompt().unwrap();
    assert!(last_prompt.contains("Additional file helper0.py:\n```python\ndef go():"));
    assert!(last_prompt.contains("Warning: File helper1.py not found."));
    assert!(last_prompt.contains("Warning: File helper2.py not found."));
    assert_eq!(report.outcome, BuildOutcome::StillFailing);
}

/// Requested files are appended before the fix is merged block by block.
#[tokio::test]
async fn test_requested_file_then_structural_patch() {
    let temp = tempdir().unwrap();
    write(
        temp.path(),
        "app.py",
        "import math\n\ndef area(r):\n    return math.pi * r * r\n\ndef ratio(a, b):\n    return a / b\n\nprint(ratio(area(1), 0))\n",
    );
    write(temp.path(), "README.md", "circle maths");

    let fixed = "```python\nimport math\n\ndef ratio(a, b):\n    if b == 0:\n        return 0\n    return a / b\n```";
    let llm = ScriptedGenerator::new()
        .reply("Please show me README.md")
        .reply(fixed);
    let runner = MockRunner::new().on_command(
        "app.py",
        vec![
            MockResponse::failure(
                1,
                traceback("/work/app.py", "ZeroDivisionError: float division by zero"),
            ),
            MockResponse::success(""),
        ],
    );

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded, "{}", report.message);
    assert_eq!(
        report.transitions,
        vec![
            FixState::Running,
            FixState::Diagnosing,
            FixState::Requesting,
            FixState::Requesting,
            FixState::Patching,
            FixState::Retrying,
            FixState::Running,
            FixState::Succeeded,
        ]
    );

    let patched = fs::read_to_string(temp.path().join("app.py")).unwrap();
    assert!(patched.contains("def area(r):\n    return math.pi * r * r"));
    assert!(patched.contains("    if b == 0:\n        return 0\n    return a / b"));
    assert_eq!(patched.matches("import math").count(), 1);

    assert!(llm.prompts()[1].prompt.contains("Additional file README.md:\n```\ncircle maths\n```"));
    match report.attempt.unwrap().resolution {
        Some(FixResolution::Patched { outcome: PatchOutcome::Merged { blocks }, .. }) => {
            assert_eq!(blocks, vec!["ratio"]);
        }
        other => panic!("unexpected resolution {:?}", other),
    }
}

/// No stack frame means nothing to fix.
#[tokio::test]
async fn test_abort_without_culprit() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "while True: pass\n");
    let llm = ScriptedGenerator::new();
    let runner = MockRunner::new().add_response(MockResponse::timeout());

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Aborted);
    assert_eq!(
        report.transitions,
        vec![FixState::Running, FixState::Diagnosing, FixState::Aborted]
    );
    assert!(report.message.contains("Could not determine crashed file"));
    assert!(report.execution.unwrap().timed_out);
    assert_eq!(llm.call_count(), 0);
}

/// A culprit outside the project cannot be loaded.
#[tokio::test]
async fn test_abort_when_culprit_missing() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "import requests\n");
    let llm = ScriptedGenerator::new();
    let runner = MockRunner::new().add_response(MockResponse::failure(
        1,
        traceback("/usr/lib/python3/site-packages/requests/__init__.py", "ImportError: boom"),
    ));

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Aborted);
    assert_eq!(report.message, "Could not load __init__.py. Cannot auto-fix.");
    assert_eq!(llm.call_count(), 0);
}

/// A model failure during the fix ends the build instead of escaping.
#[tokio::test]
async fn test_abort_on_llm_error() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "print(1/0)\n");
    let llm = ScriptedGenerator::new().fail("connection refused");
    let runner = MockRunner::new()
        .add_response(MockResponse::failure(1, traceback("app.py", "ZeroDivisionError")));

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Aborted);
    assert!(report.message.contains("connection refused"));
    assert_eq!(fs::read_to_string(temp.path().join("app.py")).unwrap(), "print(1/0)\n");
    assert_eq!(runner.call_count(), 1);
}

/// A second failure is reported verbatim.
#[tokio::test]
async fn test_still_failing_after_fix() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "print(1/0)\n");
    let second = traceback("app.py", "NameError: name 'x' is not defined");
    let llm = ScriptedGenerator::new().reply("print(x)");
    let runner = MockRunner::new().on_command(
        "app.py",
        vec![
            MockResponse::failure(1, traceback("app.py", "ZeroDivisionError: division by zero")),
            MockResponse::failure(1, second.clone()),
        ],
    );

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::StillFailing);
    assert_eq!(report.message, second);
    assert_eq!(report.visits(FixState::Running), 2);
    assert_eq!(runner.call_count(), 2);
}

/// With command fixing enabled a `COMMAND:` reply replaces the run command.
#[tokio::test]
async fn test_command_substitution() {
    let temp = tempdir().unwrap();
    write(temp.path(), "server.py", "import sys\nsys.exit(open('cfg.txt').read())\n");

    let mut config = FactoryConfig::default();
    config.fix.command_fix = true;
    config.fix.run_command = Some("python3 main.py".to_string());

    let llm =
        ScriptedGenerator::new().reply("The entry point is wrong.\nCOMMAND: python3 server.py\n");
    let runner = MockRunner::new()
        .on_command(
            "main.py",
            vec![MockResponse::failure(
                2,
                traceback("server.py", "FileNotFoundError: cfg.txt"),
            )],
        )
        .on_command("server.py", vec![MockResponse::success("serving")]);

    let report = orchestrator(&llm, &runner, &config)
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded, "{}", report.message);
    assert_eq!(report.visits(FixState::Patching), 0);
    assert_eq!(
        report.attempt.unwrap().resolution,
        Some(FixResolution::Command {
            command: "python3 server.py".to_string()
        })
    );
    assert!(llm.prompts()[0].prompt.contains("started with this command:\npython3 main.py"));

    let calls = runner.get_calls();
    assert!(calls[0].command_line().ends_with("python3 main.py"));
    assert!(calls[1].command_line().ends_with("python3 server.py"));
    assert_eq!(
        fs::read_to_string(temp.path().join("server.py")).unwrap(),
        "import sys\nsys.exit(open('cfg.txt').read())\n"
    );
}

/// Without command fixing a `COMMAND:` line is treated as code.
#[tokio::test]
async fn test_command_ignored_when_disabled() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "def main():\n    return 1/0\n\nmain()\n");
    let llm = ScriptedGenerator::new()
        .reply("COMMAND: python3 other.py\n```python\ndef main():\n    return 1\n```");
    let runner = MockRunner::new().on_command(
        "app.py",
        vec![
            MockResponse::failure(1, traceback("app.py", "ZeroDivisionError")),
            MockResponse::success(""),
        ],
    );

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded);
    assert!(!llm.prompts()[0].prompt.contains("COMMAND:"));
    assert_eq!(
        fs::read_to_string(temp.path().join("app.py")).unwrap(),
        "def main():\n    return 1\nmain()\n"
    );
}

/// Interactive apps get one synthesis request per run.
#[tokio::test]
async fn test_input_synthesis_per_run() {
    let temp = tempdir().unwrap();
    write(temp.path(), "app.py", "n = int(input('Number: '))\nprint(10 / n)\n");
    let llm = ScriptedGenerator::new()
        .reply("0")
        .reply("n = int(input('Number: '))\nprint(10 / n if n else 0)")
        .reply("0");
    let runner = MockRunner::new().on_command(
        "app.py",
        vec![
            MockResponse::failure(1, traceback("app.py", "ZeroDivisionError: division by zero")),
            MockResponse::success("0\n"),
        ],
    );

    let report = orchestrator(&llm, &runner, &FactoryConfig::default())
        .run_and_fix(temp.path())
        .await;

    assert_eq!(report.outcome, BuildOutcome::Succeeded);
    assert_eq!(llm.call_count(), 3);
    let calls = runner.get_calls();
    assert_eq!(calls[0].input.as_deref(), Some("0"));
    assert_eq!(calls[0].timeout_seconds, 20);
    assert_eq!(calls[1].input.as_deref(), Some("0"));
}

mockall::mock! {
    Llm {}

    #[async_trait]
    impl TextGenerator for Llm {
        async fn generate_text(&self, prompt: &str, streaming: bool) -> LlmResult<String>;
        fn name(&self) -> String;
    }
}

/// Generation forwards the streaming flag and surfaces model errors.
#[tokio::test]
async fn test_generate_with_expectations() {
    let mut llm = MockLlm::new();
    llm.expect_name().return_const("mock".to_string());
    llm.expect_generate_text()
        .with(function(|p: &str| p.ends_with("User request:\nsnake game")), eq(true))
        .times(1)
        .returning(|_, _| Err(LlmError::EmptyResponse("ollama".to_string())));

    let orchestrator = Orchestrator::new(
        Arc::new(llm),
        Arc::new(MockRunner::new()),
        &FactoryConfig::default(),
    );

    let result = orchestrator.generate("snake game", true).await;
    assert!(result.is_err());
}
