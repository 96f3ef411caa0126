//! Prompt text sent to the model.

const GENERATION_RULES: &str = r#"You are a professional coding AI. Your task is to create full apps based on user ideas.

You must ONLY return a JSON object with the following format:
{
  "filename1.ext": "file content 1",
  "filename2.ext": "file content 2",
  ...
}

STRICT RULES:
- Every file MUST have a correct extension (.py, .html, .css, .js, etc.).
- For Python apps, you MUST include a 'requirements.txt' file listing only real pip packages (one per line, no comments).
- You MUST use only standard escaped JSON strings.
- You MUST NOT use triple quotes (avoid multi-line strings with triple quotes). Instead, represent multi-line text by escaping newlines using "\n".
- NEVER use Markdown code block formatting (no ```python ```).
- NO explanations, no greetings, no extra text outside the JSON object.
- ONLY output pure machine-readable JSON.

Reminder: Represent multi-line file contents using "\n" inside strings, without triple quotes."#;

/// Request for a complete project implementing `idea`.
pub fn generation_prompt(idea: &str) -> String {
    format!("{}\n\nUser request:\n{}", GENERATION_RULES, idea)
}

/// First request for a fix of `file_name`.
///
/// With `run_command` set the model may also answer with a corrected
/// command on a `COMMAND:` line.
pub fn fix_prompt(
    headline: &str,
    file_name: &str,
    content: &str,
    run_command: Option<&str>,
) -> String {
    let mut prompt = format!(
        "You are a senior software engineer.\n\
         \n\
         The following app crashed.\n\
         \n\
         Crash error:\n\
         {headline}\n\
         \n\
         Code in {file_name}:\n\
         ```{lang}\n\
         {content}\n\
         ```\n",
        headline = headline,
        file_name = file_name,
        lang = fence_language(file_name),
        content = content.trim_end(),
    );

    if let Some(command) = run_command {
        prompt.push_str(&format!(
            "\nThe app was started with this command:\n{}\n\
             \n\
             If the command itself is wrong, reply with a single line:\n\
             COMMAND: <corrected command>\n",
            command
        ));
    }

    prompt.push_str(&format!(
        "\nPlease analyze the code and suggest minimal corrections to fix the crash.\n\
         \n\
         If you need to see any other files to understand better, just reply:\n\
         \"Please show me [filename]\".\n\
         \n\
         Otherwise, please provide the fixed version of {}.",
        file_name
    ));
    prompt
}

/// Section appended when the model asked for `file_name`.
pub fn additional_file(file_name: &str, content: Option<&str>) -> String {
    match content {
        Some(text) => format!(
            "\n\nAdditional file {}:\n```{}\n{}\n```",
            file_name,
            fence_language(file_name),
            text.trim_end()
        ),
        None => format!("\n\nWarning: File {} not found.", file_name),
    }
}

fn fence_language(file_name: &str) -> &'static str {
    match file_name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("py") => "python",
        Some("js") | Some("mjs") => "javascript",
        Some("ts") => "typescript",
        Some("rs") => "rust",
        Some("go") => "go",
        Some("html") => "html",
        Some("css") => "css",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_prompt() {
        let prompt = generation_prompt("a todo app");
        assert!(prompt.starts_with("You are a professional coding AI."));
        assert!(prompt.ends_with("\n\nUser request:\na todo app"));
        assert!(prompt.contains("requirements.txt"));
    }

    #[test]
    fn test_fix_prompt() {
        let prompt = fix_prompt(
            "ZeroDivisionError: division by zero",
            "app.py",
            "print(1/0)\n",
            None,
        );
        assert!(prompt.contains("Crash error:\nZeroDivisionError: division by zero\n"));
        assert!(prompt.contains("Code in app.py:\n```python\nprint(1/0)\n```\n"));
        assert!(prompt.contains("\"Please show me [filename]\""));
        assert!(prompt.ends_with("provide the fixed version of app.py."));
        assert!(!prompt.contains("COMMAND:"));
    }

    #[test]
    fn test_fix_prompt_with_command() {
        let prompt = fix_prompt("Error: boom", "server.js", "start()", Some("node index.js"));
        assert!(prompt.contains("```javascript\nstart()\n```"));
        assert!(prompt.contains("started with this command:\nnode index.js\n"));
        assert!(prompt.contains("COMMAND: <corrected command>"));
    }

    #[test]
    fn test_additional_file() {
        assert_eq!(
            additional_file("utils.py", Some("X = 1\n")),
            "\n\nAdditional file utils.py:\n```python\nX = 1\n```"
        );
        assert_eq!(
            additional_file("gone.py", None),
            "\n\nWarning: File gone.py not found."
        );
    }
}
