//! Prompt construction for the file-block reply format.

use std::fmt::Write;

use crate::{Attachment, GenerationMode, GenerationRequest};

/// Files every newly created app must contain.
pub const REQUIRED_FILES: [&str; 4] = ["index.html", "script.js", "README.md", "LICENSE"];

const FORMAT_RULES: &str = "\
Format your response EXACTLY as follows, with no JSON and no text outside the file blocks:

FILE: index.html
```
file content here
```

FILE: script.js
```
file content here
```

Rules:
- Start every file with a line of the form \"FILE: <path>\".
- Put the complete file content inside triple backticks directly below that line.
- Use relative paths only.
";

/// Builds the prompt for a generation request.
#[must_use]
pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
    let mut prompt = String::with_capacity(2048);

    match request.mode {
        GenerationMode::Create => {
            prompt.push_str(
                "You are a code generator. Build a minimal, complete frontend app \
                 for the task below, with a professional README.md and an MIT License.\n\n",
            );
        }
        GenerationMode::Update { .. } => {
            prompt.push_str(
                "You are a code generator revising an existing frontend app. \
                 Modify or extend it according to the task below.\n\n",
            );
        }
    }

    push_task(&mut prompt, request);

    prompt.push_str(
        "\nThe app is deployed on GitHub Pages, so:\n\
         - Only produce frontend code (HTML, CSS, JavaScript) plus documentation.\n\
         - All logic must run in the browser; there is no server.\n\
         - The entry point must be index.html.\n",
    );

    match request.mode {
        GenerationMode::Create => {
            prompt.push_str("\nYou MUST include the following files:\n");
            let _ = writeln!(prompt, "- {}", REQUIRED_FILES[0]);
            let _ = writeln!(
                prompt,
                "- {} (or an equivalent JavaScript file, if needed)",
                REQUIRED_FILES[1]
            );
            let _ = writeln!(prompt, "- {}", REQUIRED_FILES[2]);
            let _ = writeln!(prompt, "- {} (MIT License)", REQUIRED_FILES[3]);
            prompt.push_str(
                "\nREADME.md must include:\n\
                 - A clear summary of the app\n\
                 - Setup instructions\n\
                 - A usage guide\n\
                 - An explanation of the code\n",
            );
        }
        GenerationMode::Update { existing } => {
            if existing.is_empty() {
                prompt.push_str("\nThe repository currently holds no readable files.\n");
            } else {
                prompt.push_str("\nCurrent repository files:\n");
                for (path, content) in existing {
                    let fence = fence_for(content);
                    let _ = write!(prompt, "\nFILE: {path}\n{fence}\n{content}\n{fence}\n");
                }
            }
            prompt.push_str(
                "\nReturn ONLY the files that must change, each with its complete new \
                 content (not a diff). Files you do not return stay as they are.\n\
                 Update README.md to reflect the changes.\n",
            );
        }
    }

    prompt.push('\n');
    prompt.push_str(FORMAT_RULES);
    prompt
}

fn push_task(prompt: &mut String, request: &GenerationRequest<'_>) {
    let _ = writeln!(prompt, "Task: {}", request.brief);

    if request.attachments.is_empty() {
        prompt.push_str("Attachments: none\n");
    } else {
        prompt.push_str("Attachments:\n");
        for Attachment { name, url } in request.attachments {
            let _ = writeln!(prompt, "- {name}: {url}");
        }
    }

    if request.checks.is_empty() {
        prompt.push_str("Requirements: none beyond the task\n");
    } else {
        prompt.push_str("Requirements:\n");
        for check in request.checks {
            let _ = writeln!(prompt, "- {check}");
        }
    }
}

/// Returns a backtick fence longer than any backtick run in `content`.
fn fence_for(content: &str) -> String {
    let mut longest = 0;
    let mut run = 0;
    for c in content.chars() {
        if c == '`' {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    "`".repeat((longest + 1).max(3))
}
