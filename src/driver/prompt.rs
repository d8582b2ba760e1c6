//! Builds the single prompt string handed to the agent binary.
//!
//! The operating instructions are fixed text; everything job-specific
//! (task, context files, directory layout) is injected as data. Context
//! files are inlined when the sandbox shares a filesystem with the host
//! and referenced by uploaded path otherwise.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextPlacement {
    Inline { content: String },
    Uploaded { remote_path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub name: String,
    pub placement: ContextPlacement,
}

#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    pub task: &'a str,
    pub context: &'a [ContextFile],
    pub workspace_dir: &'a str,
    pub tools_dir: Option<&'a str>,
}

pub fn assemble_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are running inside a disposable sandbox with network access. \
         Nothing outside it is reachable, so work entirely within it.\n",
    );
    prompt.push_str(&format!(
        "Your working directory is {}. Save every file you produce there.\n",
        inputs.workspace_dir
    ));
    if let Some(tools) = inputs.tools_dir {
        prompt.push_str(&format!(
            "Reusable scripts from earlier jobs are available under {tools}. \
             Check there before writing a new one.\n",
        ));
    }
    prompt.push_str(
        "If you write a new reusable script, give it a descriptive file name \
         with the right extension and leave it in the working directory.\n",
    );

    prompt.push_str("\n# Task\n\n");
    prompt.push_str(inputs.task.trim());
    prompt.push('\n');

    for file in inputs.context {
        match &file.placement {
            ContextPlacement::Inline { content } => {
                prompt.push_str(&format!("\n# Context file: {}\n\n", file.name));
                prompt.push_str(content);
                if !content.ends_with('\n') {
                    prompt.push('\n');
                }
            }
            ContextPlacement::Uploaded { remote_path } => {
                prompt.push_str(&format!(
                    "\n# Context file: {} (uploaded to {})\n",
                    file.name, remote_path
                ));
            }
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_carries_instructions_task_and_layout() {
        let inputs = PromptInputs {
            task: "  write a fizzbuzz script  ",
            context: &[],
            workspace_dir: "/workspace",
            tools_dir: Some("/tools"),
        };
        let prompt = assemble_prompt(&inputs);
        assert!(prompt.contains("working directory is /workspace"));
        assert!(prompt.contains("available under /tools"));
        assert!(prompt.contains("# Task\n\nwrite a fizzbuzz script\n"));
    }

    #[test]
    fn tools_section_is_omitted_without_a_tools_dir() {
        let inputs = PromptInputs {
            task: "t",
            context: &[],
            workspace_dir: "/workspace",
            tools_dir: None,
        };
        let prompt = assemble_prompt(&inputs);
        assert!(!prompt.contains("Reusable scripts"));
    }

    #[test]
    fn inline_context_embeds_content_under_a_labeled_section() {
        let context = vec![ContextFile {
            name: "data.csv".to_string(),
            placement: ContextPlacement::Inline {
                content: "a,b\n1,2".to_string(),
            },
        }];
        let inputs = PromptInputs {
            task: "t",
            context: &context,
            workspace_dir: "/workspace",
            tools_dir: None,
        };
        let prompt = assemble_prompt(&inputs);
        assert!(prompt.contains("# Context file: data.csv\n\na,b\n1,2\n"));
    }

    #[test]
    fn uploaded_context_is_referenced_by_path() {
        let context = vec![ContextFile {
            name: "report.pdf".to_string(),
            placement: ContextPlacement::Uploaded {
                remote_path: "/workspace/context/report.pdf".to_string(),
            },
        }];
        let inputs = PromptInputs {
            task: "t",
            context: &context,
            workspace_dir: "/workspace",
            tools_dir: None,
        };
        let prompt = assemble_prompt(&inputs);
        assert!(prompt.contains("# Context file: report.pdf (uploaded to /workspace/context/report.pdf)"));
        assert!(!prompt.contains("%PDF"));
    }
}
