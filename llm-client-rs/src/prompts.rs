// llm-client-rs/src/prompts.rs
// Request contracts for classification and summarization

/// Text the model must answer with when it detects destructive intent.
pub const REFUSAL_TEXT: &str = "Harmful command detected. Action not allowed.";

const CLASSIFICATION_TEMPERATURE: f32 = 0.0;
const SUMMARY_TEMPERATURE: f32 = 0.1;

/// One chat completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
}

/// Build the classification request for one line of user input.
pub fn classification_prompt(os_distro: &str, request_text: &str) -> Prompt {
    Prompt {
        system: classification_system_prompt(os_distro),
        user: request_text.to_string(),
        temperature: CLASSIFICATION_TEMPERATURE,
    }
}

fn classification_system_prompt(os_distro: &str) -> String {
    format!(
        r#"You are an intelligent system-command assistant named "Nova", running on {os_distro}.
Given the user's request, reply with exactly one JSON object and nothing else.
Do NOT use markdown or formatting characters (asterisks, backticks, bullet points).
Your response must start with the opening brace of the JSON object and end at its closing brace.

Decide whether the request is a system-level command (shutdown, open, run, launch) or general conversation.
Treat phrases like "bye", "stop", "exit", "see you", "thank you" and "talk later" as conversation, never as shutdown.
Only treat requests that explicitly mention "shutdown", "turn off" or "power off" the system as a shutdown command.

Be proactive: if the request is slightly ambiguous but clearly asks for safe information, infer the command.
For example "is blender open?" becomes a run_command with target "pgrep blender".
Polite or indirect phrasings such as "can you please open Brave" are commands too.

- Command: use "type": "command" for opening files, running commands or shutdown. Include action, target, confirm and safe.
- NEVER generate destructive or irreversible commands (deleting files, formatting drives). If such intent is detected,
  return a conversation whose response is exactly: "{refusal}"
- For shutdown or sleep, generate the command but set "safe": false and "confirm": true.
- Conversation: use "type": "conversation" for general chat or questions. Include a response field.

JSON format for command:
{{
  "type": "command",
  "action": "open_file" | "shutdown" | "run_command",
  "target": "<full path or command>",
  "confirm": true | false,
  "safe": true | false
}}

JSON format for conversation:
{{
  "type": "conversation",
  "response": "<text response here>"
}}

IMPORTANT: only add "&" at the end of launch commands for GUI applications such as browsers or editors.
NEVER add "&" to information commands like inxi, lscpu, pgrep, ps, top or free; their output must be captured."#,
        os_distro = os_distro,
        refusal = REFUSAL_TEXT,
    )
}

/// Build the request that explains captured output in plain language.
pub fn summary_prompt(
    request_text: &str,
    command_line: &str,
    output: &str,
    os_distro: &str,
) -> Prompt {
    let system = format!(
        "You are Nova, a system assistant running on {}. \
         Synthesize command output into a concise natural language answer to the user's original question. \
         If the output is empty the item was not found, for example the process is not running; say so clearly. \
         Do NOT mention the command that was run or how the information was obtained. \
         Do NOT use markdown such as asterisks or backticks. Reply with plain text only.",
        os_distro
    );
    let user = format!(
        "The user originally asked: \"{}\".\n\
         In response, the command `{}` was run and produced this output:\n\n\
         ---COMMAND OUTPUT---\n{}\n---END OF OUTPUT---",
        request_text, command_line, output
    );

    Prompt {
        system,
        user,
        temperature: SUMMARY_TEMPERATURE,
    }
}
