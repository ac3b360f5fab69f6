use std::error::Error;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use agent_provider::{cancel, new_cancel_signal, Message};
use agentloop::config::EnvConfig;
use coding_agent::agent::{Agent, NO_RESPONSE_PLACEHOLDER};
use coding_agent::commands::{parse_slash_command, SlashCommand, HELP_TEXT};
use coding_agent::config::AgentConfig;
use coding_agent::prompt::{build_system_prompt, system_prompt_from_env};
use coding_agent::providers;
use coding_agent::repl::{
    next_prompt_input, render_token, spawn_stdin_lines, PromptConfirmation, PromptInput,
};
use coding_agent::tools::builtin::{register_builtin_tools, Workspace};
use coding_agent::tools::{SessionPolicy, ToolRegistry};
use memory_journal::MemoryJournal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let env_config = EnvConfig::from_env();
    if let Err(error) = agentloop::logging::init(&env_config) {
        eprintln!("warning: logging disabled: {error}");
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "coding agent exited with an error");
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let config = AgentConfig::from_env()?;
    let cwd = std::env::current_dir()?;
    let journal = MemoryJournal::for_workspace(&cwd);

    let policy = SessionPolicy::shared(config.permission);
    let lines = spawn_stdin_lines();
    let confirmation = PromptConfirmation::new(Arc::clone(&lines));
    policy.set_confirmation_handler(Some(Arc::new(confirmation)));

    let mut registry = ToolRegistry::new(Arc::clone(&policy));
    register_builtin_tools(&mut registry, Workspace::new(&cwd)?, journal.clone());

    let model = providers::provider_from_env(&config)?;
    let profile = model.profile();
    let agent = Agent::new(model, registry)
        .with_max_turns(config.max_turns)
        .with_log_sink(Arc::new(|line: &str| {
            eprintln!("\x1b[2m· {line}\x1b[0m");
        }));

    let base_prompt = system_prompt_from_env()
        .or_else(|| config.system_prompt.clone())
        .unwrap_or_default();
    let mut conversation = vec![Message::system(String::new())];

    info!(
        provider = %profile.provider_id,
        model = %profile.model_id,
        workspace = %cwd.display(),
        "session started"
    );
    println!(
        "coding-agent ({} / {}) in {}. Permission: {}. /help for commands, /quit to exit.",
        profile.provider_id,
        profile.model_id,
        cwd.display(),
        policy.level()
    );

    loop {
        print!("> ");
        io::stdout().flush()?;

        let line = match next_prompt_input(&lines, tokio::signal::ctrl_c()).await {
            PromptInput::Line(line) => line,
            PromptInput::Closed | PromptInput::Interrupted => {
                println!();
                break;
            }
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(command) = parse_slash_command(input) {
            match command {
                SlashCommand::Help => println!("{HELP_TEXT}"),
                SlashCommand::Clear => {
                    conversation.truncate(1);
                    println!("Conversation cleared.");
                }
                SlashCommand::Permission(None) => println!("Permission: {}", policy.level()),
                SlashCommand::Permission(Some(level)) => {
                    policy.set_level(level);
                    println!("Permission set to {level}.");
                }
                SlashCommand::Quit => break,
                SlashCommand::Invalid(message) => println!("{message}"),
                SlashCommand::Unknown(command) => {
                    println!("Unknown command: {command}. Type /help for commands.");
                }
            }
            continue;
        }

        // Saved learnings may have changed since the last request.
        let memory = journal.read_all().unwrap_or_else(|error| {
            error!(%error, "failed to read memory journal");
            String::new()
        });
        conversation[0] = Message::system(build_system_prompt(
            &base_prompt,
            &agent.tools().names(),
            &memory,
        ));
        conversation.push(Message::user(input));

        let signal = new_cancel_signal();
        let mut streamed = String::new();
        let mut on_token = |text: &str, reasoning: bool| {
            if !reasoning {
                streamed.push_str(text);
            }
            let mut stdout = io::stdout();
            let _ = write!(stdout, "{}", render_token(text, reasoning));
            let _ = stdout.flush();
        };

        let outcome = {
            let ask = agent.ask(&mut conversation, Some(&mut on_token), &signal);
            tokio::pin!(ask);
            let mut listening = true;
            loop {
                tokio::select! {
                    outcome = &mut ask => break outcome,
                    interrupt = tokio::signal::ctrl_c(), if listening => {
                        match interrupt {
                            Ok(()) => cancel(&signal),
                            Err(error) => {
                                error!(%error, "failed to listen for Ctrl-C");
                                listening = false;
                            }
                        }
                    }
                }
            }
        };

        if !streamed.is_empty() {
            println!();
        }
        match outcome {
            Ok(result) if result.cancelled => println!("[cancelled]"),
            Ok(result) if result.exhausted => println!("{}", result.final_text),
            Ok(result) => {
                if !streamed.trim_end().ends_with(result.final_text.trim_end()) {
                    println!("{}", result.final_text);
                }
                if result.final_text != NO_RESPONSE_PLACEHOLDER {
                    conversation.push(Message::assistant(result.final_text));
                }
            }
            Err(error) => println!("error: {error}"),
        }
    }

    Ok(())
}
