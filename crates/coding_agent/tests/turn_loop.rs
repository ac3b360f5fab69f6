mod support;

use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_provider::{
    cancel, new_cancel_signal, LlmResponse, Message, ProviderError, Role, ToolArguments,
};
use agent_provider_mock::{ScriptedModel, ScriptedStep};
use chat_api::{ResponseAssembler, StreamDelta};
use coding_agent::agent::{
    Agent, AgentError, AgentResult, CANCELLED_BEFORE_EXECUTION, NO_RESPONSE_PLACEHOLDER,
};
use coding_agent::tools::builtin::{register_builtin_tools, Workspace};
use coding_agent::tools::{
    FnConfirmation, FnTool, PermissionGroup, PermissionLevel, ToolDefinition, DECLINED_MESSAGE,
};
use memory_journal::MemoryJournal;
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{call, registry, Probe};
use tempfile::tempdir;

fn tool_messages(conversation: &[Message]) -> Vec<(String, String)> {
    conversation
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| {
            (
                message.tool_call_id.clone().unwrap_or_default(),
                message.content.clone(),
            )
        })
        .collect()
}

#[tokio::test]
async fn list_files_scenario_answers_after_one_tool_turn() {
    let workspace = tempdir().expect("temp workspace");
    fs::write(workspace.path().join("a.txt"), "a").expect("write a");
    fs::write(workspace.path().join("b.txt"), "b").expect("write b");
    let journal_dir = tempdir().expect("journal dir");

    let (_policy, mut tools) = registry(PermissionLevel::WriteOnly);
    register_builtin_tools(
        &mut tools,
        Workspace::new(workspace.path()).expect("workspace"),
        MemoryJournal::for_workspace(journal_dir.path()),
    );

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![call("call_1", "list_directory", json!({"path": "."}))]),
        ScriptedStep::text("There are two files."),
    ]));
    let agent = Agent::new(model.clone(), tools);
    let mut conversation = vec![Message::system("s"), Message::user("list files")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(
        result,
        AgentResult {
            final_text: "There are two files.".to_string(),
            turn_count: 2,
            tools_used: vec!["list_directory".to_string()],
            cancelled: false,
            exhausted: false,
        }
    );
    assert_eq!(
        tool_messages(&conversation),
        vec![("call_1".to_string(), "a.txt\nb.txt".to_string())]
    );
    assert_eq!(conversation.len(), 4);

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages, conversation);
    assert_eq!(
        requests[0].tool_names,
        vec![
            "list_directory",
            "read_file",
            "write_file",
            "edit_file",
            "run_command",
            "save_learning"
        ]
    );
}

#[tokio::test]
async fn loop_stops_at_turn_budget() {
    let probe = Probe::default();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    tools.register(probe.definition("again", PermissionGroup::None, "ok"));

    let steps = (0..10)
        .map(|turn| ScriptedStep::tool_calls(vec![call(&format!("c{turn}"), "again", json!({}))]))
        .collect();
    let model = Arc::new(ScriptedModel::new(steps));
    let agent = Agent::new(model.clone(), tools).with_max_turns(3);
    let mut conversation = vec![Message::user("loop forever")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("exhaustion is not an error");

    assert!(result.exhausted);
    assert!(!result.cancelled);
    assert_eq!(result.turn_count, 3);
    assert_eq!(result.final_text, "Stopped after 3 turns for safety.");
    assert_eq!(model.call_count(), 3);
    assert_eq!(probe.count(), 3);
}

#[tokio::test]
async fn tool_results_follow_call_order() {
    let probe = Probe::default();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    tools.register(probe.definition("first", PermissionGroup::None, "one"));
    tools.register(probe.definition("second", PermissionGroup::None, "two"));

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![
            call("id-b", "second", json!({})),
            call("id-a", "first", json!({})),
            call("id-c", "second", json!({})),
        ]),
        ScriptedStep::text("done"),
    ]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("go")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(result.tools_used, vec!["second", "first", "second"]);
    assert_eq!(
        tool_messages(&conversation),
        vec![
            ("id-b".to_string(), "two".to_string()),
            ("id-a".to_string(), "one".to_string()),
            ("id-c".to_string(), "two".to_string()),
        ]
    );
    let assistant = &conversation[1];
    assert_eq!(assistant.role, Role::Assistant);
    assert_eq!(assistant.tool_calls.len(), 3);
}

#[tokio::test]
async fn cancellation_between_tool_calls_keeps_completed_results() {
    let signal = new_cancel_signal();
    let probe = Probe::default();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    tools.register(probe.definition("step", PermissionGroup::None, "stepped"));
    let trigger = Arc::clone(&signal);
    let cancelling_probe = probe.clone();
    tools.register(ToolDefinition::new(
        "step_then_cancel",
        "runs once and cancels the request",
        json!({"type": "object"}),
        PermissionGroup::None,
        FnTool::new(move |arguments: ToolArguments, _cancel| {
            let trigger = Arc::clone(&trigger);
            let probe = cancelling_probe.clone();
            async move {
                probe.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                probe.seen.lock().expect("probe lock").push(arguments);
                cancel(&trigger);
                Ok("stepped".to_string())
            }
        }),
    ));

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![
            call("c1", "step_then_cancel", json!({})),
            call("c2", "step", json!({})),
            call("c3", "step", json!({})),
        ]),
        ScriptedStep::text("never reached"),
    ]));
    let agent = Agent::new(model.clone(), tools);
    let mut conversation = vec![Message::user("three steps")];

    let result = agent
        .ask(&mut conversation, None, &signal)
        .await
        .expect("cancellation is not an error");

    assert!(result.cancelled);
    assert_eq!(result.final_text, "[cancelled]");
    assert_eq!(result.tools_used, vec!["step_then_cancel"]);
    assert_eq!(probe.count(), 1);
    let completed: Vec<(String, String)> = tool_messages(&conversation)
        .into_iter()
        .filter(|(_, content)| content != CANCELLED_BEFORE_EXECUTION)
        .collect();
    assert_eq!(completed, vec![("c1".to_string(), "stepped".to_string())]);
    assert_eq!(
        tool_messages(&conversation),
        vec![
            ("c1".to_string(), "stepped".to_string()),
            ("c2".to_string(), CANCELLED_BEFORE_EXECUTION.to_string()),
            ("c3".to_string(), CANCELLED_BEFORE_EXECUTION.to_string()),
        ]
    );
    assert_eq!(model.call_count(), 1);

    let followup = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("follow-up succeeds");
    assert_eq!(followup.final_text, "never reached");
    assert_eq!(tool_messages(&conversation).len(), 3);
    assert_eq!(probe.count(), 1);
}

#[tokio::test]
async fn cancelled_tool_group_stays_contiguous_when_history_grows() {
    let signal = new_cancel_signal();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    let trigger = Arc::clone(&signal);
    tools.register(ToolDefinition::new(
        "stop_here",
        "cancels the request while running",
        json!({"type": "object"}),
        PermissionGroup::None,
        FnTool::new(move |_arguments: ToolArguments, _cancel| {
            let trigger = Arc::clone(&trigger);
            async move {
                cancel(&trigger);
                Ok("stopped".to_string())
            }
        }),
    ));

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![
            call("c1", "stop_here", json!({})),
            call("c2", "stop_here", json!({})),
        ]),
        ScriptedStep::text("fine"),
    ]));
    let agent = Agent::new(model.clone(), tools);
    let mut conversation = vec![Message::user("first")];

    let result = agent
        .ask(&mut conversation, None, &signal)
        .await
        .expect("cancellation is not an error");
    assert!(result.cancelled);

    conversation.push(Message::user("second"));
    agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("follow-up succeeds");

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    let sent: Vec<(Role, Option<String>)> = requests[1]
        .messages
        .iter()
        .map(|message| (message.role, message.tool_call_id.clone()))
        .collect();
    assert_eq!(
        sent,
        vec![
            (Role::User, None),
            (Role::Assistant, None),
            (Role::Tool, Some("c1".to_string())),
            (Role::Tool, Some("c2".to_string())),
            (Role::User, None),
        ]
    );
}

#[tokio::test]
async fn cancellation_mid_stream_preserves_partial_text() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedStep::AwaitCancel {
        partial: "Half an ans".to_string(),
    }]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("explain")];
    let signal = new_cancel_signal();
    let trigger = Arc::clone(&signal);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel(&trigger);
    });

    let mut streamed = String::new();
    let mut sink = |text: &str, _reasoning: bool| streamed.push_str(text);
    let result = agent
        .ask(&mut conversation, Some(&mut sink), &signal)
        .await
        .expect("cancellation is not an error");

    assert!(result.cancelled);
    assert_eq!(result.turn_count, 0);
    assert_eq!(result.final_text, "[cancelled]\nHalf an ans");
    assert_eq!(streamed, "Half an ans");
    let last = conversation.last().expect("interrupted message appended");
    assert_eq!(last.role, Role::Assistant);
    assert_eq!(last.content, "Half an ans [interrupted]");
}

#[tokio::test]
async fn already_cancelled_signal_skips_the_model() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedStep::text("unused")]));
    let agent = Agent::new(model.clone(), tools);
    let signal = new_cancel_signal();
    cancel(&signal);
    let mut conversation = vec![Message::user("hi")];

    let result = agent
        .ask(&mut conversation, None, &signal)
        .await
        .expect("cancellation is not an error");

    assert!(result.cancelled);
    assert_eq!(result.final_text, "[cancelled]");
    assert_eq!(model.call_count(), 0);
    assert_eq!(conversation.len(), 1);
}

#[tokio::test]
async fn transport_failure_is_an_error() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedStep::Fail(
        ProviderError::Status {
            status: 500,
            body: "{\"error\":\"boom\"}".to_string(),
        },
    )]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("hi")];

    let error = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect_err("status errors surface");

    assert_eq!(
        error,
        AgentError::Transport(ProviderError::Status {
            status: 500,
            body: "{\"error\":\"boom\"}".to_string(),
        })
    );
    assert_eq!(conversation.len(), 1);
}

#[tokio::test]
async fn declined_write_feeds_decline_back_to_model() {
    let probe = Probe::default();
    let (policy, mut tools) = registry(PermissionLevel::WriteOnly);
    policy.set_confirmation_handler(Some(Arc::new(FnConfirmation::new(
        |_name: &str, _args: &ToolArguments| Ok(false),
    ))));
    tools.register(probe.definition("write_file", PermissionGroup::Write, "wrote"));

    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![call("w1", "write_file", json!({"path": "x"}))]),
        ScriptedStep::text("Okay, I will not write it."),
    ]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("write x")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(probe.count(), 0);
    assert_eq!(result.tools_used, vec!["write_file"]);
    assert_eq!(
        tool_messages(&conversation),
        vec![("w1".to_string(), DECLINED_MESSAGE.to_string())]
    );
}

#[tokio::test]
async fn unknown_tool_is_reported_conversationally() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![call("u1", "teleport", json!({}))]),
        ScriptedStep::text("That tool does not exist."),
    ]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("teleport me")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(result.turn_count, 2);
    assert_eq!(
        tool_messages(&conversation),
        vec![("u1".to_string(), "Error: unknown tool 'teleport'".to_string())]
    );
}

#[tokio::test]
async fn malformed_arguments_still_run_the_handler() {
    let mut assembler = ResponseAssembler::default();
    assembler.push(&StreamDelta::tool_call(0, Some("m1"), Some("probe"), Some("{\"path\": ")));
    assembler.push(&StreamDelta::tool_call(0, None, None, Some("oops")));
    let response = assembler.finish();

    let probe = Probe::default();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    tools.register(probe.definition("probe", PermissionGroup::Read, "probed"));
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::Respond {
            tokens: Vec::new(),
            response,
        },
        ScriptedStep::text("ok"),
    ]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("probe")];

    agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(probe.count(), 1);
    assert_eq!(probe.seen(), vec![ToolArguments::new()]);
}

#[tokio::test]
async fn empty_answer_uses_placeholder() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedStep::Respond {
        tokens: Vec::new(),
        response: LlmResponse::default(),
    }]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("say nothing")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(result.final_text, NO_RESPONSE_PLACEHOLDER);
    assert_eq!(result.turn_count, 1);
}

#[tokio::test]
async fn tokens_are_forwarded_live() {
    let (_policy, tools) = registry(PermissionLevel::WriteOnly);
    let model = Arc::new(ScriptedModel::new(vec![ScriptedStep::Respond {
        tokens: vec![
            ("plan".to_string(), true),
            ("Hello ".to_string(), false),
            ("there".to_string(), false),
        ],
        response: LlmResponse::text("Hello there"),
    }]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("greet")];
    let mut seen = Vec::new();
    let mut sink = |text: &str, reasoning: bool| seen.push((text.to_string(), reasoning));

    let result = agent
        .ask(&mut conversation, Some(&mut sink), &new_cancel_signal())
        .await
        .expect("ask succeeds");

    assert_eq!(result.final_text, "Hello there");
    assert_eq!(
        seen,
        vec![
            ("plan".to_string(), true),
            ("Hello ".to_string(), false),
            ("there".to_string(), false),
        ]
    );
}

#[tokio::test]
async fn log_sink_sees_turns_and_tools_and_panics_are_contained() {
    let probe = Probe::default();
    let (_policy, mut tools) = registry(PermissionLevel::AutoAccept);
    tools.register(probe.definition("look", PermissionGroup::None, "seen"));
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![call("l1", "look", json!({}))]),
        ScriptedStep::text("done"),
    ]));
    let lines = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&lines);
    let agent = Agent::new(model, tools).with_log_sink(Arc::new(move |line: &str| {
        {
            recorder.lock().expect("log lock").push(line.to_string());
        }
        panic!("log sink exploded");
    }));
    let mut conversation = vec![Message::user("look")];

    let result = agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("a panicking sink does not affect the loop");

    assert_eq!(result.final_text, "done");
    assert_eq!(
        lines.lock().expect("log lock").clone(),
        vec![
            "turn 1: requesting model",
            "tool look started",
            "tool look finished",
            "turn 2: requesting model",
        ]
    );
}

#[tokio::test]
async fn permission_change_applies_to_next_ask() {
    let probe = Probe::default();
    let (policy, mut tools) = registry(PermissionLevel::WriteOnly);
    tools.register(probe.definition("write_file", PermissionGroup::Write, "wrote"));
    let model = Arc::new(ScriptedModel::new(vec![
        ScriptedStep::tool_calls(vec![call("w1", "write_file", json!({}))]),
        ScriptedStep::text("blocked"),
        ScriptedStep::tool_calls(vec![call("w2", "write_file", json!({}))]),
        ScriptedStep::text("written"),
    ]));
    let agent = Agent::new(model, tools);
    let mut conversation = vec![Message::user("write")];

    agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("first ask");
    assert_eq!(probe.count(), 0);

    policy.set_level(PermissionLevel::AutoAccept);
    conversation.push(Message::user("write again"));
    agent
        .ask(&mut conversation, None, &new_cancel_signal())
        .await
        .expect("second ask");
    assert_eq!(probe.count(), 1);
}
