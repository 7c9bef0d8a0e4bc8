use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chatloop_core::approval::{AlwaysApprove, AlwaysDecline, approval_fn};
use chatloop_core::engine::DECLINED_MESSAGE;
use chatloop_core::message::verify_adjacency;
use chatloop_core::{
    Cancellation, ChatRequest, Emitter, Engine, EngineConfig, ExecutionError, Function,
    FunctionReturnValue, Message, Provider,
};
use executor_core::tokio::TokioGlobal;
use futures_lite::StreamExt;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
enum Step {
    Text(&'static str),
    Message(Message),
    Fail(&'static str),
    Hang,
    // Waits for cancellation, then fails like an aborted HTTP request.
    Abort(&'static str),
    // Waits until something is sent on the channel.
    Wait(async_channel::Receiver<()>),
}

/// Replays one list of steps per turn and records every request it was sent.
struct Scripted {
    turns: Vec<Vec<Step>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl Provider for Scripted {
    async fn stream(
        &self,
        request: &ChatRequest,
        emitter: &Emitter,
        cancellation: &Cancellation,
    ) -> chatloop_core::Result<()> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let Some(steps) = self.turns.get(index) else {
            return Err(anyhow::anyhow!("unexpected turn {index}"));
        };
        for step in steps {
            match step {
                Step::Text(text) => emitter.text(*text),
                Step::Message(message) => emitter.message(message.clone()),
                Step::Fail(error) => return Err(anyhow::anyhow!(*error)),
                Step::Hang => cancellation.cancelled().await,
                Step::Abort(error) => {
                    cancellation.cancelled().await;
                    return Err(anyhow::anyhow!(*error));
                }
                Step::Wait(signal) => signal.recv().await?,
            }
            tokio::task::yield_now().await;
        }
        Ok(())
    }
}

type Requests = Arc<Mutex<Vec<ChatRequest>>>;

fn engine(turns: Vec<Vec<Step>>) -> (Engine<Scripted, TokioGlobal>, Requests) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let requests = Requests::default();
    let provider = Scripted {
        turns,
        requests: requests.clone(),
    };
    (Engine::new(provider, TokioGlobal), requests)
}

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

fn invoke(id: &str, name: &str, parameters: serde_json::Value) -> Step {
    Step::Message(Message::invocation(id, name, parameters))
}

fn weather() -> Function {
    Function::declare(
        "get_weather",
        "Current weather for a city",
        json!({
            "type": "object",
            "properties": { "location": { "type": "string" } },
            "required": ["location"],
            "additionalProperties": false
        }),
    )
    .with_implementation(|_| async { Ok("20 degrees".to_string()) })
}

fn return_values(messages: &[Message]) -> Vec<&FunctionReturnValue> {
    messages.iter().filter_map(Message::as_return_value).collect()
}

#[tokio::test]
async fn weather_round_trip() {
    let (engine, requests) = engine(vec![
        vec![invoke("1", "get_weather", json!({"location": "amsterdam"}))],
        vec![Step::Text("20"), Step::Text(" degrees and sunny")],
    ]);
    let request = ChatRequest::new([Message::user("How warm is it in Amsterdam?")])
        .with_system_prompt("Answer briefly")
        .with_function(weather());

    let mut execution = engine.execute(request);
    let messages = execution.messages().unwrap();
    let text = execution.text_segments().unwrap();

    let segments: Vec<_> = within(text.collect::<Vec<_>>()).await;
    let segments: Vec<String> = segments.into_iter().map(Result::unwrap).collect();
    assert_eq!(segments, ["20", " degrees and sunny"]);

    let messages = within(messages.collect_all()).await.unwrap();
    assert_eq!(
        messages,
        [
            Message::invocation("1", "get_weather", json!({"location": "amsterdam"})),
            FunctionReturnValue::success("1", "20 degrees").into(),
        ]
    );

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    let second = &requests[1];
    assert_eq!(second.messages().len(), 3);
    assert_eq!(
        second.messages()[0],
        Message::user("How warm is it in Amsterdam?")
    );
    assert_eq!(second.messages()[1..], messages[..]);
    assert!(verify_adjacency(second.messages()).is_ok());
    assert_eq!(second.system_prompt(), Some("Answer briefly"));
    assert!(second.function("get_weather").is_some());
}

#[tokio::test]
async fn turn_without_invocations_completes() {
    let (engine, requests) = engine(vec![vec![
        Step::Text("Hello"),
        Step::Text(" there"),
        Step::Message(Message::assistant("Hello there")),
    ]]);

    let mut execution = engine.execute(ChatRequest::new([Message::user("hi")]));
    let messages = execution.messages().unwrap();
    let text = within(execution.text_segments().unwrap().concat()).await;
    assert_eq!(text.unwrap(), "Hello there");
    assert_eq!(
        within(messages.collect_all()).await.unwrap(),
        [Message::assistant("Hello there")]
    );

    within(execution.wait()).await;
    assert!(execution.is_finished());
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn every_invocation_is_answered_before_the_next_turn() {
    let (engine, requests) = engine(vec![
        vec![
            invoke("a", "delay", json!({"ms": 30})),
            Step::Text("working"),
            invoke("b", "delay", json!({"ms": 1})),
            invoke("c", "delay", json!({"ms": 15})),
        ],
        vec![Step::Text("done")],
    ]);
    let delay = Function::declare("delay", "Sleeps", json!({"type": "object"}))
        .with_implementation(|arguments| async move {
            let ms = arguments["ms"].as_u64().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(format!("slept {ms}ms"))
        });

    let request = ChatRequest::new([Message::user("go")]).with_function(delay);
    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    assert_eq!(messages.len(), 6);
    assert_eq!(return_values(&messages).len(), 3);
    assert!(return_values(&messages).iter().all(|value| value.success));

    let requests = requests.lock().unwrap();
    let history = requests[1].messages();
    assert_eq!(history.len(), 7);
    verify_adjacency(history).unwrap();
    let order: Vec<_> = history[1..]
        .iter()
        .map(|message| match message {
            Message::FunctionInvocation(invocation) => format!("call {}", invocation.id),
            Message::FunctionReturnValue(value) => format!("return {}", value.invocation_id),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(
        order,
        ["call a", "return a", "call b", "return b", "call c", "return c"]
    );
}

#[tokio::test]
async fn declined_calls_do_not_run() {
    let ran = Arc::new(AtomicBool::new(false));
    let (engine, requests) = engine(vec![
        vec![invoke("1", "delete_file", json!({"path": "/etc/hosts"}))],
        vec![Step::Text("Okay, I left it alone.")],
    ]);
    let delete = {
        let ran = ran.clone();
        Function::declare("delete_file", "Deletes a file", json!({"type": "object"}))
            .requiring_approval()
            .with_implementation(move |_| {
                ran.store(true, Ordering::SeqCst);
                async { Ok("deleted".to_string()) }
            })
    };
    let request = ChatRequest::new([Message::user("clean up")])
        .with_function(delete)
        .with_approver(AlwaysDecline);

    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    let values = return_values(&messages);
    assert_eq!(values.len(), 1);
    assert!(!values[0].success);
    assert_eq!(values[0].result, DECLINED_MESSAGE);
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn decline_message_is_configurable() {
    let (engine, _) = engine(vec![
        vec![invoke("1", "delete_file", json!({}))],
        vec![],
    ]);
    let engine = engine.with_config(EngineConfig::new().with_decline_message("nope"));
    let request = ChatRequest::new([Message::user("clean up")])
        .with_function(
            Function::declare("delete_file", "Deletes a file", json!({}))
                .requiring_approval()
                .with_implementation(|_| async { Ok("deleted".to_string()) }),
        )
        .with_approver(approval_fn(|invocation, _| {
            let allowed = invocation.name != "delete_file";
            async move { Ok(allowed) }
        }));

    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    assert_eq!(return_values(&messages)[0].result, "nope");
}

#[tokio::test]
async fn approved_calls_run() {
    let (engine, _) = engine(vec![
        vec![invoke("1", "get_weather", json!({"location": "paris"}))],
        vec![],
    ]);
    let request = ChatRequest::new([Message::user("weather?")])
        .with_function(weather().requiring_approval())
        .with_approver(AlwaysApprove);

    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    assert_eq!(
        return_values(&messages),
        [&FunctionReturnValue::success("1", "20 degrees")]
    );
}

#[tokio::test]
async fn missing_approver_is_fatal_on_both_streams() {
    let (engine, requests) = engine(vec![
        vec![
            Step::Text("let me check"),
            invoke("1", "get_weather", json!({"location": "oslo"})),
        ],
        vec![Step::Text("never reached")],
    ]);
    let request =
        ChatRequest::new([Message::user("weather?")]).with_function(weather().requiring_approval());

    let mut execution = engine.execute(request);
    let messages: Vec<_> = within(execution.messages().unwrap().collect::<Vec<_>>()).await;
    let text: Vec<_> = within(execution.text_segments().unwrap().collect::<Vec<_>>()).await;

    let expected = ExecutionError::ApprovalUnavailable {
        function: "get_weather".into(),
    };
    assert_eq!(messages.len(), 2);
    assert!(messages[0].as_ref().unwrap().is_invocation());
    assert_eq!(messages[1], Err(expected.clone()));

    assert_eq!(text, [Ok("let me check".to_string()), Err(expected)]);
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn approver_failure_becomes_a_return_value() {
    let ran = Arc::new(AtomicBool::new(false));
    let (engine, requests) = engine(vec![
        vec![invoke("1", "deploy", json!({}))],
        vec![Step::Text("deployment was not approved")],
    ]);
    let deploy = {
        let ran = ran.clone();
        Function::declare("deploy", "Deploys", json!({}))
            .requiring_approval()
            .with_implementation(move |_| {
                ran.store(true, Ordering::SeqCst);
                async { Ok("deployed".to_string()) }
            })
    };
    let request = ChatRequest::new([Message::user("ship it")])
        .with_function(deploy)
        .with_approver(approval_fn(|_, _| async {
            Err(anyhow::anyhow!("approval service down"))
        }));

    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    let values = return_values(&messages);
    assert_eq!(values.len(), 1);
    assert!(!values[0].success);
    assert!(values[0].result.contains("approval service down"));
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn function_failures_are_fed_back() {
    let (engine, requests) = engine(vec![
        vec![invoke("1", "divide", json!({"a": 1, "b": 0}))],
        vec![Step::Text("You cannot divide by zero.")],
    ]);
    let divide = Function::declare("divide", "Divides", json!({}))
        .with_implementation(|_| async { Err(anyhow::anyhow!("Division by zero")) });

    let request = ChatRequest::new([Message::user("1/0?")]).with_function(divide);
    let mut execution = engine.execute(request);
    let text = within(execution.text_segments().unwrap().concat()).await;
    assert_eq!(text.unwrap(), "You cannot divide by zero.");

    let requests = requests.lock().unwrap();
    let answer = requests[1].messages()[2].as_return_value().unwrap();
    assert_eq!(answer, &FunctionReturnValue::failure("1", "Division by zero"));
}

#[tokio::test]
async fn panicking_functions_are_fed_back() {
    let (engine, _) = engine(vec![vec![invoke("1", "explode", json!({}))], vec![]]);
    let explode = Function::declare("explode", "Panics", json!({})).with_implementation(|_| async {
        if true {
            panic!("kaboom");
        }
        Ok(String::new())
    });

    let request = ChatRequest::new([Message::user("go")]).with_function(explode);
    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    let values = return_values(&messages);
    assert!(!values[0].success);
    assert_eq!(values[0].result, "kaboom");
}

#[tokio::test]
async fn unimplemented_functions_are_left_to_the_caller() {
    let (engine, requests) = engine(vec![
        vec![
            invoke("1", "ask_user", json!({"question": "Which city?"})),
            invoke("2", "not_registered", json!({})),
        ],
        vec![Step::Text("waiting for you")],
    ]);
    let ask = Function::declare("ask_user", "Asks the user", json!({"type": "object"}));

    let request = ChatRequest::new([Message::user("weather?")]).with_function(ask);
    let mut execution = engine.execute(request);
    let messages = within(execution.messages().unwrap().collect_all()).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert!(return_values(&messages).is_empty());

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages()[1..], messages[..]);
    verify_adjacency(requests[1].messages()).unwrap();
}

#[tokio::test]
async fn provider_failure_is_observed_on_both_streams() {
    let (engine, _) = engine(vec![vec![
        Step::Text("partial"),
        Step::Message(Message::assistant("partial")),
        Step::Fail("rate limited"),
    ]]);

    let mut execution = engine.execute(ChatRequest::new([Message::user("hi")]));
    let text: Vec<_> = within(execution.text_segments().unwrap().collect::<Vec<_>>()).await;
    assert_eq!(text.len(), 2);
    assert_eq!(text[0], Ok("partial".to_string()));
    let error = text[1].clone().unwrap_err();
    assert!(
        matches!(&error, ExecutionError::Provider(message) if message.contains("rate limited"))
    );

    let messages: Vec<_> = within(execution.messages().unwrap().collect::<Vec<_>>()).await;
    assert_eq!(messages, [Ok(Message::assistant("partial")), Err(error)]);
}

#[tokio::test]
async fn cancellation_closes_streams_without_error() {
    let (engine, requests) = engine(vec![vec![Step::Text("thinking"), Step::Hang]]);

    let mut execution = engine.execute(ChatRequest::new([Message::user("hi")]));
    let mut text = pin!(execution.text_segments().unwrap());
    let mut messages = pin!(execution.messages().unwrap());

    assert_eq!(within(text.next()).await, Some(Ok("thinking".to_string())));
    execution.cancel();
    assert_eq!(within(text.next()).await, None);
    assert_eq!(within(messages.next()).await, None);

    within(execution.wait()).await;
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn provider_failing_after_cancellation_closes_streams_without_error() {
    let (engine, _) = engine(vec![vec![Step::Text("thinking"), Step::Abort("request aborted")]]);

    let mut execution = engine.execute(ChatRequest::new([Message::user("hi")]));
    let mut text = pin!(execution.text_segments().unwrap());
    let mut messages = pin!(execution.messages().unwrap());

    assert_eq!(within(text.next()).await, Some(Ok("thinking".to_string())));
    execution.cancel();
    assert_eq!(within(text.next()).await, None);
    assert_eq!(within(messages.next()).await, None);
    within(execution.wait()).await;
}

#[tokio::test]
async fn invocations_resolve_while_the_provider_streams() {
    let (signal_tx, signal_rx) = async_channel::bounded(1);
    let (engine, _) = engine(vec![
        vec![
            invoke("1", "unblock", json!({})),
            Step::Wait(signal_rx),
            Step::Text("unblocked"),
        ],
        vec![Step::Text(" done")],
    ]);
    // The provider only finishes its turn once this function has run.
    let unblock = Function::declare("unblock", "Lets the provider continue", json!({}))
        .with_implementation(move |_| {
            let signal = signal_tx.clone();
            async move {
                signal.send(()).await?;
                Ok("sent".to_string())
            }
        });

    let request = ChatRequest::new([Message::user("hi")]).with_function(unblock);
    let mut execution = engine.execute(request);
    let mut messages = pin!(execution.messages().unwrap());

    // Both the invocation and its answer are visible before the provider returned.
    let first = within(messages.next()).await.unwrap().unwrap();
    assert_eq!(first.as_invocation().unwrap().id, "1");
    let second = within(messages.next()).await.unwrap().unwrap();
    assert_eq!(second.as_return_value().unwrap().result, "sent");

    let text = within(execution.text_segments().unwrap().concat()).await;
    assert_eq!(text.unwrap(), "unblocked done");
}

#[tokio::test]
async fn cancelled_before_start_never_calls_the_provider() {
    let (engine, requests) = engine(vec![vec![Step::Text("hello")]]);
    let cancellation = Cancellation::new();
    cancellation.cancel();

    let mut execution = engine.execute_with(ChatRequest::new([Message::user("hi")]), cancellation);
    let text = within(execution.text_segments().unwrap().concat()).await;
    assert_eq!(text.unwrap(), "");
    within(execution.wait()).await;
    assert!(requests.lock().unwrap().is_empty());
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn dispose_waits_for_running_functions() {
    let started = Arc::new(AtomicUsize::new(0));
    let dropped = Arc::new(AtomicBool::new(false));
    let (engine, _) = engine(vec![vec![invoke("1", "slow", json!({})), Step::Hang]]);
    let slow = {
        let started = started.clone();
        let dropped = dropped.clone();
        Function::declare("slow", "Never finishes", json!({})).with_implementation(move |_| {
            started.fetch_add(1, Ordering::SeqCst);
            let guard = SetOnDrop(dropped.clone());
            async move {
                let _guard = guard;
                std::future::pending::<chatloop_core::Result>().await
            }
        })
    };

    let execution = engine.execute(ChatRequest::new([Message::user("go")]).with_function(slow));
    within(async {
        while started.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(!dropped.load(Ordering::SeqCst));

    within(execution.dispose()).await;
    assert!(dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn turn_limit_is_fatal() {
    let (engine, requests) = engine(vec![
        vec![invoke("1", "get_weather", json!({"location": "rome"}))],
        vec![Step::Text("unreachable")],
    ]);
    let engine = engine.with_config(EngineConfig::new().with_max_turns(1));

    let request = ChatRequest::new([Message::user("weather?")]).with_function(weather());
    let mut execution = engine.execute(request);
    let messages: Vec<_> = within(execution.messages().unwrap().collect::<Vec<_>>()).await;
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2], Err(ExecutionError::TurnLimit { limit: 1 }));
    assert_eq!(requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn streams_are_handed_out_once() {
    let (engine, _) = engine(vec![vec![]]);
    let mut execution = engine.execute(ChatRequest::new([Message::user("hi")]));
    assert!(execution.text_segments().is_some());
    assert!(execution.text_segments().is_none());
    assert!(execution.messages().is_some());
    assert!(execution.messages().is_none());
    within(execution.wait()).await;
}
