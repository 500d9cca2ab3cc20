mod harness;

use std::time::Duration;

use colloquy_client::{AskOptions, CancellationToken, ChatError, ChatStream, Message};
use futures_util::StreamExt;
use harness::mock_openai::{MockOpenAi, Reply, content_delta, sse_frame};
use harness::{client, openai_config};
use serde_json::json;
use uuid::Uuid;

async fn collect_text(mut stream: ChatStream) -> Result<String, ChatError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        if let Some(content) = fragment?.content() {
            text.push_str(content);
        }
    }
    Ok(text)
}

#[tokio::test]
async fn fragments_are_yielded_and_stored_as_one_answer() {
    let mock = MockOpenAi::start().await.unwrap();
    mock.push(Reply::stream(&["\n\nHel", "lo", " world"]));
    let client = client(openai_config(&mock));
    let id = client.setup(Uuid::new_v4(), "be friendly").await.unwrap();

    let mut stream = client.ask_stream(id, "greet me", &AskOptions::new()).await.unwrap();

    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment.unwrap();
        assert_eq!(fragment.conversation_id, id);
        fragments.push(fragment.content().unwrap().to_owned());
    }
    assert_eq!(fragments, ["Hel", "lo", " world"]);

    let history = client.get_conversation(id).await.unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[2], Message::assistant("Hello world"));

    let request = &mock.requests()[0];
    assert_eq!(request.body["stream"], true);
    assert!(request.body.get("stream_options").is_none());
}

#[tokio::test]
async fn streaming_and_blocking_answers_leave_the_same_history() {
    let mock = MockOpenAi::start().await.unwrap();
    mock.push(Reply::text("The answer is 42"))
        .push(Reply::stream(&["The answer", " is", " 42"]));
    let client = client(openai_config(&mock));

    let blocking = Uuid::new_v4();
    client.ask(blocking, "question", &AskOptions::new()).await.unwrap();

    let streaming = Uuid::new_v4();
    let stream = client.ask_stream(streaming, "question", &AskOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "The answer is 42");

    assert_eq!(
        client.get_conversation(blocking).await.unwrap(),
        client.get_conversation(streaming).await.unwrap()
    );
}

#[tokio::test]
async fn frames_split_across_network_chunks_are_reassembled() {
    let mock = MockOpenAi::start().await.unwrap();
    let first = sse_frame(&content_delta("caf\u{e9}")).replace('\n', "\r\n");
    let (head, tail) = first.split_at(20);
    mock.push(Reply::Chunks(vec![
        ": keep-alive\n".to_owned(),
        head.to_owned(),
        tail.to_owned(),
        sse_frame(&content_delta(" au lait")),
        "data: [DO".to_owned(),
        "NE]\n".to_owned(),
    ]));
    let client = client(openai_config(&mock));
    let id = Uuid::new_v4();

    let stream = client.ask_stream(id, "order", &AskOptions::new()).await.unwrap();
    assert_eq!(collect_text(stream).await.unwrap(), "caf\u{e9} au lait");

    let history = client.get_conversation(id).await.unwrap();
    assert_eq!(history[1].content.as_deref(), Some("caf\u{e9} au lait"));
}

#[tokio::test]
async fn prompt_filter_results_ride_on_the_next_text_fragment() {
    let mock = MockOpenAi::start().await.unwrap();
    mock.push(Reply::Chunks(vec![
        sse_frame(&json!({
            "choices": [],
            "prompt_filter_results": [{ "prompt_index": 0, "content_filter_results": {} }]
        })),
        sse_frame(&content_delta("hi")),
        "data: [DONE]\n\n".to_owned(),
    ]));
    let client = client(openai_config(&mock));

    let mut stream = client.ask_stream(Uuid::new_v4(), "hello", &AskOptions::new()).await.unwrap();
    let fragment = stream.next().await.unwrap().unwrap();

    assert_eq!(fragment.content(), Some("hi"));
    assert!(fragment.prompt_filter_results.is_some());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn cancelling_mid_stream_writes_nothing_back() {
    let mock = MockOpenAi::start().await.unwrap();
    mock.push(Reply::Stalled(vec![sse_frame(&content_delta("partial"))]));
    let client = client(openai_config(&mock));
    let id = client.setup(Uuid::new_v4(), "system").await.unwrap();

    let token = CancellationToken::new();
    let options = AskOptions::new().with_cancellation(token.clone());
    let mut stream = client.ask_stream(id, "long answer please", &options).await.unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content(), Some("partial"));

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let next = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("cancellation should end the stream");
    assert!(matches!(next, Some(Err(ChatError::Cancelled))));
    assert!(stream.next().await.is_none());
    canceller.await.unwrap();

    let history = client.get_conversation(id).await.unwrap();
    assert_eq!(history, [Message::system("system")]);
}

#[tokio::test]
async fn dropping_the_stream_writes_nothing_back() {
    let mock = MockOpenAi::start().await.unwrap();
    mock.push(Reply::stream(&["one", " two"]));
    let client = client(openai_config(&mock));
    let id = Uuid::new_v4();

    let mut stream = client.ask_stream(id, "count", &AskOptions::new()).await.unwrap();
    stream.next().await.unwrap().unwrap();
    drop(stream);

    assert!(!client.conversation_exists(id).await.unwrap());
}

#[tokio::test]
async fn cancelling_before_the_request_sends_nothing() {
    let mock = MockOpenAi::start().await.unwrap();
    let client = client(openai_config(&mock));

    let token = CancellationToken::new();
    token.cancel();
    let options = AskOptions::new().with_cancellation(token);

    let result = client.ask_stream(Uuid::new_v4(), "hello", &options).await;
    assert!(matches!(result, Err(ChatError::Cancelled)));
    assert_eq!(mock.request_count(), 0);
}
