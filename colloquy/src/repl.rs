use std::future::Future;
use std::io::Write;

use colloquy_client::{AskOptions, ChatClient, ChatError, ConversationId, Role};
use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::args::Args;

/// Console commands other than plain questions
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Ask(&'a str),
    Reset,
    History,
    Exit,
    Empty,
}

/// What waiting at the prompt produced
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    /// End of input
    Closed,
    /// Ctrl+C with no request in flight
    Interrupted,
}

async fn next_input<R, F>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Input>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = interrupt => Ok(Input::Interrupted),
        line = lines.next_line() => Ok(line?.map_or(Input::Closed, Input::Line)),
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn parse(line: &str) -> Command<'_> {
    match line.trim() {
        "" => Command::Empty,
        "/exit" | "/quit" => Command::Exit,
        "/reset" => Command::Reset,
        "/history" => Command::History,
        text => Command::Ask(text),
    }
}

/// Read questions from stdin until EOF or `/exit`
///
/// Ctrl+C aborts the answer in progress and keeps the session open; at an
/// idle prompt it ends the session.
pub async fn run(client: &ChatClient, args: &Args) -> anyhow::Result<()> {
    let id = match &args.system {
        Some(system) => client.setup(Uuid::nil(), system).await?,
        None => Uuid::new_v4(),
    };

    let mut options = AskOptions::new();
    if let Some(model) = &args.model {
        options = options.with_model(model.clone());
    }

    eprintln!("Conversation {id}. Commands: /reset, /history, /exit (or Ctrl+D). Ctrl+C stops an answer.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;

    loop {
        let line = match next_input(&mut lines, ctrl_c()).await? {
            Input::Line(line) => line,
            Input::Closed => break,
            Input::Interrupted => {
                eprintln!();
                break;
            }
        };

        match parse(&line) {
            Command::Empty => {}
            Command::Exit => break,
            Command::Reset => {
                client.delete_conversation(id, true).await?;
                eprintln!("History cleared.");
            }
            Command::History => print_history(client, id).await?,
            Command::Ask(question) => {
                let cancel = CancellationToken::new();
                let watcher = spawn_interrupt_watcher(cancel.clone());
                let options = options.clone().with_cancellation(cancel);

                let result = if args.stream {
                    ask_streaming(client, id, question, &options).await
                } else {
                    ask_once(client, id, question, &options).await
                };
                watcher.abort();

                match result {
                    Ok(()) => {}
                    Err(ChatError::Cancelled) => eprintln!("\n(cancelled)"),
                    Err(e) => {
                        tracing::error!(error = %e, "request failed");
                        eprintln!("error: {e}");
                    }
                }
            }
        }

        prompt()?;
    }

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn spawn_interrupt_watcher(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        ctrl_c().await;
        cancel.cancel();
    })
}

async fn ask_once(
    client: &ChatClient,
    id: ConversationId,
    question: &str,
    options: &AskOptions,
) -> Result<(), ChatError> {
    let response = client.ask(id, question, options).await?;

    if let Some(error) = &response.error {
        println!("error: {error}");
    } else if response.is_content_filtered() {
        println!("(answer withheld by the content filter)");
    } else {
        println!("{}", response.content().unwrap_or_default());
    }

    Ok(())
}

async fn ask_streaming(
    client: &ChatClient,
    id: ConversationId,
    question: &str,
    options: &AskOptions,
) -> Result<(), ChatError> {
    let mut stream = client.ask_stream(id, question, options).await?;
    let mut stdout = std::io::stdout();

    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;

        if fragment.is_content_filtered() {
            print!("(answer withheld by the content filter)");
        } else if let Some(content) = fragment.content() {
            print!("{content}");
        }
        // Progress output only
        let _ = stdout.flush();
    }

    println!();
    Ok(())
}

async fn print_history(client: &ChatClient, id: ConversationId) -> Result<(), ChatError> {
    for message in client.get_conversation(id).await? {
        let text = match (&message.content, message.role) {
            (Some(content), _) => content.clone(),
            (None, Role::Assistant) => "(function call)".to_owned(),
            (None, _) => String::new(),
        };
        println!("[{}] {text}", message.role);
    }

    Ok(())
}
