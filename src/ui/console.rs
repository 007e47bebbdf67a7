//! 交互式控制台
//!
//! 逐行读取问题交给 Orchestrator；quit（忽略大小写与首尾空白）、EOF 或提示符处的 Ctrl-C 退出，空行忽略。
//! 运行期间同时监听过程事件（verbose 时打印）与 Ctrl-C（丢弃当前运行 future，记忆不变，回到提示符）。
//! 回复打印之后的记忆压缩不响应 Ctrl-C，由摘要超时兜底。

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::core::{AgentError, Orchestrator};
use crate::react::ReactEvent;

pub const BANNER: &str = "🤖 ReAct Agent with Tools and Memory\n";
pub const PROMPT: &str = "\nAsk something (or 'quit'): ";

/// 一行输入对应的动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Ask(String),
    Skip,
    Quit,
}

pub fn parse_line(line: &str) -> ConsoleCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        ConsoleCommand::Skip
    } else if trimmed.eq_ignore_ascii_case("quit") {
        ConsoleCommand::Quit
    } else {
        ConsoleCommand::Ask(trimmed.to_string())
    }
}

/// verbose 模式下的事件展示；None 表示不打印
fn render_event(ev: &ReactEvent) -> Option<String> {
    match ev {
        ReactEvent::ThinkingContent { text } => Some(text.clone()),
        ReactEvent::Observation { preview, .. } => Some(format!("Observation: {preview}")),
        ReactEvent::ParseFailure { reason, attempt } => {
            Some(format!("Invalid format (attempt {attempt}): {reason}"))
        }
        ReactEvent::Retry { detail } => Some(format!("Retrying: {detail}")),
        _ => None,
    }
}

async fn write_event<W: AsyncWrite + Unpin>(out: &mut W, ev: &ReactEvent) -> std::io::Result<()> {
    if let Some(text) = render_event(ev) {
        out.write_all(format!("{text}\n").as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

fn render_outcome(outcome: Option<Result<String, AgentError>>) -> String {
    match outcome {
        Some(Ok(answer)) => format!("\n📣 Response:\n{answer}\n"),
        Some(Err(AgentError::IterationLimitExceeded(n))) => format!(
            "⚠️  Could not complete the request within {n} steps. Try rephrasing the question.\n"
        ),
        Some(Err(e)) => format!("⚠️  Error: {e}\n"),
        None => "⚠️  Cancelled.\n".to_string(),
    }
}

/// 控制台主循环：读到 quit、EOF 或在提示符处收到 Ctrl-C 时正常返回
pub async fn run_console<R, W>(
    orchestrator: &mut Orchestrator,
    input: R,
    out: W,
    verbose: bool,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    run_console_with_interrupt(orchestrator, input, out, verbose, tokio::signal::ctrl_c).await
}

/// 同 run_console，中断信号由 `interrupt` 提供（每次等待输入或运行时调用一次）
pub async fn run_console_with_interrupt<R, W, I, F>(
    orchestrator: &mut Orchestrator,
    input: R,
    mut out: W,
    verbose: bool,
    mut interrupt: I,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    I: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    out.write_all(BANNER.as_bytes()).await?;
    let mut lines = input.lines();

    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                tracing::info!("interrupted at prompt, exiting");
                out.write_all(b"\n").await?;
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        let query = match parse_line(&line) {
            ConsoleCommand::Quit => break,
            ConsoleCommand::Skip => continue,
            ConsoleCommand::Ask(q) => q,
        };

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let outcome = {
            let run = orchestrator.run_query(&query, Some(&event_tx));
            tokio::pin!(run);
            let cancel = interrupt();
            tokio::pin!(cancel);
            loop {
                tokio::select! {
                    res = &mut run => break Some(res),
                    Some(ev) = event_rx.recv(), if verbose => write_event(&mut out, &ev).await?,
                    _ = &mut cancel => {
                        tracing::info!("run cancelled by user");
                        break None;
                    }
                }
            }
        };
        if verbose {
            while let Ok(ev) = event_rx.try_recv() {
                write_event(&mut out, &ev).await?;
            }
        }

        let answered = matches!(outcome, Some(Ok(_)));
        out.write_all(render_outcome(outcome).as_bytes()).await?;
        out.flush().await?;

        if answered {
            orchestrator.compact_memory().await;
        }
    }

    out.flush().await?;
    Ok(())
}
