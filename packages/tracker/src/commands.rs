//! Subcommand implementations
//!
//! Every command writes one JSON value per line to `out`. Streaming commands
//! stop at the end of their stream or when `shutdown` resolves, whichever
//! comes first.

use eyre::{Result, WrapErr};
use futures::{Stream, StreamExt};
use hyperclient_rs::{HyperClient, Message};
use serde::Serialize;
use std::future::Future;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Read a request or response from a JSON file
pub fn read_message(path: &Path) -> Result<Message> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read message {}", path.display()))?;
    let message: Message = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Invalid message {}", path.display()))?;
    message.validate()?;
    Ok(message)
}

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct CommitmentOutput {
    commitment: String,
    kind: &'static str,
}

/// Print the message commitment; needs no chain access
pub fn commitment<W: Write>(message: &Message, out: &mut W) -> Result<()> {
    let kind = if message.is_response() {
        "response"
    } else {
        "request"
    };
    emit(
        out,
        &CommitmentOutput {
            commitment: message.commitment().to_hex(),
            kind,
        },
    )
}

/// Print the current status
pub async fn status<W: Write>(client: &HyperClient, message: &Message, out: &mut W) -> Result<()> {
    let status = client.query_status(message).await?;
    emit(out, &status)
}

/// Forward stream items to `out` until the stream ends or `shutdown` fires
///
/// Returns the number of items written.
async fn drain<S, T, W, F>(stream: S, out: &mut W, shutdown: F) -> Result<usize>
where
    S: Stream<Item = Result<T>>,
    T: Serialize,
    W: Write,
    F: Future<Output = ()>,
{
    futures::pin_mut!(stream);
    futures::pin_mut!(shutdown);

    let mut written = 0;
    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(item) => {
                    emit(out, &item?)?;
                    written += 1;
                }
                None => return Ok(written),
            },
            _ = &mut shutdown => {
                info!(written, "Shutdown requested, stopping stream");
                return Ok(written);
            }
        }
    }
}

/// Follow a message until it is delivered or times out
pub async fn subscribe<W, F>(
    client: &HyperClient,
    message: Message,
    height: Option<u64>,
    out: &mut W,
    shutdown: F,
) -> Result<usize>
where
    W: Write,
    F: Future<Output = ()>,
{
    let height = height.unwrap_or_else(|| message.height());
    let stream = client
        .subscribe(message, height)?
        .map(|item| item.map_err(eyre::Report::from));
    drain(stream, out, shutdown).await
}

/// Follow a timed-out request until its timeout can be relayed
pub async fn timeout<W, F>(
    client: &HyperClient,
    message: Message,
    out: &mut W,
    shutdown: F,
) -> Result<usize>
where
    W: Write,
    F: Future<Output = ()>,
{
    let stream = client.timeout(message)?.map(Ok::<_, eyre::Report>);
    drain(stream, out, shutdown).await
}
