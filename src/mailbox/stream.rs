//! Bounded hand-off between a fetching session and the engine.
//!
//! The session runs on a scoped producer thread and pushes messages into a
//! channel that holds a single message; the producer blocks until the engine
//! has taken the previous one.

use std::sync::mpsc::{sync_channel, Receiver};
use std::thread;

use tracing::debug;

use super::MailboxSession;
use crate::error::ProtocolError;
use crate::model::message::{FetchMode, FetchedMessage};

/// Messages buffered between producer and consumer.
const STREAM_CAPACITY: usize = 1;

/// Single-pass sequence of fetched messages.
#[derive(Debug)]
pub struct MessageStream {
    rx: Receiver<FetchedMessage>,
}

impl Iterator for MessageStream {
    type Item = FetchedMessage;

    fn next(&mut self) -> Option<FetchedMessage> {
        self.rx.recv().ok()
    }
}

/// Fetch `uids` from `reader` and hand the resulting stream to `consume`.
///
/// Returns what `consume` returned, or the producer's error once the stream
/// has ended. Dropping out of `consume` early stops the fetch.
pub fn with_stream<S, T, F>(
    reader: &mut S,
    uids: &[u32],
    mode: FetchMode,
    consume: F,
) -> Result<T, ProtocolError>
where
    S: MailboxSession + ?Sized,
    F: FnOnce(&mut MessageStream) -> T,
{
    let (tx, rx) = sync_channel(STREAM_CAPACITY);

    thread::scope(|scope| {
        let producer = scope.spawn(move || reader.fetch(uids, mode, &tx));

        let mut stream = MessageStream { rx };
        let value = consume(&mut stream);
        drop(stream);

        match producer.join() {
            Ok(Ok(())) => Ok(value),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!("Fetch producer panicked");
                Err(ProtocolError::new("fetch", "message producer panicked"))
            }
        }
    })
}
