//! Stream helpers over `tokio::sync::watch`.

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Stream the current value of `rx`, then every subsequent change.
///
/// Ends when the sender is dropped. Intermediate values may be skipped if the
/// consumer is slower than the producer; the latest value is never lost.
pub fn watch_stream<T>(rx: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    WatchStream::new(rx).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_latest_then_changes() {
        let (tx, rx) = watch::channel(1);
        tx.send_replace(2);

        let mut values = watch_stream(rx);
        assert_eq!(values.next().await, Some(2));

        tx.send_replace(3);
        assert_eq!(values.next().await, Some(3));

        drop(tx);
        assert_eq!(values.next().await, None);
    }
}
