//! Network idle detection
//!
//! A page counts as loaded once no request has been in flight for a quiet
//! window, or once a hard cap elapses, whichever comes first. Requests that
//! never settle (long polls, hung hosts) only delay printing up to the cap.

use std::collections::HashSet;
use std::time::Duration;

use futures::{Stream, StreamExt};

/// A network event relevant to idleness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkActivity {
    /// A request with this id was sent
    Started(String),
    /// The request finished or failed
    Settled(String),
}

/// Wait until no request has been in flight for `quiet`, at most `max_wait`
///
/// Returns the number of requests observed. Also returns when the activity
/// stream ends, since the page that produced it is gone.
pub async fn wait_for_network_idle<S>(mut activity: S, quiet: Duration, max_wait: Duration) -> usize
where
    S: Stream<Item = NetworkActivity> + Unpin,
{
    let mut in_flight = HashSet::new();
    let mut observed = 0;
    let cap = tokio::time::sleep(max_wait);
    tokio::pin!(cap);

    loop {
        tokio::select! {
            _ = &mut cap => {
                tracing::warn!(
                    "Network not idle after {} ms ({} requests in flight), printing anyway",
                    max_wait.as_millis(),
                    in_flight.len()
                );
                return observed;
            }
            event = activity.next() => match event {
                Some(NetworkActivity::Started(id)) => {
                    observed += 1;
                    in_flight.insert(id);
                }
                Some(NetworkActivity::Settled(id)) => {
                    in_flight.remove(&id);
                }
                None => return observed,
            },
            _ = tokio::time::sleep(quiet), if in_flight.is_empty() => return observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use futures::channel::mpsc;

    use super::*;

    #[tokio::test]
    async fn test_idle_without_requests() {
        let (_tx, rx) = mpsc::unbounded::<NetworkActivity>();
        let started = Instant::now();

        let observed = wait_for_network_idle(rx, Duration::from_millis(50), Duration::from_secs(5)).await;

        assert_eq!(observed, 0);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_waits_for_in_flight_request() {
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(NetworkActivity::Started("img-1".into())).unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.unbounded_send(NetworkActivity::Settled("img-1".into())).unwrap();
            // keep the stream open until the test is done
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let started = Instant::now();

        let observed = wait_for_network_idle(rx, Duration::from_millis(30), Duration::from_secs(5)).await;

        assert_eq!(observed, 1);
        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_returns_when_page_goes_away() {
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(NetworkActivity::Started("stuck".into())).unwrap();
        drop(tx);

        let observed = wait_for_network_idle(rx, Duration::from_millis(30), Duration::from_secs(5)).await;

        assert_eq!(observed, 1);
    }

    #[tokio::test]
    async fn test_unsettled_request_stops_at_cap() {
        let (tx, rx) = mpsc::unbounded();
        tx.unbounded_send(NetworkActivity::Started("long-poll".into())).unwrap();
        let started = Instant::now();

        let observed = wait_for_network_idle(rx, Duration::from_millis(50), Duration::from_millis(200)).await;

        assert_eq!(observed, 1);
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(tx);
    }
}
