//! Wait for a group of independent tasks regardless of how each one ends.

use futures::future::join_all;
use std::future::Future;

/// How one settled task ended
#[derive(Debug)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
    /// The task panicked or was aborted
    Aborted(String),
}

/// Counts of a settled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettleSummary {
    pub fulfilled: usize,
    pub rejected: usize,
    pub aborted: usize,
}

impl SettleSummary {
    pub fn of<T, E>(outcomes: &[Settled<T, E>]) -> Self {
        let mut summary = SettleSummary::default();
        for outcome in outcomes {
            match outcome {
                Settled::Fulfilled(_) => summary.fulfilled += 1,
                Settled::Rejected(_) => summary.rejected += 1,
                Settled::Aborted(_) => summary.aborted += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.fulfilled + self.rejected + self.aborted
    }
}

/// Run every task on its own tokio task and wait for all of them.
///
/// A failing or panicking task never cancels its siblings; outcomes are returned
/// in the order the tasks were given.
pub async fn settle_all<I, F, T, E>(tasks: I) -> Vec<Settled<T, E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let handles: Vec<_> = tasks.into_iter().map(tokio::spawn).collect();

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| match joined {
            Ok(Ok(value)) => Settled::Fulfilled(value),
            Ok(Err(e)) => Settled::Rejected(e),
            Err(e) => Settled::Aborted(e.to_string()),
        })
        .collect()
}
