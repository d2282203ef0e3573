//! Sequential handling of an upstream stream of inputs.

use std::future::Future;
use std::pin::pin;

use tokio_stream::{Stream, StreamExt};

use crate::error::{BoxError, Error};

/// Drive `handle` over every item of `inputs`, in order, one at a time.
///
/// A failing item is reported in its own slot and its siblings are still
/// attempted. An upstream `Err` item becomes
/// [`Error::PublishingFailed`] with no input attached.
pub(crate) async fn handle_each<T, I, O, F, Fut>(
    inputs: impl Stream<Item = Result<T, BoxError>>,
    mut handle: F,
) -> Vec<Result<O, Error<I>>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<O, Error<I>>>,
{
    let mut inputs = pin!(inputs);
    let mut results = Vec::new();
    while let Some(item) = inputs.next().await {
        let result = match item {
            Ok(input) => handle(input).await,
            Err(source) => {
                tracing::debug!(error = %source, "upstream input could not be read");
                Err(Error::PublishingFailed {
                    input: None,
                    source,
                })
            }
        };
        results.push(result);
    }
    results
}
