//! Saga manager: reacts to action results and publishes the derived actions.

use tokio_stream::Stream;
use tracing::{debug, instrument};

use crate::batch;
use crate::error::{BoxError, Error};
use crate::repository::ActionPublisher;
use crate::saga::Saga;

/// Pairs a [`Saga`] with an [`ActionPublisher`].
///
/// Typically fed the events of one aggregate, publishing commands meant for
/// another.
pub struct SagaManager<'a, AR, A, P> {
    publisher: P,
    saga: Saga<'a, AR, A>,
}

impl<'a, AR, A, P> SagaManager<'a, AR, A, P>
where
    P: ActionPublisher<A>,
    AR: Clone + 'a,
    A: 'a,
{
    /// Create a manager that publishes what `saga` derives through `publisher`.
    pub fn new(publisher: P, saga: Saga<'a, AR, A>) -> Self {
        Self { publisher, saga }
    }

    /// The publisher derived actions are sent to.
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// React to `action_result` and publish every derived action.
    ///
    /// An action result that derives nothing still goes through the
    /// publisher, with an empty slice.
    ///
    /// # Errors
    ///
    /// [`Error::PublishingFailed`] carrying `action_result`.
    #[instrument(name = "handle", level = "debug", skip_all)]
    pub async fn handle(&self, action_result: &AR) -> Result<Vec<A>, Error<AR>> {
        let actions = self.saga.react(action_result);
        let published = self.publisher.publish(&actions).await.map_err(|source| {
            Error::PublishingFailed {
                input: Some(action_result.clone()),
                source: source.into(),
            }
        })?;
        debug!(published = published.len(), "actions published");
        Ok(published)
    }

    /// Handle every action result of `action_results` in order.
    ///
    /// A failed publish does not stop the batch.
    pub async fn handle_all(
        &self,
        action_results: impl Stream<Item = Result<AR, BoxError>>,
    ) -> Vec<Result<Vec<A>, Error<AR>>> {
        batch::handle_each(action_results, |action_result| async move {
            self.handle(&action_result).await
        })
        .await
    }
}
