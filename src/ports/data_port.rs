//! Series source port.

use async_trait::async_trait;

use crate::domain::cancel::CancelToken;
use crate::domain::error::SigtraderError;
use crate::domain::fetch::FetchRequest;
use crate::domain::ohlcv::Series;

/// Anything that can resolve a [`FetchRequest`] into bars.
///
/// An empty series is a valid answer from an individual source. A source
/// that cannot serve the request at all returns
/// [`SigtraderError::UpstreamUnavailable`].
#[async_trait]
pub trait DataPort: Send + Sync {
    async fn fetch_series(
        &self,
        request: &FetchRequest,
        cancel: &CancelToken,
    ) -> Result<Series, SigtraderError>;
}
