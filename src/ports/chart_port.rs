use crate::domain::error::SigtraderError;
use crate::domain::example_extractor::ChartWindow;

/// Sink for example charts. Returns the artifact's path or identifier.
pub trait ChartPort {
    fn render(&self, window: &ChartWindow) -> Result<String, SigtraderError>;
}
