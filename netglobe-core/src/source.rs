//! Packet sources feeding the flow pipeline.

use crate::error::CaptureError;
use crate::events::TransportRecord;

/// Blocking producer of decoded transport records.
///
/// `Ok(None)` means the source is exhausted. Sources that time out
/// internally keep waiting and never yield `None` for a quiet interval.
pub trait PacketSource: Send {
    fn next_record(&mut self) -> Result<Option<TransportRecord>, CaptureError>;
}

/// Replays a fixed sequence of records.
pub struct ReplaySource<I> {
    records: I,
}

impl<I> ReplaySource<I>
where
    I: Iterator<Item = TransportRecord> + Send,
{
    pub fn new(records: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            records: records.into_iter(),
        }
    }
}

impl<I> PacketSource for ReplaySource<I>
where
    I: Iterator<Item = TransportRecord> + Send,
{
    fn next_record(&mut self) -> Result<Option<TransportRecord>, CaptureError> {
        Ok(self.records.next())
    }
}
