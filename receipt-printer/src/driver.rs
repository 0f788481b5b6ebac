//! Transport driver trait

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::registry::Device;
use crate::types::{PrintResult, TransportKind};

/// One driver per transport kind
///
/// Drivers convert their own failures into a failed [`PrintResult`] with a
/// transport-specific message. An `Err` (or a panic) from `send` is treated
/// by the manager as an unclassified failure.
#[async_trait]
pub trait TransportDriver: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether the host exposes this transport at all
    fn is_available(&self) -> bool;

    /// Abort pending work; later sends may fail
    fn shutdown(&self) {}

    /// Best-effort discovery; never fails, degrades to an empty result
    async fn discover(&self) -> Vec<Device> {
        Vec::new()
    }

    /// Push `content` through the transport
    ///
    /// `target` is the selected device, when the caller has one that
    /// matches this transport.
    async fn send(&self, target: Option<&mut Device>, content: &str)
    -> TransportResult<PrintResult>;
}
