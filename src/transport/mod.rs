//! Transport abstraction: one operation, `send_and_receive`, with three
//! implementations behind it (gateway, fake, logging). The upload engine
//! is written against the trait and never knows which one it's driving.

pub mod fake;
pub mod gateway;
pub mod logging;

use async_trait::async_trait;

use crate::error::TransportError;

/// Sends a packet and returns the next reply, or `Ok(None)` if the
/// implementation's timeout window elapses with no response.
///
/// One call always resolves to exactly one outcome (a reply or a timeout);
/// implementations must not return more than one reply per call.
#[async_trait]
pub trait Transport: Send {
    async fn send_and_receive(&mut self, packet: Vec<u8>) -> Result<Option<Vec<u8>>, TransportError>;
}
