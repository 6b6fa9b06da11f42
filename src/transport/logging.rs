//! Wraps another transport and logs every outbound and inbound packet at
//! debug level, without altering the exchange's semantics.

use async_trait::async_trait;
use log::debug;

use crate::error::TransportError;
use crate::util::hex::encode_hex;

use super::Transport;

pub struct LoggingTransport<T: Transport> {
    inner: T,
}

impl<T: Transport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        LoggingTransport { inner }
    }
}

#[async_trait]
impl<T: Transport> Transport for LoggingTransport<T> {
    async fn send_and_receive(
        &mut self,
        packet: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        debug!("-> {}", encode_hex(&packet));
        let reply = self.inner.send_and_receive(packet).await?;
        match &reply {
            Some(bytes) => debug!("<- {}", encode_hex(bytes)),
            None => debug!("<- (timeout)"),
        }
        Ok(reply)
    }
}
