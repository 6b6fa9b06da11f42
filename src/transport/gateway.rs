//! Gateway client: maps `Transport::send_and_receive` onto a JSON RPC
//! exchange with an external Z-Wave gateway process, carried over an MQTT
//! broker. Two RPC kinds share the connection (`sendCommand` to move
//! packet bytes, `driverFunction` to read node info); each gets its own
//! single-slot pending-resolver, filled by the subscription-dispatch task
//! and drained by the call that's waiting on it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex};

use crate::error::TransportError;

use super::Transport;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
const COMMAND_CLASS_MANUFACTURER_PROPRIETARY: u32 = 145;
const ZWAVE_CLASSIC_MANUFACTURER_ID: u32 = 0x0005;

/// Manufacturer/product identity and firmware version reported by a node,
/// as read back through a `driverFunction` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub manufacturer_id: u16,
    pub product_type: u16,
    pub product_id: u16,
    pub firmware_version: String,
}

#[derive(Default)]
struct PendingSlots {
    send_command: Option<oneshot::Sender<Value>>,
    driver_function: Option<oneshot::Sender<Value>>,
}

/// Identifies which `PendingSlots` field an in-flight call is waiting on, so
/// a timed-out call can clear its own slot rather than leaving a stale
/// sender for a late reply to complete.
#[derive(Clone, Copy)]
enum RpcKind {
    SendCommand,
    DriverFunction,
}

/// A connected gateway client. One instance owns the MQTT session and the
/// background task that dispatches incoming responses to whichever call is
/// currently waiting.
pub struct GatewayClient {
    client: AsyncClient,
    api_root: String,
    node_id: u32,
    pending: Arc<Mutex<PendingSlots>>,
    dispatch_task: tokio::task::JoinHandle<()>,
}

impl GatewayClient {
    /// Connects to `mqtt_url` and subscribes to the response topics under
    /// `api_root`. `node_id` is the Z-Wave node this client will address
    /// for every `sendCommand` exchange; the returned client is ready for
    /// `send_and_receive` and `get_node_info` calls.
    pub async fn connect(
        mqtt_url: &str,
        api_root: &str,
        node_id: u32,
    ) -> Result<Self, TransportError> {
        let options = MqttOptions::parse_url(mqtt_url.to_string())
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        let (client, mut event_loop) = AsyncClient::new(options, 16);

        let send_command_topic = format!("{api_root}/sendCommand");
        let driver_function_topic = format!("{api_root}/driverFunction");

        client
            .subscribe(&send_command_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))?;
        client
            .subscribe(&driver_function_topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))?;

        let pending = Arc::new(Mutex::new(PendingSlots::default()));
        let dispatch_pending = pending.clone();

        let dispatch_task = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Ok(value) = serde_json::from_slice::<Value>(&publish.payload) else {
                            continue;
                        };
                        let mut slots = dispatch_pending.lock().await;
                        if publish.topic == send_command_topic {
                            if let Some(tx) = slots.send_command.take() {
                                let _ = tx.send(value);
                            }
                        } else if publish.topic == driver_function_topic {
                            if let Some(tx) = slots.driver_function.take() {
                                let _ = tx.send(value);
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        });

        Ok(GatewayClient {
            client,
            api_root: api_root.to_string(),
            node_id,
            pending,
            dispatch_task,
        })
    }

    /// Reads a node's manufacturer/product identity and firmware version
    /// via a `driverFunction` call.
    pub async fn get_node_info(&self, node_id: u32) -> Result<NodeInfo, TransportError> {
        let code = format!(
            "(() => {{ const n = driver.controller.nodes.get({node_id}); \
             return {{ manufacturerId: n.manufacturerId, productType: n.productType, \
             productId: n.productId, firmwareVersion: n.firmwareVersion }}; }})()"
        );

        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.pending.lock().await;
            slots.driver_function = Some(tx);
        }

        let body = json!({ "args": [code.clone()] });
        let topic = format!("{}/driverFunction/set", self.api_root);
        self.publish(&topic, &body).await?;

        let response = match self.await_response(rx, RpcKind::DriverFunction).await? {
            Some(value) => value,
            None => {
                return Err(TransportError::Broker(
                    "driverFunction call timed out".to_string(),
                ))
            }
        };

        let echoed = response
            .get("args")
            .and_then(|a| a.get(0))
            .and_then(Value::as_str);
        if echoed != Some(code.as_str()) {
            return Err(TransportError::MalformedResponse(
                "driverFunction response did not echo the submitted code".to_string(),
            ));
        }
        if response.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(TransportError::RpcFailed {
                method: "driverFunction".to_string(),
                detail: response.to_string(),
            });
        }

        let result = response.get("result").ok_or_else(|| {
            TransportError::MalformedResponse("driverFunction response had no result".to_string())
        })?;

        parse_node_info(result)
    }

    async fn publish(&self, topic: &str, body: &Value) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Broker(e.to_string()))
    }

    /// Awaits `rx` up to [`EXCHANGE_TIMEOUT`]. On timeout, clears `kind`'s
    /// slot in `self.pending` so a reply that arrives after this call has
    /// given up finds no waiter and is dropped by the dispatch task, rather
    /// than being delivered to whatever call occupies the slot next.
    async fn await_response(
        &self,
        rx: oneshot::Receiver<Value>,
        kind: RpcKind,
    ) -> Result<Option<Value>, TransportError> {
        match tokio::time::timeout(EXCHANGE_TIMEOUT, rx).await {
            Ok(Ok(value)) => Ok(Some(value)),
            Ok(Err(_)) => Err(TransportError::Broker(
                "response channel closed before a reply arrived".to_string(),
            )),
            Err(_) => {
                let mut slots = self.pending.lock().await;
                match kind {
                    RpcKind::SendCommand => slots.send_command = None,
                    RpcKind::DriverFunction => slots.driver_function = None,
                }
                Ok(None)
            }
        }
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.dispatch_task.abort();
    }
}

fn parse_node_info(result: &Value) -> Result<NodeInfo, TransportError> {
    let field = |name: &str| -> Result<u64, TransportError> {
        result
            .get(name)
            .and_then(Value::as_u64)
            .ok_or_else(|| TransportError::MalformedResponse(format!("missing field {name}")))
    };

    Ok(NodeInfo {
        manufacturer_id: field("manufacturerId")? as u16,
        product_type: field("productType")? as u16,
        product_id: field("productId")? as u16,
        firmware_version: result
            .get("firmwareVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
    })
}

#[async_trait]
impl Transport for GatewayClient {
    async fn send_and_receive(
        &mut self,
        packet: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        const METHOD: &str = "sendAndReceiveData";
        let node_id = self.node_id;
        let (tx, rx) = oneshot::channel();
        {
            let mut slots = self.pending.lock().await;
            slots.send_command = Some(tx);
        }

        let body = json!({
            "args": [
                {
                    "nodeId": node_id,
                    "endpoint": 0,
                    "commandClass": COMMAND_CLASS_MANUFACTURER_PROPRIETARY,
                },
                METHOD,
                [ZWAVE_CLASSIC_MANUFACTURER_ID, { "type": "Buffer", "data": packet }],
            ]
        });
        let topic = format!("{}/sendCommand/set", self.api_root);
        self.publish(&topic, &body).await?;

        let response = match self.await_response(rx, RpcKind::SendCommand).await? {
            Some(value) => value,
            None => return Ok(None),
        };

        let node_args = response.get("args").and_then(|a| a.get(0));
        let echoed_node_id = node_args.and_then(|a| a.get("nodeId")).and_then(Value::as_u64);
        let echoed_endpoint = node_args.and_then(|a| a.get("endpoint")).and_then(Value::as_u64);
        let echoed_command_class = node_args
            .and_then(|a| a.get("commandClass"))
            .and_then(Value::as_u64);
        let echoed_method = response.get("args").and_then(|a| a.get(1)).and_then(Value::as_str);

        let envelope_matches = echoed_node_id == Some(node_id as u64)
            && echoed_endpoint == Some(0)
            && echoed_command_class == Some(COMMAND_CLASS_MANUFACTURER_PROPRIETARY as u64)
            && echoed_method == Some(METHOD);
        if !envelope_matches {
            return Err(TransportError::MalformedResponse(
                "sendCommand response did not echo the request envelope".to_string(),
            ));
        }

        if response.get("success").and_then(Value::as_bool) != Some(true) {
            return Err(TransportError::RpcFailed {
                method: "sendCommand".to_string(),
                detail: response.to_string(),
            });
        }

        let bytes = response
            .get("result")
            .and_then(|r| r.get("data"))
            .and_then(|d| d.get("data"))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                TransportError::MalformedResponse(
                    "sendCommand response missing result.data.data".to_string(),
                )
            })?;

        let bytes: Result<Vec<u8>, TransportError> = bytes
            .iter()
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| {
                        TransportError::MalformedResponse(
                            "sendCommand response.data.data had a non-byte element".to_string(),
                        )
                    })
            })
            .collect();

        Ok(Some(bytes?))
    }
}
