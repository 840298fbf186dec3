//! Broker subscriptions for stations that publish their state over MQTT

use crate::config::MqttConfig;
use crate::error::{Result, SevcError};
use crate::logging::StructuredLogger;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 16;

/// Something that happened on a live subscription
#[derive(Debug, Clone, PartialEq)]
pub enum TopicEvent {
    Message { topic: String, payload: Vec<u8> },
    /// The connection is gone; the session must be dropped
    Disconnected(String),
}

/// A live subscription
#[async_trait::async_trait]
pub trait TopicSession: Send {
    /// Wait for the next message or for the connection to drop
    async fn next_event(&mut self) -> TopicEvent;

    /// Tear the connection down
    async fn close(&mut self);
}

/// Opens subscriptions on a broker
#[async_trait::async_trait]
pub trait TopicSubscriber: Send + Sync {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn TopicSession>>;
}

/// [`TopicSubscriber`] on top of rumqttc
pub struct MqttSubscriber {
    config: MqttConfig,
    logger: StructuredLogger,
}

impl MqttSubscriber {
    pub fn new(config: MqttConfig, logger: StructuredLogger) -> Self {
        Self { config, logger }
    }

    fn options(&self) -> MqttOptions {
        let client_id = if self.config.client_id.is_empty() {
            format!("sevc-{}", uuid::Uuid::new_v4().simple())
        } else {
            self.config.client_id.clone()
        };
        let mut options = MqttOptions::new(client_id, self.config.host.clone(), self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        if let Some(username) = &self.config.username {
            options.set_credentials(
                username.clone(),
                self.config.password.clone().unwrap_or_default(),
            );
        }
        options
    }

    async fn await_connack(eventloop: &mut EventLoop) -> Result<()> {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        return Ok(());
                    }
                    return Err(SevcError::mqtt(format!(
                        "broker refused connection: {:?}",
                        ack.code
                    )));
                }
                Ok(_) => continue,
                Err(e) => return Err(SevcError::mqtt(format!("connecting: {}", e))),
            }
        }
    }
}

#[async_trait::async_trait]
impl TopicSubscriber for MqttSubscriber {
    async fn subscribe(&self, topic: &str) -> Result<Box<dyn TopicSession>> {
        let broker = format!("{}:{}", self.config.host, self.config.port);
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        tokio::time::timeout(CONNECT_TIMEOUT, Self::await_connack(&mut eventloop))
            .await
            .map_err(|_| SevcError::timeout(format!("connecting to {}", broker)))??;
        self.logger.info(&format!("Connected to {}", broker));

        client.subscribe(topic, QoS::AtLeastOnce).await?;
        self.logger.info(&format!("Subscribing to {}", topic));

        Ok(Box::new(RumqttSession {
            client,
            eventloop,
            logger: self.logger.clone(),
        }))
    }
}

struct RumqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    logger: StructuredLogger,
}

#[async_trait::async_trait]
impl TopicSession for RumqttSession {
    async fn next_event(&mut self) -> TopicEvent {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return TopicEvent::Message {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    };
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|c| matches!(c, rumqttc::SubscribeReasonCode::Failure))
                    {
                        return TopicEvent::Disconnected("subscription refused".to_string());
                    }
                    self.logger.debug("Subscription acknowledged");
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return TopicEvent::Disconnected("broker sent disconnect".to_string());
                }
                Ok(_) => continue,
                Err(e) => return TopicEvent::Disconnected(e.to_string()),
            }
        }
    }

    async fn close(&mut self) {
        if self.client.disconnect().await.is_ok() {
            // Let the event loop flush the DISCONNECT packet
            let _ = tokio::time::timeout(Duration::from_secs(1), self.eventloop.poll()).await;
        }
        self.logger.debug("MQTT session closed");
    }
}
