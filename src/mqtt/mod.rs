pub mod ha_interface;

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use crate::config::{Config, ConfigError};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{Receiver, Sender};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;

const ERROR_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PublishData {
    pub topic: String,
    pub payload: String,
    pub qos: u8,
    pub retain: bool,
}

pub struct SubscribeData {
    pub topic: String,
    pub sender: Sender<Vec<u8>>,
}

pub enum Transmission {
    Subscribe(SubscribeData),
    Publish(PublishData),
}

/// MQTT topic filter matching with `+` and `#` wildcards.
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');

    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => continue,
            (Some(f), Some(t)) if f == t => continue,
            (None, None) => return true,
            _ => return false,
        }
    }
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Subscribers keyed by the topic filter they registered.
#[derive(Default)]
pub struct Callbacks {
    calls: HashMap<String, Vec<Sender<Vec<u8>>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Callbacks { calls: HashMap::new() }
    }

    pub fn insert(&mut self, topic: String, callback: Sender<Vec<u8>>) {
        debug!("Adding callback for topic {topic}");
        self.calls.entry(topic).or_default().push(callback);
    }

    /// Subscribers whose filter matches the topic, cloned so the payload can
    /// be delivered without holding the lock.
    pub fn matching(&self, topic: &str) -> Vec<(String, Sender<Vec<u8>>)> {
        self.calls.iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .flat_map(|(filter, senders)| senders.iter().map(move |s| (filter.clone(), s.clone())))
            .collect()
    }

    pub fn get_topics(&self) -> Vec<String> {
        self.calls.keys().cloned().collect()
    }
}

/// Hands the payload to every subscriber. Returns how many received it.
pub async fn deliver(targets: Vec<(String, Sender<Vec<u8>>)>, topic: &str, payload: &[u8]) -> usize {
    let mut delivered = 0;

    for (filter, call) in targets {
        match call.send(payload.to_vec()).await {
            Ok(_) => delivered += 1,
            Err(_) => warn!("Subscriber for {filter} is gone, dropping payload"),
        }
    }

    if delivered == 0 {
        debug!("Send for unknown topic {topic}");
    }
    delivered
}

pub struct MqttManager {
    rx: Receiver<Transmission>,
    exit_thread: bool,
    client: AsyncClient,
    callbacks: Arc<RwLock<Callbacks>>,
}

impl MqttManager {
    /// Connects to the broker named in the config and starts the event loop.
    /// Must be called inside a tokio runtime.
    pub fn new(config: &Config) -> Result<(Self, Sender<Transmission>), ConfigError> {
        let (mtx, mrx) = tokio::sync::mpsc::channel(100);

        let (host, port) = config.broker_address()?;
        let client_id = config.client_id();
        info!("MQTT connection to {host}:{port} starting up as {client_id}");

        let mut mqttoptions = MqttOptions::new(client_id, host, port);
        mqttoptions.set_keep_alive(Duration::from_secs(config.mqtt.keep_alive));
        if let Some(user) = &config.mqtt.user {
            mqttoptions.set_credentials(user.clone(), config.mqtt.pass.clone().unwrap_or_default());
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 10);
        let callbacks = Arc::new(RwLock::new(Callbacks::new()));

        let reconnect_c = client.clone();
        let loop_callbacks = callbacks.clone();
        tokio::spawn(async move {
            info!("MQTT Eventloop started");
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        debug!("Received {} bytes on {}", p.payload.len(), p.topic);
                        let targets = loop_callbacks.read().await.matching(&p.topic);
                        deliver(targets, &p.topic, &p.payload).await;
                    },
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("Connected, resubscribing everything");

                        let topics = loop_callbacks.read().await.get_topics();
                        for topic in topics {
                            let client_clone = reconnect_c.clone();
                            tokio::spawn(async move {
                                if let Err(e) = client_clone.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                                    error!("Resubscribing {topic} failed: {e}");
                                }
                            });
                        }
                    },
                    Ok(_) => {},
                    Err(e) => {
                        error!("Error in MQTT {:?}, reconnecting ", e);
                        tokio::time::sleep(ERROR_RETRY_DELAY).await;
                    }
                }
            }
        });

        Ok((MqttManager {
            client,
            rx: mrx,
            exit_thread: false,
            callbacks,
        }, mtx))
    }

    pub async fn start_thread(&mut self) {
        while !self.exit_thread {
            let transmission = match self.rx.recv().await {
                Some(t) => t,
                None => {
                    debug!("Reading returned none, we exit now");
                    self.exit_thread = true;
                    continue;
                }
            };

            match transmission {
                Transmission::Subscribe(subscribe_data) => {
                    let topic = subscribe_data.topic;
                    // Registered first so a ConnAck racing this call resubscribes it
                    self.callbacks.write().await.insert(topic.clone(), subscribe_data.sender);
                    match self.client.subscribe(topic.clone(), QoS::AtLeastOnce).await {
                        Ok(_) => info!("Registered Callback {topic}"),
                        Err(e) => error!("Subscribing {topic} failed: {e}"),
                    }
                },
                Transmission::Publish(publish_data) => {
                    match self.client.publish(
                        publish_data.topic,
                        to_qos(publish_data.qos),
                        publish_data.retain,
                        publish_data.payload
                    ).await {
                        Err(e) => { error!("Error publishing: {}", e); },
                        Ok(_) => { debug!("Published successfully"); }
                    }
                },
            };
        }

        info!("MQTT thread exit");
    }
}
