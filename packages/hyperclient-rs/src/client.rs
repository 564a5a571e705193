//! Client entry point
//!
//! [`HyperClient`] owns the readers for the source, destination and hub
//! chains and exposes the status, timeout and subscription engines over them.
//! It is cheap to clone; clones share readers.

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::chain::{ChainReader, EvmHostReader, HubReader};
use crate::config::ClientConfig;
use crate::error::TrackerError;
use crate::indexer::{EventHistory, IndexerClient};
use crate::retry::RetryConfig;
use crate::route::Route;
use crate::status::query_status;
use crate::subscription::{subscribe, StatusStream};
use crate::timeout::timeout_stream;
use crate::types::{Message, MessageStatus, PostRequest, PostResponse, TimeoutStatus};

/// Polling and retry behaviour shared by every engine
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Delay between polls in streams
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Clone)]
pub struct HyperClient {
    config: ClientConfig,
    source: Arc<dyn ChainReader>,
    dest: Arc<dyn ChainReader>,
    hyperbridge: Arc<dyn ChainReader>,
    indexer: Option<Arc<dyn EventHistory>>,
    settings: TrackerSettings,
}

impl HyperClient {
    /// Build a client with network readers for every configured chain
    pub fn connect(config: ClientConfig) -> Result<Self, TrackerError> {
        config.validate()?;

        let source: Arc<dyn ChainReader> = Arc::new(EvmHostReader::new(&config.source)?);
        let dest: Arc<dyn ChainReader> = Arc::new(EvmHostReader::new(&config.dest)?);
        let hyperbridge: Arc<dyn ChainReader> = Arc::new(HubReader::new(&config.hyperbridge)?);
        let indexer = config
            .indexer_url
            .clone()
            .map(|url| Arc::new(IndexerClient::new(url)) as Arc<dyn EventHistory>);

        info!(
            source = %config.source.state_machine_id,
            dest = %config.dest.state_machine_id,
            hyperbridge = %config.hyperbridge.state_machine_id,
            indexer = indexer.is_some(),
            "Connected hyperclient"
        );

        Ok(Self {
            config,
            source,
            dest,
            hyperbridge,
            indexer,
            settings: TrackerSettings::default(),
        })
    }

    /// Build a client over caller-supplied readers
    pub fn with_readers(
        config: ClientConfig,
        source: Arc<dyn ChainReader>,
        dest: Arc<dyn ChainReader>,
        hyperbridge: Arc<dyn ChainReader>,
    ) -> Result<Self, TrackerError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            dest,
            hyperbridge,
            indexer: None,
            settings: TrackerSettings::default(),
        })
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn EventHistory>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn with_settings(mut self, settings: TrackerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Bind `message` to the chains it travels over
    ///
    /// Fails with `MalformedMessage` if its endpoints are not the configured
    /// source and destination.
    pub fn route(&self, message: &Message) -> Result<Route, TrackerError> {
        message.validate()?;

        let (origin, target, origin_config, target_config) = if message.is_response() {
            (&self.dest, &self.source, &self.config.dest, &self.config.source)
        } else {
            (&self.source, &self.dest, &self.config.source, &self.config.dest)
        };

        if message.origin() != origin_config.state_machine_id {
            return Err(TrackerError::MalformedMessage(format!(
                "message leaves {} but this client tracks {}",
                message.origin(),
                origin_config.state_machine_id
            )));
        }
        if message.target() != target_config.state_machine_id {
            return Err(TrackerError::MalformedMessage(format!(
                "message is bound for {} but this client tracks {}",
                message.target(),
                target_config.state_machine_id
            )));
        }

        Ok(Route {
            origin: origin.clone(),
            target: target.clone(),
            hub: self.hyperbridge.clone(),
            origin_config: origin_config.clone(),
            target_config: target_config.clone(),
            hub_config: self.config.hyperbridge.clone(),
            retry: self.settings.retry.clone(),
        })
    }

    /// Current status of either message kind
    pub async fn query_status(&self, message: &Message) -> Result<MessageStatus, TrackerError> {
        let route = self.route(message)?;
        query_status(&route, self.indexer.as_deref(), message, message.height()).await
    }

    pub async fn query_request_status(
        &self,
        request: &PostRequest,
    ) -> Result<MessageStatus, TrackerError> {
        self.query_status(&Message::Request(request.clone())).await
    }

    pub async fn query_response_status(
        &self,
        response: &PostResponse,
    ) -> Result<MessageStatus, TrackerError> {
        self.query_status(&Message::Response(response.clone()))
            .await
    }

    /// Stream the steps towards a relayable timeout for `request`
    ///
    /// Meant for requests already reported as `Timeout`. Called earlier it
    /// yields `Pending` and waits for the chains to catch up.
    pub fn timeout_post_request(
        &self,
        request: PostRequest,
    ) -> Result<impl Stream<Item = TimeoutStatus> + Send + 'static, TrackerError> {
        let route = self.route(&Message::Request(request.clone()))?;
        Ok(timeout_stream(route, request, self.settings.poll_interval))
    }

    /// Timeout stream for a message of unknown kind; responses are rejected
    pub fn timeout(
        &self,
        message: Message,
    ) -> Result<impl Stream<Item = TimeoutStatus> + Send + 'static, TrackerError> {
        match message {
            Message::Request(request) => self.timeout_post_request(request),
            Message::Response(_) => Err(TrackerError::MalformedMessage(
                "timeouts are only produced for requests".to_string(),
            )),
        }
    }

    /// Follow a request until it is delivered or times out
    ///
    /// `post_request_height` is the source height the request was emitted at
    /// and replaces `request.height`.
    pub fn subscribe_to_request_status(
        &self,
        request: PostRequest,
        post_request_height: u64,
    ) -> Result<StatusStream, TrackerError> {
        self.subscribe(Message::Request(request), post_request_height)
    }

    /// Follow a response until it is delivered or times out
    pub fn subscribe_to_response_status(
        &self,
        response: PostResponse,
        height: u64,
    ) -> Result<StatusStream, TrackerError> {
        self.subscribe(Message::Response(response), height)
    }

    /// Subscription for a message of either kind
    pub fn subscribe(&self, message: Message, height: u64) -> Result<StatusStream, TrackerError> {
        let route = self.route(&message)?;
        Ok(subscribe(
            route,
            self.indexer.clone(),
            message,
            height,
            self.settings.poll_interval,
        ))
    }
}
