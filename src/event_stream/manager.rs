use std::{collections::HashMap, sync::Arc};

use alloy::network::{Ethereum, Network};
use tokio::{
    sync::{Mutex, RwLock},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{
    StreamError,
    checkpoint::{self, CheckpointStore, SubscriptionCheckpoint},
    event_stream::{
        stream::EventStream,
        subscription::{Subscription, SubscriptionInfo, SubscriptionRequest, SubscriptionStatus},
    },
    node_client::NodeClient,
};

struct SubscriptionEntry<N: Network> {
    stream_id: String,
    subscription: Arc<Mutex<Subscription<N>>>,
}

/// Registry and orchestrator for event streams and their subscriptions.
///
/// [`StreamManager::start`] spawns one polling driver per registered stream.
/// Within one driver tick, the stream's subscriptions are polled
/// sequentially (the subscription state is not designed for concurrent
/// mutation) while independent streams run on independent, concurrently
/// scheduled drivers. Register all streams before calling `start`;
/// subscriptions can be added and removed at any time.
pub struct StreamManager<N: Network = Ethereum> {
    node: NodeClient<N>,
    checkpoints: Arc<dyn CheckpointStore>,
    streams: RwLock<HashMap<String, Arc<EventStream>>>,
    subscriptions: RwLock<HashMap<String, SubscriptionEntry<N>>>,
}

impl<N: Network> StreamManager<N> {
    #[must_use]
    pub fn new(node: NodeClient<N>, checkpoints: Arc<dyn CheckpointStore>) -> Self {
        Self {
            node,
            checkpoints,
            streams: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a stream destination.
    ///
    /// # Errors
    ///
    /// [`StreamError::DuplicateStream`] when the id is already taken.
    pub async fn add_stream(&self, stream: EventStream) -> Result<Arc<EventStream>, StreamError> {
        let mut streams = self.streams.write().await;
        let id = stream.spec().id.clone();
        if streams.contains_key(&id) {
            return Err(StreamError::DuplicateStream(id));
        }
        let stream = Arc::new(stream);
        streams.insert(id, Arc::clone(&stream));
        Ok(stream)
    }

    /// Look up a registered stream.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownStream`] when no stream has this id.
    pub async fn stream_by_id(&self, id: &str) -> Result<Arc<EventStream>, StreamError> {
        let streams = self.streams.read().await;
        streams.get(id).cloned().ok_or_else(|| StreamError::UnknownStream(id.to_string()))
    }

    /// Create, persist, and register a new subscription.
    ///
    /// The high-water-mark is seeded from the starting-block directive and
    /// the first filter installation is attempted immediately; an install
    /// failure is not fatal, the subscription just starts stale and the
    /// poller retries on its next cycle.
    ///
    /// # Errors
    ///
    /// Validation failures (unknown stream, duplicate or missing id,
    /// unnamed event, unparseable starting block) are fatal and no
    /// subscription is created.
    pub async fn subscribe(&self, request: SubscriptionRequest) -> Result<String, StreamError> {
        let stream = self.stream_by_id(&request.stream).await?;
        {
            let registry = self.subscriptions.read().await;
            if registry.contains_key(&request.id) {
                return Err(StreamError::DuplicateSubscription(request.id));
            }
        }

        let mut subscription = Subscription::create(
            stream,
            self.node.clone(),
            Arc::clone(&self.checkpoints),
            request,
        )?;
        let from_block = subscription.initial_block_height().await?;
        if let Err(err) = subscription.install_filter(from_block).await {
            warn!(
                subscription = %subscription.info().id,
                error = %err,
                "Initial filter install failed, retrying on next poll cycle"
            );
        }
        self.persist_info(subscription.info())?;

        let id = subscription.info().id.clone();
        let stream_id = subscription.info().stream.clone();
        self.subscriptions.write().await.insert(
            id.clone(),
            SubscriptionEntry { stream_id, subscription: Arc::new(Mutex::new(subscription)) },
        );
        Ok(id)
    }

    /// Rehydrate every persisted subscription record from the checkpoint
    /// store, seeding each high-water-mark from its checkpoint (or from the
    /// starting-block directive when no checkpoint exists). Returns the
    /// number restored.
    ///
    /// Unreadable or unrestorable records are logged and skipped so one bad
    /// record cannot block boot; re-run after fixing the underlying issue.
    ///
    /// # Errors
    ///
    /// Only checkpoint-store failures abort the restore.
    pub async fn restore_all(&self) -> Result<usize, StreamError> {
        let mut restored = 0;
        for (key, value) in self.checkpoints.entries()? {
            let Some(id) = key.strip_prefix(checkpoint::SUBSCRIPTION_KEY_PREFIX) else { continue };

            let info: SubscriptionInfo = match serde_json::from_slice(&value) {
                Ok(info) => info,
                Err(err) => {
                    error!(subscription = %id, error = %err, "Skipping unreadable subscription record");
                    continue;
                }
            };
            let stream = match self.stream_by_id(&info.stream).await {
                Ok(stream) => stream,
                Err(err) => {
                    error!(subscription = %id, error = %err, "Skipping subscription for unknown stream");
                    continue;
                }
            };
            let mut subscription = match Subscription::restore(
                stream,
                self.node.clone(),
                Arc::clone(&self.checkpoints),
                info,
            ) {
                Ok(subscription) => subscription,
                Err(err) => {
                    error!(subscription = %id, error = %err, "Skipping unrestorable subscription");
                    continue;
                }
            };

            match self.read_checkpoint(id)? {
                Some(cp) => subscription.set_checkpoint_block_height(cp.hwm),
                None => {
                    if let Err(err) = subscription.initial_block_height().await {
                        error!(
                            subscription = %id,
                            error = %err,
                            "Skipping subscription, could not seed starting block"
                        );
                        continue;
                    }
                }
            }

            let sub_id = subscription.info().id.clone();
            let stream_id = subscription.info().stream.clone();
            self.subscriptions.write().await.insert(
                sub_id,
                SubscriptionEntry { stream_id, subscription: Arc::new(Mutex::new(subscription)) },
            );
            restored += 1;
        }
        Ok(restored)
    }

    /// Tear down a subscription: uninstall its filter and remove its
    /// persisted record and checkpoint.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownSubscription`]; store failures.
    pub async fn unsubscribe(&self, id: &str) -> Result<(), StreamError> {
        let entry = self
            .subscriptions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| StreamError::UnknownSubscription(id.to_string()))?;
        entry.subscription.lock().await.unsubscribe(true).await;
        self.checkpoints.delete(&checkpoint::subscription_key(id))?;
        self.checkpoints.delete(&checkpoint::checkpoint_key(id))?;
        Ok(())
    }

    /// Request that a subscription restart from its starting-block directive
    /// on the next poll cycle, discarding its high-water-mark. Optionally
    /// replaces the directive first.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownSubscription`]; store failures when persisting
    /// a replaced directive.
    pub async fn reset_subscription(
        &self,
        id: &str,
        from_block: Option<String>,
    ) -> Result<(), StreamError> {
        let subscription = self.subscription_by_id(id).await?;
        let mut subscription = subscription.lock().await;
        if from_block.is_some() {
            subscription.set_from_block(from_block);
            self.persist_info(subscription.info())?;
        }
        subscription.request_reset();
        Ok(())
    }

    /// Point-in-time status of one subscription.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownSubscription`].
    pub async fn subscription_status(&self, id: &str) -> Result<SubscriptionStatus, StreamError> {
        let subscription = self.subscription_by_id(id).await?;
        let subscription = subscription.lock().await;
        Ok(subscription.status())
    }

    /// Identifiers of all registered subscriptions, sorted.
    pub async fn subscription_ids(&self) -> Vec<String> {
        let registry = self.subscriptions.read().await;
        let mut ids: Vec<String> = registry.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one poll cycle for every subscription of `stream_id`, in the same
    /// way the background driver does each tick.
    ///
    /// # Errors
    ///
    /// [`StreamError::UnknownStream`]. Per-subscription poll failures are
    /// logged, not returned.
    pub async fn run_stream_cycle(&self, stream_id: &str) -> Result<(), StreamError> {
        let stream = self.stream_by_id(stream_id).await?;
        self.poll_stream_once(&stream).await;
        Ok(())
    }

    /// Spawn one fixed-interval polling driver per registered stream.
    ///
    /// The drivers run until the returned handle is shut down; no poll-cycle
    /// error stops them. Aborting a driver cancels its in-flight RPC call
    /// and the remainder of that tick; the interrupted subscription resumes
    /// from its checkpoint on the next start.
    pub async fn start(self: &Arc<Self>) -> StreamPollerHandle {
        let streams: Vec<Arc<EventStream>> = self.streams.read().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(streams.len());
        for stream in streams {
            let manager = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(stream.spec().poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                info!(stream = %stream.spec().id, "Starting event stream poller");
                loop {
                    ticker.tick().await;
                    manager.poll_stream_once(&stream).await;
                }
            }));
        }
        StreamPollerHandle { tasks }
    }

    async fn poll_stream_once(&self, stream: &Arc<EventStream>) {
        let subscriptions: Vec<(String, Arc<Mutex<Subscription<N>>>)> = {
            let registry = self.subscriptions.read().await;
            registry
                .iter()
                .filter(|(_, entry)| entry.stream_id == stream.spec().id)
                .map(|(id, entry)| (id.clone(), Arc::clone(&entry.subscription)))
                .collect()
        };

        for (id, subscription) in subscriptions {
            let mut subscription = subscription.lock().await;
            if subscription.is_deleting() {
                continue;
            }
            if subscription.reset_requested() {
                if let Err(err) = subscription.reset_cycle().await {
                    error!(subscription = %id, error = %err, "Reset cycle failed, retrying next cycle");
                    continue;
                }
            }
            if let Err(err) = subscription.poll_once().await {
                warn!(subscription = %id, error = %err, "Poll cycle failed, retrying next cycle");
            }
        }
    }

    async fn subscription_by_id(
        &self,
        id: &str,
    ) -> Result<Arc<Mutex<Subscription<N>>>, StreamError> {
        let registry = self.subscriptions.read().await;
        registry
            .get(id)
            .map(|entry| Arc::clone(&entry.subscription))
            .ok_or_else(|| StreamError::UnknownSubscription(id.to_string()))
    }

    fn persist_info(&self, info: &SubscriptionInfo) -> Result<(), StreamError> {
        let value =
            serde_json::to_vec(info).map_err(|err| StreamError::Checkpoint(err.to_string()))?;
        self.checkpoints.put(&checkpoint::subscription_key(&info.id), &value)
    }

    fn read_checkpoint(&self, id: &str) -> Result<Option<SubscriptionCheckpoint>, StreamError> {
        let Some(bytes) = self.checkpoints.get(&checkpoint::checkpoint_key(id))? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StreamError::Checkpoint(err.to_string()))
    }
}

/// Owner of the spawned stream pollers.
pub struct StreamPollerHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl StreamPollerHandle {
    /// Stop all stream pollers, aborting any in-flight poll cycles.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
    }
}
