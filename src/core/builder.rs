use std::sync::Arc;

use super::{config::Config, supervisor::Supervisor};
use crate::{
    events::Bus,
    parse::{Rule, default_rules},
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for a [`Supervisor`].
///
/// ```no_run
/// use std::sync::Arc;
/// use simvisor::{Config, ProgressMonitor, Subscribe, SupervisorBuilder};
///
/// # async fn demo() {
/// let monitor = Arc::new(ProgressMonitor::new());
/// let sup = SupervisorBuilder::new(Config::default())
///     .with_subscribers(vec![monitor.clone() as Arc<dyn Subscribe>])
///     .build();
/// assert!(!sup.is_running());
/// # }
/// ```
pub struct SupervisorBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    rules: Vec<Rule>,
}

impl SupervisorBuilder {
    /// Creates a builder with the given configuration and the built-in parse rules.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            rules: default_rules(),
        }
    }

    /// Sets event subscribers.
    ///
    /// Each subscriber gets a dedicated worker fed by a bounded queue.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds one subscriber.
    pub fn with_subscriber(mut self, subscriber: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Appends a parse rule after the built-in ones.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Replaces the whole parse rule chain.
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Builds the supervisor: bus, subscriber workers and their listener.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Arc<Supervisor> {
        let (bus, feed) = Bus::with_feed(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone())
            .with_stall(self.cfg.subscriber_stall);
        Arc::new(Supervisor::new_internal(self.cfg, bus, feed, subs, self.rules))
    }
}
