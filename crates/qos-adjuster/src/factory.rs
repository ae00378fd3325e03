//! Action-keyed construction of adjusters.
//!
//! Each [`QosAction`] resolves to an [`AdjusterKind`] through a static
//! table. The factory owns the long-lived collaborators and wires a fresh
//! adjuster around them on every [`AdjusterBuilder::build`] call.

use std::fmt;
use std::sync::Arc;

use qos_net::{MigrationClient, PinClient, PoolClient};
use qos_types::QosAction;
use qos_types::events::EventBus;

use crate::adjuster::{
    Adjuster, AdjusterBase, CopyAdjuster, ReplicaStateAdjuster, StagingAdjuster,
};
use crate::completion::CompletionHandler;
use crate::config::AdjusterConfig;
use crate::migration::CopyRelay;
use crate::worker::WorkerPool;

/// Protocol family an adjuster implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdjusterKind {
    /// Pool-to-pool migration of one replica.
    Copy,
    /// Sticky / precious bit change on a resident replica.
    ReplicaState,
    /// Nearline retrieval through a short-lived pin.
    Staging,
}

impl fmt::Display for AdjusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdjusterKind::Copy => "copy",
            AdjusterKind::ReplicaState => "replica-state",
            AdjusterKind::Staging => "staging",
        };
        f.write_str(name)
    }
}

/// Which adjuster handles which action. Actions missing here have none.
const STRATEGIES: &[(QosAction, AdjusterKind)] = &[
    (QosAction::ReplicateCopy, AdjusterKind::Copy),
    (QosAction::WaitForStage, AdjusterKind::Staging),
    (QosAction::SetCached, AdjusterKind::ReplicaState),
    (QosAction::SetPersisted, AdjusterKind::ReplicaState),
    (QosAction::UnsetPrecious, AdjusterKind::ReplicaState),
];

/// Look up the adjuster kind for `action`.
pub fn adjuster_kind(action: QosAction) -> Option<AdjusterKind> {
    STRATEGIES
        .iter()
        .find(|(a, _)| *a == action)
        .map(|(_, kind)| *kind)
}

/// Builds adjusters wired with the engine's shared collaborators.
#[derive(Clone)]
pub struct AdjusterFactory {
    pools: Arc<dyn PoolClient>,
    pins: Arc<dyn PinClient>,
    migration: Arc<dyn MigrationClient>,
    relay: Arc<CopyRelay>,
    workers: Arc<WorkerPool>,
    handler: Arc<dyn CompletionHandler>,
    events: EventBus,
    config: Arc<AdjusterConfig>,
}

impl AdjusterFactory {
    /// Create a factory. A fresh [`CopyRelay`] and [`EventBus`] are created;
    /// use [`copy_relay`](Self::copy_relay) to feed inbound copy notices.
    pub fn new(
        pools: Arc<dyn PoolClient>,
        pins: Arc<dyn PinClient>,
        migration: Arc<dyn MigrationClient>,
        workers: Arc<WorkerPool>,
        handler: Arc<dyn CompletionHandler>,
        config: AdjusterConfig,
    ) -> Self {
        Self {
            pools,
            pins,
            migration,
            relay: CopyRelay::new(),
            workers,
            handler,
            events: EventBus::new(),
            config: Arc::new(config),
        }
    }

    /// Share an existing event bus instead of the factory's own.
    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// Share an existing copy relay instead of the factory's own.
    pub fn with_copy_relay(mut self, relay: Arc<CopyRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// The relay that inbound [`CopyFinished`](qos_net::CopyFinished)
    /// messages must be handed to.
    pub fn copy_relay(&self) -> Arc<CopyRelay> {
        self.relay.clone()
    }

    /// The bus adjusters emit lifecycle events on.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Engine configuration handed to every adjuster.
    pub fn config(&self) -> &AdjusterConfig {
        &self.config
    }

    /// Whether [`for_action`](Self::for_action) can build an adjuster for `action`.
    pub fn supports(&self, action: QosAction) -> bool {
        adjuster_kind(action).is_some()
    }

    /// Start building an adjuster for `action`.
    pub fn for_action(&self, action: QosAction) -> AdjusterBuilder<'_> {
        AdjusterBuilder {
            factory: self,
            action,
        }
    }

    fn base(&self) -> AdjusterBase {
        AdjusterBase::new(
            self.handler.clone(),
            self.events.clone(),
            self.workers.clone(),
            self.config.clone(),
        )
    }
}

impl fmt::Debug for AdjusterFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjusterFactory")
            .field("workers", &self.workers)
            .field("relay", &self.relay)
            .field("config", &self.config)
            .finish()
    }
}

/// Pending construction of one adjuster.
#[derive(Debug)]
pub struct AdjusterBuilder<'a> {
    factory: &'a AdjusterFactory,
    action: QosAction,
}

impl AdjusterBuilder<'_> {
    /// The action the adjuster will carry out.
    pub fn action(&self) -> QosAction {
        self.action
    }

    /// Build a new, unbound adjuster.
    ///
    /// # Panics
    ///
    /// Panics if no adjuster handles the action. Callers are expected to
    /// only route actions the factory [`supports`](AdjusterFactory::supports).
    pub fn build(self) -> Arc<dyn Adjuster> {
        let factory = self.factory;
        let Some(kind) = adjuster_kind(self.action) else {
            panic!("no adjuster for QoS action {}", self.action);
        };

        match kind {
            AdjusterKind::Copy => Arc::new(CopyAdjuster::new(
                factory.base(),
                factory.migration.clone(),
                factory.relay.clone(),
            )),
            AdjusterKind::ReplicaState => Arc::new(ReplicaStateAdjuster::new(
                factory.base(),
                factory.pools.clone(),
            )),
            AdjusterKind::Staging => {
                Arc::new(StagingAdjuster::new(factory.base(), factory.pins.clone()))
            }
        }
    }
}
