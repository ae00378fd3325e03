//! Staging adjuster: triggers nearline retrieval by pinning the file briefly.

use std::sync::Arc;

use qos_net::{NetError, PinClient, PinReply, PinRequest, ProtocolDescriptor, UnpinRequest};
use qos_types::{AdjustmentTask, FileId, QosAction, SessionId};
use tracing::{debug, info, warn};

use super::{Adjuster, AdjusterBase};
use crate::ACTIVITY_TARGET;
use crate::error::AdjusterError;
use crate::factory::AdjusterKind;
use crate::lifecycle::AdjusterState;
use crate::worker::wait_for_reply;

/// Request id used for every staging pin, and for the matching unpin.
pub const STAGE_PIN_REQUEST_ID: &str = "qos";

/// Handles [`QosAction::WaitForStage`].
///
/// Asks the pin manager for a short pin scoped to the task's pool group.
/// The pin manager stages the file as a side effect; the pin itself only
/// needs to live long enough for that to start. On success the pool that
/// received the file is reported, so a later pass can replicate from it.
pub struct StagingAdjuster {
    base: AdjusterBase,
    pins: Arc<dyn PinClient>,
}

impl StagingAdjuster {
    pub(crate) fn new(base: AdjusterBase, pins: Arc<dyn PinClient>) -> Self {
        Self { base, pins }
    }

    fn handle_reply(&self, file_id: FileId, reply: Result<PinReply, NetError>) {
        let action = QosAction::WaitForStage;
        match reply {
            Ok(PinReply { error: Some(e), pool }) => {
                self.base.fail(
                    pool.clone(),
                    AdjusterError::Remote {
                        file_id,
                        action,
                        pool,
                        error: e,
                    },
                );
            }
            Ok(PinReply {
                pool: Some(pool),
                error: None,
            }) => {
                debug!(%file_id, %pool, "stage pin granted");
                self.base.complete(Some(pool));
            }
            Ok(PinReply {
                pool: None,
                error: None,
            }) => {
                self.base.fail(
                    None,
                    AdjusterError::Transport {
                        file_id,
                        action,
                        source: NetError::MalformedReply(
                            "pin granted without a pool".to_string(),
                        ),
                    },
                );
            }
            Err(e) => {
                self.base.fail(
                    None,
                    AdjusterError::Transport {
                        file_id,
                        action,
                        source: e,
                    },
                );
            }
        }
    }

    fn unpin(&self, file_id: &FileId, session: SessionId) {
        let request = UnpinRequest {
            file_id: file_id.clone(),
            request_id: STAGE_PIN_REQUEST_ID.to_string(),
            session,
        };
        if let Err(e) = self.pins.unpin(request) {
            warn!(%file_id, error = %e, "unpin after cancelled stage failed");
        }
    }
}

/// Build the placeholder HTTP descriptor the pin request carries.
///
/// No transfer ever uses it; it only has to be well formed.
pub(crate) fn protocol_descriptor(host: &str, port: u16) -> Result<ProtocolDescriptor, String> {
    if host.trim().is_empty() {
        return Err("staging protocol host is empty".to_string());
    }

    let uri = format!("http://{host}:{port}/")
        .parse::<http::Uri>()
        .map_err(|e| format!("could not construct HTTP protocol for {host}:{port}: {e}"))?;

    Ok(ProtocolDescriptor {
        protocol: "Http".to_string(),
        major: 1,
        minor: 1,
        uri: uri.to_string(),
    })
}

impl Adjuster for StagingAdjuster {
    fn kind(&self) -> AdjusterKind {
        AdjusterKind::Staging
    }

    fn base(&self) -> &AdjusterBase {
        &self.base
    }

    #[tracing::instrument(skip_all, fields(file_id = %task.file_id))]
    fn run_adjuster(self: Arc<Self>, task: AdjustmentTask, session: SessionId) {
        let file_id = task.file_id.clone();
        let action = task.action;
        let config = &self.base.config;

        let protocol =
            match protocol_descriptor(&config.stage_protocol_host, config.stage_protocol_port) {
                Ok(p) => p,
                Err(reason) => {
                    self.base.fail(
                        None,
                        AdjusterError::InvalidConfiguration {
                            file_id,
                            action,
                            reason,
                        },
                    );
                    return;
                }
            };

        if !self.base.lifecycle.is_running() {
            return;
        }

        let request = PinRequest {
            attributes: task.attributes,
            protocol,
            request_id: STAGE_PIN_REQUEST_ID.to_string(),
            lifetime_ms: config.stage_pin_lifetime.as_millis() as u64,
            pool_group: task.pool_group.clone(),
            session,
        };

        info!(
            target: ACTIVITY_TARGET,
            %file_id,
            pool_group = ?task.pool_group,
            "Staging {}",
            file_id
        );

        let Some(pending) = self.pins.pin(request) else {
            self.base.fail(
                None,
                AdjusterError::ServiceUnavailable { file_id, action },
            );
            return;
        };

        let max_wait = config.max_reply_wait;
        let this = self.clone();
        let waiting_for = file_id.clone();
        let handle = self.base.workers.spawn(async move {
            let reply = wait_for_reply(pending, max_wait).await;
            this.handle_reply(waiting_for, reply);
        });

        // A cancel that landed between the start and the pin has already
        // unpinned once, possibly before the pin was sent. Unpin again now
        // that the pin is definitely out.
        if !self.base.lifecycle.attach(handle) && self.state() == AdjusterState::Cancelled {
            self.unpin(&file_id, session);
        }
    }

    fn cancel(&self, explanation: &str) {
        self.base
            .lifecycle
            .cancel(explanation, |file_id, session| self.unpin(file_id, session));
    }
}
