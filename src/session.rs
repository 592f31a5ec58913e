//! Per-call network session
//!
//! A session owns the endorser and committer connections opened for one
//! lifecycle operation. Callers run their work and then call
//! [`Session::close`] on every path, success or failure:
//!
//! ```ignore
//! let mut session = Session::new(transport, timeout);
//! let result = run(&mut session).await;
//! session.close().await;
//! result
//! ```
//!
//! If the operation future is dropped first, the session's `Drop` hands the
//! opened connections to a spawned task that closes them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::error::{LifecycleError, Result};
use crate::identity::SigningContext;
use crate::proposal::{self, PreparedProposal};
use crate::protos::common::Status;
use crate::protos::peer::ProposalResponse;
use crate::transport::{with_deadline, CommitterClient, ConnectionOptions, EndorserClient, Transport};

struct Endorser {
    name: String,
    timeout: Duration,
    client: Box<dyn EndorserClient>,
}

struct Committer {
    name: String,
    timeout: Duration,
    client: Box<dyn CommitterClient>,
}

pub(crate) struct Session {
    transport: Arc<dyn Transport>,
    /// Per-call timeout, overriding endpoint and transport defaults
    timeout: Option<Duration>,
    endorsers: Vec<Endorser>,
    committer: Option<Committer>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            timeout,
            endorsers: Vec::new(),
            committer: None,
        }
    }

    fn timeout_for(&self, options: &ConnectionOptions) -> Duration {
        self.timeout
            .or(options.request_timeout)
            .unwrap_or_else(|| self.transport.default_timeout())
    }

    pub async fn add_endorser(&mut self, options: &ConnectionOptions) -> Result<()> {
        let timeout = self.timeout_for(options);
        let options = with_timeout(options, timeout);
        let client = with_deadline(
            timeout,
            &format!("connecting to peer {}", options.name),
            self.transport.connect_endorser(&options),
        )
        .await?;
        debug!(peer = %options.name, url = %options.url, "Endorser connected");

        self.endorsers.push(Endorser {
            name: options.name.clone(),
            timeout,
            client,
        });
        Ok(())
    }

    pub async fn set_committer(&mut self, options: &ConnectionOptions) -> Result<()> {
        let timeout = self.timeout_for(options);
        let options = with_timeout(options, timeout);
        let client = with_deadline(
            timeout,
            &format!("connecting to orderer {}", options.name),
            self.transport.connect_committer(&options),
        )
        .await?;
        debug!(orderer = %options.name, url = %options.url, "Committer connected");

        self.committer = Some(Committer {
            name: options.name.clone(),
            timeout,
            client,
        });
        Ok(())
    }

    /// Send a proposal to the first endorser and return the chaincode result.
    pub async fn evaluate(&self, prepared: &PreparedProposal) -> Result<Vec<u8>> {
        let endorser = self
            .endorsers
            .first()
            .ok_or_else(|| LifecycleError::validation("no endorsing peer connected"))?;

        let response = send(endorser, prepared).await?;
        proposal::response_payload(&endorser.name, &response)
    }

    /// Collect endorsements from every connected endorser.
    ///
    /// The fan-out is one unit: any failure fails the whole call.
    pub async fn endorse(&self, prepared: &PreparedProposal) -> Result<Vec<(String, ProposalResponse)>> {
        if self.endorsers.is_empty() {
            return Err(LifecycleError::validation("no endorsing peer connected"));
        }

        let results = join_all(self.endorsers.iter().map(|endorser| async move {
            send(endorser, prepared)
                .await
                .map(|response| (endorser.name.clone(), response))
        }))
        .await;

        let responses = results.into_iter().collect::<Result<Vec<_>>>()?;
        proposal::check_endorsements(&responses)?;
        Ok(responses)
    }

    /// Endorse, then order the resulting transaction through the committer.
    pub async fn submit(&self, ctx: &SigningContext, prepared: &PreparedProposal) -> Result<()> {
        let responses = self.endorse(prepared).await?;
        let committer = self
            .committer
            .as_ref()
            .ok_or_else(|| LifecycleError::validation("no orderer connected"))?;

        let envelope = proposal::transaction_envelope(ctx, prepared, &responses)?;
        let response = with_deadline(
            committer.timeout,
            &format!("broadcast to orderer {}", committer.name),
            committer.client.broadcast(envelope),
        )
        .await?;

        if response.status != Status::Success as i32 {
            let status = Status::try_from(response.status)
                .map(|s| format!("{:?}", s))
                .unwrap_or_else(|_| response.status.to_string());
            return Err(LifecycleError::Protocol {
                status: response.status,
                message: format!(
                    "orderer {} rejected transaction {}: {} {}",
                    committer.name, prepared.tx_id, status, response.info
                ),
            });
        }

        debug!(orderer = %committer.name, tx_id = %prepared.tx_id, "Transaction accepted for ordering");
        Ok(())
    }

    /// Close every opened connection. Close failures are logged, not returned.
    pub async fn close(mut self) {
        let endorsers = std::mem::take(&mut self.endorsers);
        let committer = self.committer.take();
        release(endorsers, committer).await;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.endorsers.is_empty() && self.committer.is_none() {
            return;
        }
        let endorsers = std::mem::take(&mut self.endorsers);
        let committer = self.committer.take();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(endorsers = endorsers.len(), "Releasing connections of an abandoned session");
                handle.spawn(release(endorsers, committer));
            }
            Err(_) => warn!("Session dropped outside a runtime, connections dropped without close"),
        }
    }
}

async fn release(endorsers: Vec<Endorser>, committer: Option<Committer>) {
    for endorser in endorsers {
        if let Err(e) = endorser.client.close().await {
            warn!(peer = %endorser.name, error = %e, "Failed to close endorser connection");
        }
    }
    if let Some(committer) = committer {
        if let Err(e) = committer.client.close().await {
            warn!(orderer = %committer.name, error = %e, "Failed to close committer connection");
        }
    }
}

/// The transport sees the timeout the session resolved, not the descriptor's.
fn with_timeout(options: &ConnectionOptions, timeout: Duration) -> ConnectionOptions {
    ConnectionOptions {
        request_timeout: Some(timeout),
        ..options.clone()
    }
}

async fn send(endorser: &Endorser, prepared: &PreparedProposal) -> Result<ProposalResponse> {
    debug!(peer = %endorser.name, tx_id = %prepared.tx_id, function = %prepared.function, "Sending proposal");
    with_deadline(
        endorser.timeout,
        &format!("endorsement from peer {}", endorser.name),
        endorser.client.process_proposal(prepared.signed().clone()),
    )
    .await
    .map_err(|e| {
        warn!(peer = %endorser.name, tx_id = %prepared.tx_id, error = %e, "Endorsement failed");
        e
    })
}
