//! Single-writer service around [`TendermintX`].
//!
//! The service task owns the light client and applies one command at a time, which gives
//! requests and fulfillments the same atomicity and total order a ledger transaction
//! would. Callers use a cloneable [`LightClientHandle`]; every accepted transition is
//! published on a broadcast channel.

use std::sync::Arc;

use tendermintx_primitives::{B256, U256};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::TendermintX;
use crate::error::{LightClientError, Result};
use crate::events::LightClientEvent;
use crate::gateway::{Callback, FunctionId, ProofGateway};
use crate::ledger::LedgerSnapshot;

/// Capacity of the command queue.
const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the event broadcast channel. Slow subscribers observe `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A proof request, carrying only what the caller chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Step {
        value: U256,
    },
    Skip {
        target_height: u64,
        value: U256,
    },
    Freeze {
        trusted_height: u64,
        conflict_height: u64,
        value: U256,
    },
}

/// A proof delivery. The callback parameters are the ones captured at request time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fulfillment {
    pub callback: Callback,
}

/// Point-in-time view of the light client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightClientStatus {
    pub latest_height: u64,
    pub latest_header: B256,
    pub frozen: bool,
    pub step_function_id: FunctionId,
    pub skip_function_id: FunctionId,
}

enum Admin {
    SetGenesisHeader { height: u64, header: B256 },
    UpdateGateway(Arc<dyn ProofGateway>),
    UpdateStepFunctionId(FunctionId),
    UpdateSkipFunctionId(FunctionId),
}

enum Command {
    Request {
        request: Request,
        reply: oneshot::Sender<Result<LightClientEvent>>,
    },
    Fulfill {
        fulfillment: Fulfillment,
        reply: oneshot::Sender<Result<LightClientEvent>>,
    },
    Admin {
        admin: Admin,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<LightClientStatus>,
    },
    HeaderAt {
        height: u64,
        reply: oneshot::Sender<B256>,
    },
    Snapshot {
        reply: oneshot::Sender<LedgerSnapshot>,
    },
}

pub struct LightClientService {
    client: TendermintX,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<LightClientEvent>,
}

impl LightClientService {
    pub fn new(client: TendermintX) -> (Self, LightClientHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = LightClientHandle {
            commands: command_tx,
            events: events.clone(),
        };
        let service = Self {
            client,
            commands: command_rx,
            events,
        };
        (service, handle)
    }

    /// Spawn the service on the current runtime. The task returns the light client once
    /// every handle has been dropped.
    pub fn spawn(client: TendermintX) -> (LightClientHandle, JoinHandle<TendermintX>) {
        let (service, handle) = Self::new(client);
        (handle, tokio::spawn(service.run()))
    }

    pub async fn run(mut self) -> TendermintX {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("Light client service shutdown complete");
        self.client
    }

    fn publish(&self, outcome: &Result<LightClientEvent>) {
        if let Ok(event) = outcome {
            // No subscribers is fine.
            let _ = self.events.send(event.clone());
        }
    }

    fn apply_request(&mut self, request: Request) -> Result<LightClientEvent> {
        match request {
            Request::Step { value } => self.client.request_step(value),
            Request::Skip {
                target_height,
                value,
            } => self.client.request_skip(target_height, value),
            Request::Freeze {
                trusted_height,
                conflict_height,
                value,
            } => self
                .client
                .request_freeze(trusted_height, conflict_height, value),
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Request { request, reply } => {
                let outcome = self.apply_request(request);
                if let Err(e) = &outcome {
                    debug!("Request {:?} rejected: {}", request, e);
                }
                self.publish(&outcome);
                let _ = reply.send(outcome);
            }
            Command::Fulfill { fulfillment, reply } => {
                let outcome = self.client.fulfill(fulfillment.callback);
                if let Err(e) = &outcome {
                    warn!("Fulfillment {:?} rejected: {}", fulfillment.callback, e);
                }
                self.publish(&outcome);
                let _ = reply.send(outcome);
            }
            Command::Admin { admin, reply } => {
                match admin {
                    Admin::SetGenesisHeader { height, header } => {
                        self.client.set_genesis_header(height, header)
                    }
                    Admin::UpdateGateway(gateway) => self.client.update_gateway(gateway),
                    Admin::UpdateStepFunctionId(id) => self.client.update_step_function_id(id),
                    Admin::UpdateSkipFunctionId(id) => self.client.update_skip_function_id(id),
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(LightClientStatus {
                    latest_height: self.client.latest_height(),
                    latest_header: self.client.header_at(self.client.latest_height()),
                    frozen: self.client.frozen(),
                    step_function_id: self.client.step_function_id(),
                    skip_function_id: self.client.skip_function_id(),
                });
            }
            Command::HeaderAt { height, reply } => {
                let _ = reply.send(self.client.header_at(height));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.client.snapshot());
            }
        }
    }
}

/// Cloneable handle to a running [`LightClientService`].
#[derive(Clone)]
pub struct LightClientHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<LightClientEvent>,
}

impl LightClientHandle {
    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| LightClientError::ServiceStopped)?;
        rx.await.map_err(|_| LightClientError::ServiceStopped)
    }

    /// Subscribe to events emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LightClientEvent> {
        self.events.subscribe()
    }

    pub async fn request(&self, request: Request) -> Result<LightClientEvent> {
        self.call(|reply| Command::Request { request, reply }).await?
    }

    pub async fn request_step(&self, value: U256) -> Result<LightClientEvent> {
        self.request(Request::Step { value }).await
    }

    pub async fn request_skip(&self, target_height: u64, value: U256) -> Result<LightClientEvent> {
        self.request(Request::Skip {
            target_height,
            value,
        })
        .await
    }

    pub async fn request_freeze(
        &self,
        trusted_height: u64,
        conflict_height: u64,
        value: U256,
    ) -> Result<LightClientEvent> {
        self.request(Request::Freeze {
            trusted_height,
            conflict_height,
            value,
        })
        .await
    }

    /// Deliver the fulfillment for `callback`.
    pub async fn fulfill(&self, callback: Callback) -> Result<LightClientEvent> {
        let fulfillment = Fulfillment { callback };
        self.call(|reply| Command::Fulfill { fulfillment, reply })
            .await?
    }

    async fn admin(&self, admin: Admin) -> Result<()> {
        self.call(|reply| Command::Admin { admin, reply }).await
    }

    pub async fn set_genesis_header(&self, height: u64, header: B256) -> Result<()> {
        self.admin(Admin::SetGenesisHeader { height, header }).await
    }

    pub async fn update_gateway(&self, gateway: Arc<dyn ProofGateway>) -> Result<()> {
        self.admin(Admin::UpdateGateway(gateway)).await
    }

    pub async fn update_step_function_id(&self, function_id: FunctionId) -> Result<()> {
        self.admin(Admin::UpdateStepFunctionId(function_id)).await
    }

    pub async fn update_skip_function_id(&self, function_id: FunctionId) -> Result<()> {
        self.admin(Admin::UpdateSkipFunctionId(function_id)).await
    }

    pub async fn status(&self) -> Result<LightClientStatus> {
        self.call(|reply| Command::Status { reply }).await
    }

    pub async fn latest_height(&self) -> Result<u64> {
        Ok(self.status().await?.latest_height)
    }

    pub async fn header_at(&self, height: u64) -> Result<B256> {
        self.call(|reply| Command::HeaderAt { height, reply }).await
    }

    pub async fn snapshot(&self) -> Result<LedgerSnapshot> {
        self.call(|reply| Command::Snapshot { reply }).await
    }
}
