//! Serial tokio host for a [`BeaconMonitor`].
//!
//! One task owns the monitor and processes commands, signal-source events and
//! battery-saver timer firings strictly one after another. Callers talk to it
//! through a cloneable [`MonitorHandle`].

use std::time::Duration;

use beacon_core::{
    BeaconError, BeaconMonitor, BeaconRegion, PermissionService, ProximitySample, RangedCallback,
    RawSighting, RegionDescriptor, RegionPowerState, RegionState, SignalSource, TimerToken,
};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

/// Default capacity of the command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Errors returned by [`MonitorHandle`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service task has stopped.
    #[error("Beacon monitor service is not running")]
    Closed,

    /// The monitor rejected the request.
    #[error(transparent)]
    Monitor(#[from] BeaconError),
}

/// A request processed by the service task.
enum MonitorCommand {
    Register {
        descriptor: RegionDescriptor,
        on_ranged: RangedCallback,
        reply: oneshot::Sender<Result<(), BeaconError>>,
    },
    Unregister {
        uuid: String,
    },
    StartAll,
    StopScanning,
    Sightings {
        region: BeaconRegion,
        sightings: Vec<RawSighting>,
    },
    RegionStateChanged {
        region: BeaconRegion,
        state: RegionState,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<RegionDescriptor>>,
    },
    PowerState {
        uuid: String,
        reply: oneshot::Sender<Option<RegionPowerState>>,
    },
    Shutdown,
}

/// Cloneable handle to a running [`MonitorService`].
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<MonitorCommand>,
}

impl MonitorHandle {
    /// Register a region and start ranging it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Monitor`] if the identifier is malformed or
    /// already monitored, [`ServiceError::Closed`] if the service stopped.
    pub async fn register_region<F>(
        &self,
        uuid: &str,
        label: &str,
        limit: u32,
        include_unknown: bool,
        on_ranged: F,
    ) -> Result<(), ServiceError>
    where
        F: FnMut(ProximitySample) + Send + 'static,
    {
        let descriptor = RegionDescriptor {
            region_uuid: uuid.to_string(),
            region_identifier: label.to_string(),
            include_unknown,
            limit,
        };
        self.register_descriptor(descriptor, on_ranged).await
    }

    /// Register a region from its wire record.
    ///
    /// # Errors
    ///
    /// Same as [`Self::register_region`].
    pub async fn register_descriptor<F>(
        &self,
        descriptor: RegionDescriptor,
        on_ranged: F,
    ) -> Result<(), ServiceError>
    where
        F: FnMut(ProximitySample) + Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::Register {
            descriptor,
            on_ranged: Box::new(on_ranged),
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Closed)??;
        Ok(())
    }

    /// Stop monitoring a region; unknown identifiers are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn unregister_region(&self, uuid: &str) -> Result<(), ServiceError> {
        self.send(MonitorCommand::Unregister {
            uuid: uuid.to_string(),
        })
        .await
    }

    /// Request permission and range every registered region.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn start_monitoring_all(&self) -> Result<(), ServiceError> {
        self.send(MonitorCommand::StartAll).await
    }

    /// Stop ranging everywhere and cancel the battery-saver timer.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn stop_scanning(&self) -> Result<(), ServiceError> {
        self.send(MonitorCommand::StopScanning).await
    }

    /// Deliver a batch of sightings from the signal source.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn deliver_sightings(
        &self,
        region: BeaconRegion,
        sightings: Vec<RawSighting>,
    ) -> Result<(), ServiceError> {
        self.send(MonitorCommand::Sightings { region, sightings })
            .await
    }

    /// Deliver an inside/outside determination from the platform.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn region_state_changed(
        &self,
        region: BeaconRegion,
        state: RegionState,
    ) -> Result<(), ServiceError> {
        self.send(MonitorCommand::RegionStateChanged { region, state })
            .await
    }

    /// Snapshot of every registered region.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn region_descriptors(&self) -> Result<Vec<RegionDescriptor>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::Snapshot { reply }).await?;
        response.await.map_err(|_| ServiceError::Closed)
    }

    /// Ranging state of a registered region.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service stopped.
    pub async fn region_state(&self, uuid: &str) -> Result<Option<RegionPowerState>, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.send(MonitorCommand::PowerState {
            uuid: uuid.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ServiceError::Closed)
    }

    /// Ask the service task to exit after the commands already queued.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Closed`] if the service already stopped.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.send(MonitorCommand::Shutdown).await
    }

    async fn send(&self, command: MonitorCommand) -> Result<(), ServiceError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ServiceError::Closed)
    }
}

/// Owns a [`BeaconMonitor`] and runs it on a single task.
pub struct MonitorService<S, P> {
    monitor: BeaconMonitor<S, P>,
    commands: mpsc::Receiver<MonitorCommand>,
}

impl<S, P> MonitorService<S, P>
where
    S: SignalSource + Send + 'static,
    P: PermissionService + Send + 'static,
{
    /// Spawn the service on the current tokio runtime.
    ///
    /// Returns the handle for callers and the task's join handle.
    pub fn spawn(monitor: BeaconMonitor<S, P>) -> (MonitorHandle, JoinHandle<()>) {
        Self::spawn_with_buffer(monitor, DEFAULT_COMMAND_BUFFER)
    }

    /// Spawn the service with a custom command channel capacity.
    pub fn spawn_with_buffer(
        monitor: BeaconMonitor<S, P>,
        buffer_size: usize,
    ) -> (MonitorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(buffer_size.max(1));
        let service = Self {
            monitor,
            commands: commands_rx,
        };
        let task = tokio::spawn(service.run());
        (
            MonitorHandle {
                commands: commands_tx,
            },
            task,
        )
    }

    /// Process events until shutdown or until every handle is dropped.
    pub async fn run(mut self) {
        info!("beacon_monitor_service_started");

        let timer = sleep(Duration::ZERO);
        tokio::pin!(timer);
        let mut pending: Option<TimerToken> = None;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    None | Some(MonitorCommand::Shutdown) => break,
                    Some(command) => self.handle(command),
                },
                () = &mut timer, if pending.is_some() => {
                    if let Some(token) = pending.take() {
                        self.monitor.on_timer_fired(token);
                    }
                }
            }

            match self.monitor.armed_timer() {
                Some(armed) if pending != Some(armed.token) => {
                    timer.as_mut().reset(Instant::now() + armed.after);
                    pending = Some(armed.token);
                }
                Some(_) => {}
                None => {
                    if pending.take().is_some() {
                        debug!("battery_saver_timer_cancelled");
                    }
                }
            }
        }

        self.monitor.stop_scanning();
        info!("beacon_monitor_service_stopped");
    }

    fn handle(&mut self, command: MonitorCommand) {
        match command {
            MonitorCommand::Register {
                descriptor,
                on_ranged,
                reply,
            } => {
                let result = self.monitor.register_descriptor(&descriptor, on_ranged);
                // The caller may have given up waiting; registration stands either way.
                let _ = reply.send(result);
            }
            MonitorCommand::Unregister { uuid } => self.monitor.unregister_region(&uuid),
            MonitorCommand::StartAll => self.monitor.start_monitoring_all(),
            MonitorCommand::StopScanning => self.monitor.stop_scanning(),
            MonitorCommand::Sightings { region, sightings } => {
                self.monitor.on_sighting_batch(&region, &sightings);
            }
            MonitorCommand::RegionStateChanged { region, state } => {
                self.monitor.on_region_state_changed(&region, state);
            }
            MonitorCommand::Snapshot { reply } => {
                let _ = reply.send(self.monitor.region_descriptors());
            }
            MonitorCommand::PowerState { uuid, reply } => {
                let _ = reply.send(self.monitor.region_state(&uuid));
            }
            MonitorCommand::Shutdown => {}
        }
    }
}
