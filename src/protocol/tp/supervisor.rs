//! Transport service built on top of [`Controller`].
//!
//! It keeps the data-link engine alive and optionally offers:
//!
//! * a transmission handle (`TpHandle`) to queue outbound Parameter Groups;
//! * a message receiver (`TpMessages`) to pull the Parameter Groups the
//!   engine reassembled or passed through.
//!
//! Firmware decides which features it needs by providing pre-allocated
//! [`embassy_sync::channel::Channel`] instances. No allocation is performed
//! by the library and there is no dependency on a particular BSP.

use core::fmt::Debug;

use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    channel::{Channel, Receiver, Sender},
};

use crate::error::ServiceError;
use crate::protocol::tp::controller::{Controller, ProcessResult, ReceivedMessage};
use crate::protocol::tp::MAX_TP_PAYLOAD;
use crate::protocol::transport::traits::{can_bus::CanBus, clock::Clock};

/// Service assembling the transport components.
pub struct TpService<'a, C: CanBus, K: Clock, const CMD_CAP: usize, const MSG_CAP: usize>
where
    C::Error: Debug,
{
    controller: Controller<C, K>,
    command_channel: Option<&'a Channel<CriticalSectionRawMutex, TpCommand, CMD_CAP>>,
    message_channel: Option<&'a Channel<CriticalSectionRawMutex, ReceivedMessage, MSG_CAP>>,
}

impl<'a, C, K, const CMD_CAP: usize, const MSG_CAP: usize> TpService<'a, C, K, CMD_CAP, MSG_CAP>
where
    C: CanBus,
    C::Error: Debug,
    K: Clock,
{
    /// Wrap an already-initialised [`Controller`].
    pub fn new(
        controller: Controller<C, K>,
        command_channel: Option<&'a Channel<CriticalSectionRawMutex, TpCommand, CMD_CAP>>,
        message_channel: Option<&'a Channel<CriticalSectionRawMutex, ReceivedMessage, MSG_CAP>>,
    ) -> Self {
        Self {
            controller,
            command_channel,
            message_channel,
        }
    }

    /// Split into handle/receiver/runner components.
    pub fn into_parts(self) -> TpServiceParts<'a, C, K, CMD_CAP, MSG_CAP> {
        let handle = self.command_channel.map(|channel| TpHandle {
            sender: channel.sender(),
        });
        let messages = self.message_channel.map(|channel| TpMessages {
            receiver: channel.receiver(),
        });
        TpServiceParts {
            handle,
            messages,
            runner: TpRunner {
                controller: self.controller,
                command_channel: self.command_channel,
                message_channel: self.message_channel,
            },
        }
    }
}

/// Bundle returned by [`TpService::into_parts`].
pub struct TpServiceParts<'a, C, K, const CMD_CAP: usize, const MSG_CAP: usize>
where
    C: CanBus,
    C::Error: Debug,
    K: Clock,
{
    pub handle: Option<TpHandle<'a, CMD_CAP>>,
    pub messages: Option<TpMessages<'a, MSG_CAP>>,
    pub runner: TpRunner<'a, C, K, CMD_CAP, MSG_CAP>,
}

/// Runner that drives the transport loop.
pub struct TpRunner<'a, C, K, const CMD_CAP: usize, const MSG_CAP: usize>
where
    C: CanBus,
    C::Error: Debug,
    K: Clock,
{
    controller: Controller<C, K>,
    command_channel: Option<&'a Channel<CriticalSectionRawMutex, TpCommand, CMD_CAP>>,
    message_channel: Option<&'a Channel<CriticalSectionRawMutex, ReceivedMessage, MSG_CAP>>,
}

impl<'a, C, K, const CMD_CAP: usize, const MSG_CAP: usize> TpRunner<'a, C, K, CMD_CAP, MSG_CAP>
where
    C: CanBus,
    C::Error: Debug,
    K: Clock,
{
    /// Drive reception, scavenging, and queued transmissions forever.
    ///
    /// Each pass drains the driver FIFO through the engine (publishing
    /// completed messages), runs one scavenge pass, services at most one
    /// queued command, then yields one poll interval. Send failures are
    /// logged and dropped; only driver receive errors end the loop.
    pub async fn drive(mut self) -> Result<(), ServiceError<C::Error>> {
        loop {
            while let Some(frame) = self
                .controller
                .poll_frame()
                .map_err(ServiceError::Receive)?
            {
                match self.controller.on_frame(&frame) {
                    ProcessResult::SingleFrame(message)
                    | ProcessResult::MessageComplete(message) => {
                        if let Some(channel) = self.message_channel {
                            channel.send(message).await;
                        }
                    }
                    ProcessResult::Ignored | ProcessResult::FragmentConsumed => {}
                }
            }

            self.controller.tick();

            if let Some(channel) = self.command_channel {
                if let Ok(command) = channel.try_receive() {
                    self.run_command(command).await;
                }
            }

            self.controller.idle().await;
        }
    }

    async fn run_command(&mut self, command: TpCommand) {
        match command {
            TpCommand::SendPayload { pgn, len, payload } => {
                if let Err(_err) = self.controller.send(pgn, &payload[..len]).await {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("Queued send failed: {}", defmt::Debug2Format(&_err));
                }
            }
        }
    }
}

/// Transmission handle (optional).
pub struct TpHandle<'a, const CMD_CAP: usize> {
    sender: Sender<'a, CriticalSectionRawMutex, TpCommand, CMD_CAP>,
}

impl<'a, const CMD_CAP: usize> TpHandle<'a, CMD_CAP> {
    /// Queue a Parameter Group for transmission.
    ///
    /// The payload is copied into the command; fragmentation and pacing
    /// happen in the runner.
    pub async fn send_payload(&self, pgn: u32, data: &[u8]) -> Result<(), TpHandleError> {
        if data.len() > MAX_TP_PAYLOAD {
            return Err(TpHandleError::PayloadTooLarge);
        }

        let mut payload = [0u8; MAX_TP_PAYLOAD];
        payload[..data.len()].copy_from_slice(data);

        let command = TpCommand::SendPayload {
            pgn,
            len: data.len(),
            payload,
        };
        self.sender.send(command).await;
        Ok(())
    }
}

/// Optional receiver returning the Parameter Groups the engine published.
pub struct TpMessages<'a, const MSG_CAP: usize> {
    receiver: Receiver<'a, CriticalSectionRawMutex, ReceivedMessage, MSG_CAP>,
}

impl<'a, const MSG_CAP: usize> TpMessages<'a, MSG_CAP> {
    pub async fn recv(&mut self) -> ReceivedMessage {
        self.receiver.receive().await
    }
}

/// Commands queued by producer tasks.
#[derive(Clone)]
pub enum TpCommand {
    SendPayload {
        pgn: u32,
        len: usize,
        payload: [u8; MAX_TP_PAYLOAD],
    },
}

#[derive(Debug)]
pub enum TpHandleError {
    PayloadTooLarge,
}
