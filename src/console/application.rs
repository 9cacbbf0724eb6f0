use std::io;
use futures::channel::mpsc::{channel, Sender};
use futures::StreamExt;
use log::{error, info, warn};
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdout};
use tokio_util::sync::CancellationToken;

use crate::config::types::SessionConfig;
use crate::console::types::{parse_input, ConsoleInput, HELP};
use crate::console::view::{describe_change, render_state};
use crate::device::connection::spawn_session;
use crate::device::transport::Transport;
use crate::device::types::{DeviceEvent, SessionCommand, SessionSnapshot};
use crate::error::AppRunError;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, PartialEq, Eq)]
enum Handoff {
    Queued,
    Busy,
    SessionGone,
}

/// Queues a command without waiting, so that state updates keep being drained while the
/// session works through a backlog.
fn hand_off(commands: &mut Sender<SessionCommand>, command: SessionCommand) -> Handoff {
    match commands.try_send(command) {
        Ok(()) => Handoff::Queued,
        Err(err) if err.is_disconnected() => Handoff::SessionGone,
        Err(err) => {
            warn!("Session is busy, dropping {:?}", err.into_inner());
            Handoff::Busy
        },
    }
}

async fn print(out: &mut Stdout, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}

/// Line oriented front end: reads intents from stdin and prints state changes to stdout.
pub async fn run_console<T: Transport + 'static>(transport: T, config: SessionConfig) -> Result<(), AppRunError> {
    let cancel = CancellationToken::new();
    let (event_sender, mut events) = channel::<DeviceEvent>(EVENT_BUFFER);
    let (mut commands, handle) = spawn_session(cancel.clone(), transport, &config, vec![event_sender]);

    let mut lines = BufReader::new(stdin()).lines();
    let mut out = stdout();
    // the error of a snapshot is shown once, so it is never kept here
    let mut latest = SessionSnapshot::default();

    print(&mut out, HELP).await?;

    'mainloop: loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break 'mainloop,
                };

                let input = match parse_input(&line) {
                    Ok(Some(input)) => input,
                    Ok(None) => continue 'mainloop,
                    Err(message) => {
                        print(&mut out, &message).await?;
                        continue 'mainloop;
                    },
                };

                match input {
                    ConsoleInput::Quit => break 'mainloop,
                    ConsoleInput::Help => print(&mut out, HELP).await?,
                    ConsoleInput::Show => print(&mut out, &render_state(&latest)).await?,
                    input => match input.to_command(&latest.devices) {
                        Ok(Some(command)) => match hand_off(&mut commands, command) {
                            Handoff::Queued => {},
                            Handoff::Busy => print(&mut out, "Busy, try again in a moment").await?,
                            Handoff::SessionGone => {
                                error!("Session task is gone");
                                break 'mainloop;
                            },
                        },
                        Ok(None) => {},
                        Err(message) => print(&mut out, &message).await?,
                    },
                }
            },
            event = events.next() => match event {
                Some(DeviceEvent::StateChange(snapshot)) => {
                    for line in describe_change(&latest, &snapshot) {
                        print(&mut out, &line).await?;
                    }
                    latest = SessionSnapshot { error: None, ..snapshot };
                },
                Some(DeviceEvent::Rejected(rejection)) => {
                    print(&mut out, &format!("Not possible: {}", rejection)).await?;
                },
                None => break 'mainloop,
            },
        }
    }

    info!("Exit requested");
    cancel.cancel();
    if let Err(err) = handle.await {
        error!("Session task failed: {}", err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_command_queue_does_not_block() {
        let (mut commands, _receiver) = channel::<SessionCommand>(0);

        assert_eq!(hand_off(&mut commands, SessionCommand::StartScan), Handoff::Queued);
        assert_eq!(hand_off(&mut commands, SessionCommand::Submit), Handoff::Busy);
    }

    #[test]
    fn closed_session_is_reported() {
        let (mut commands, receiver) = channel::<SessionCommand>(4);
        drop(receiver);

        assert_eq!(hand_off(&mut commands, SessionCommand::StartScan), Handoff::SessionGone);
    }
}
