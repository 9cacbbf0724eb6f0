use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::StreamExt;
use log::info;
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::types::SessionConfig;
use crate::device::session::Session;
use crate::device::transport::Transport;
use crate::device::types::{DeviceEvent, SessionCommand};

const COMMAND_BUFFER: usize = 16;

async fn run_session<T: Transport>(cancel: CancellationToken, mut session: Session<T>, mut commands: Receiver<SessionCommand>) {
    session.publish_state().await;

    'mainloop: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            command = commands.next() => match command {
                Some(command) => session.execute(command).await,
                None => break 'mainloop,
            },
            event = session.next_event() => {
                session.handle_event(event).await;
            },
        }
    }

    info!("Session stopping");
    session.shutdown().await;
}

/// Runs a [`Session`] on its own task.
///
/// Intents go in through the returned sender; every state change goes out to `senders`. The task
/// ends, after stopping any scan and dropping any connection, when `cancel` is cancelled or every
/// command sender has been dropped.
pub fn spawn_session<T: Transport + 'static>(
    cancel: CancellationToken,
    transport: T,
    config: &SessionConfig,
    senders: Vec<Sender<DeviceEvent>>,
) -> (Sender<SessionCommand>, JoinHandle<()>) {
    let (command_sender, command_receiver) = channel::<SessionCommand>(COMMAND_BUFFER);

    let mut session = Session::new(transport, config);
    for sender in senders {
        session.subscribe(sender);
    }

    let handle = spawn(run_session(cancel, session, command_receiver));

    (command_sender, handle)
}

#[cfg(test)]
mod tests {
    use futures::SinkExt;
    use super::*;
    use crate::device::mock::{Fault, MockTransport, TransportCall};
    use crate::device::types::{Field, SessionSnapshot};
    use crate::error::{IntentRejected, Operation};

    async fn next_state(events: &mut Receiver<DeviceEvent>) -> SessionSnapshot {
        loop {
            match events.next().await {
                Some(DeviceEvent::StateChange(snapshot)) => return snapshot,
                Some(DeviceEvent::Rejected(rejection)) => panic!("unexpected rejection {:?}", rejection),
                None => panic!("session ended"),
            }
        }
    }

    async fn wait_for(events: &mut Receiver<DeviceEvent>, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        loop {
            let snapshot = next_state(events).await;
            if done(&snapshot) {
                return snapshot;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drives_scan_select_edit_and_submit() {
        let transport = MockTransport::with_sample_data();
        let (event_sender, mut events) = channel(256);
        let cancel = CancellationToken::new();
        let (mut commands, handle) = spawn_session(
            cancel.clone(), transport.clone(), &SessionConfig::default(), vec![event_sender],
        );

        let initial = next_state(&mut events).await;
        assert_eq!(initial, SessionSnapshot::default());

        commands.send(SessionCommand::StartScan).await.unwrap();
        wait_for(&mut events, |snapshot| snapshot.scanning).await;
        let scanned = wait_for(&mut events, |snapshot| !snapshot.scanning).await;
        assert_eq!(scanned.devices.len(), 2);

        commands.send(SessionCommand::SelectDevice("A1".to_string())).await.unwrap();
        let loaded = wait_for(&mut events, |snapshot| snapshot.connected && !snapshot.loading_device).await;
        assert_eq!(loaded.record.first_name, "Ana");

        commands.send(SessionCommand::EditField(Field::Age, "31".to_string())).await.unwrap();
        wait_for(&mut events, |snapshot| snapshot.record.age == "31").await;

        commands.send(SessionCommand::Submit).await.unwrap();
        wait_for(&mut events, |snapshot| snapshot.loading_device).await;
        let submitted = wait_for(&mut events, |snapshot| !snapshot.loading_device).await;
        assert_eq!(submitted.error, None);
        assert_eq!(transport.stored_value("A1", Field::Age), Some("31".to_string()));

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(transport.calls().last(), Some(&TransportCall::Disconnect("A1".to_string())));
    }

    #[tokio::test]
    async fn rejected_intents_are_reported() {
        let (event_sender, mut events) = channel(256);
        let (mut commands, handle) = spawn_session(
            CancellationToken::new(), MockTransport::with_sample_data(), &SessionConfig::default(), vec![event_sender],
        );
        next_state(&mut events).await;

        commands.send(SessionCommand::Submit).await.unwrap();

        assert_eq!(events.next().await, Some(DeviceEvent::Rejected(IntentRejected::NotConnected)));

        drop(commands);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn each_error_is_delivered_once() {
        let transport = MockTransport::with_sample_data();
        transport.fail(Fault::Initialize, "permission denied");
        let (event_sender, mut events) = channel(256);
        let (mut commands, handle) = spawn_session(
            CancellationToken::new(), transport, &SessionConfig::default(), vec![event_sender],
        );
        next_state(&mut events).await;

        commands.send(SessionCommand::StartScan).await.unwrap();
        let failed = next_state(&mut events).await;
        assert_eq!(failed.error.map(|err| err.operation()), Some(Operation::Init));

        commands.send(SessionCommand::EditField(Field::FirstName, "Ana".to_string())).await.unwrap();
        let edited = next_state(&mut events).await;
        assert_eq!(edited.error, None);

        drop(commands);
        handle.await.unwrap();
    }
}
