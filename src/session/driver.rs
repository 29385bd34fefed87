//! Event loop: feeds socket events, timers and user commands into a session
//! one at a time, and carries out the directives it leaves behind.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::net::{Dialer, NetEvent};

use super::command::Command;
use super::{Directive, GameSession, TimerEvent};

pub struct Driver {
    net_tx: mpsc::UnboundedSender<NetEvent>,
    net_rx: mpsc::UnboundedReceiver<NetEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    dialer: Option<Arc<Dialer>>,
    keepalive: Duration,
    shutdown: CancellationToken,
}

impl Driver {
    /// Returns the driver plus the senders the transport and the console
    /// write into.
    pub fn new(
        keepalive: Duration,
        shutdown: CancellationToken,
    ) -> (Self, mpsc::UnboundedSender<NetEvent>, mpsc::UnboundedSender<Command>) {
        let (net_tx, net_rx) = mpsc::unbounded_channel();
        let (cmd_tx, commands) = mpsc::unbounded_channel();
        let driver = Self {
            net_tx: net_tx.clone(),
            net_rx,
            commands,
            dialer: None,
            keepalive,
            shutdown,
        };
        (driver, net_tx, cmd_tx)
    }

    pub fn with_dialer(mut self, dialer: Dialer) -> Self {
        self.dialer = Some(Arc::new(dialer));
        self
    }

    pub async fn run<S: GameSession>(mut self, mut session: S) -> S {
        let (timer_tx, mut timers) = mpsc::unbounded_channel::<TimerEvent>();
        let mut keepalive = interval(self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut second = interval(Duration::from_secs(1));
        second.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.carry_out(&mut session, &timer_tx);
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                Some(event) = self.net_rx.recv() => match event {
                    NetEvent::Opened { conn, peer, name, tx } => {
                        session.on_open(conn, peer, name, tx, Instant::now())
                    }
                    NetEvent::Frame { conn, frame } => session.on_frame(conn, frame, Instant::now()),
                    NetEvent::Closed { conn } => session.on_closed(conn),
                    NetEvent::DialFailed { error } => session.on_dial_failed(&error),
                },
                Some(timer) = timers.recv() => session.on_timer(timer),
                Some(command) = self.commands.recv() => session.on_command(command),
                _ = keepalive.tick() => session.on_keepalive(Instant::now()),
                _ = second.tick() => session.on_second(),
            }
            self.carry_out(&mut session, &timer_tx);
        }
        tracing::info!("session loop stopped");
        session
    }

    fn carry_out<S: GameSession>(&self, session: &mut S, timer_tx: &mpsc::UnboundedSender<TimerEvent>) {
        for directive in session.take_directives() {
            match directive {
                Directive::Schedule { after, timer } => {
                    let tx = timer_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(after).await;
                        let _ = tx.send(timer);
                    });
                }
                Directive::Dial => {
                    let Some(dialer) = self.dialer.clone() else {
                        tracing::warn!("dial requested without a dialer");
                        continue;
                    };
                    let events = self.net_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = dialer.connect(events.clone()).await {
                            let _ = events.send(NetEvent::DialFailed { error: err.to_string() });
                        }
                    });
                }
                Directive::Shutdown => self.shutdown.cancel(),
            }
        }
    }
}
