use crate::net::buffer::Ingress;
use crate::net::frame::{Inbound, Opcode, MAX_PAYLOAD_SIZE};
use crate::net::handler::MessageHandler;
use crate::net::handshake::{self, Policy, Rejection};
use crate::net::registry::{ConnectionRegistry, LISTENER_TOKEN};
use crate::net::shared::{ErrorUtils, NetworkError, NetworkResult};
use crate::net::transport::Transport;
use crate::net::user::{ConnectedUser, UserId};
use flux::choose;
use flux::logging::{debug, info, o, trace, warn, Logger};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use rustls::ServerConfig;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Status code 1000, sent when the server closes a connection on its own.
const NORMAL_CLOSURE: [u8; 2] = [0x03, 0xe8];

/// Why `Endpoint::run` returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopReason {
    /// Administrative shutdown, every connection was closed.
    Shutdown,
    /// The application decided there is nothing left to serve.
    Idle,
}

#[derive(Clone)]
pub struct Settings {
    pub address: SocketAddr,
    /// Terminates TLS on every accepted connection when set.
    pub tls: Option<Arc<ServerConfig>>,
    pub policy: Policy,
    pub max_message_size: usize,
    pub handshake_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            tls: None,
            policy: Policy::default(),
            max_message_size: MAX_PAYLOAD_SIZE,
            handshake_timeout: Duration::from_secs(5),
            tick_interval: Duration::from_millis(10),
        }
    }
}

/// The part of the endpoint handed to the message handler: connection lookup, sending and
/// closing.
pub struct Hub<P> {
    users: ConnectionRegistry<P>,
    poll: mio::Registry,
    // Messages for users whose handshake has not completed yet
    held: Vec<(UserId, String)>,
    // Users scheduled for disconnect, reaped by the endpoint
    doomed: Vec<UserId>,
    stopped: Option<StopReason>,
    log: Logger,
}

impl<P> Hub<P> {
    fn new(poll: mio::Registry, log: Logger) -> Hub<P> {
        Hub {
            users: ConnectionRegistry::new(),
            poll,
            held: Vec::new(),
            doomed: Vec::new(),
            stopped: None,
            log,
        }
    }

    #[inline]
    pub fn users(&self) -> &ConnectionRegistry<P> {
        &self.users
    }

    #[inline]
    pub fn user(&self, id: &UserId) -> Option<&ConnectedUser<P>> {
        self.users.get(id)
    }

    #[inline]
    pub fn user_mut(&mut self, id: &UserId) -> Option<&mut ConnectedUser<P>> {
        self.users.get_mut(id)
    }

    /// Number of open connections, including those still in the handshake.
    #[inline]
    pub fn connection_count(&self) -> usize {
        self.users.len()
    }

    #[inline]
    pub fn logger(&self) -> &Logger {
        &self.log
    }

    /// Sends a text message. Messages to users still in the handshake are held until it
    /// completes. A failed write schedules the user's disconnect. Returns false if the message
    /// could not be sent or held.
    pub fn send(&mut self, id: &UserId, message: &str) -> bool {
        let user = match self.users.get_mut(id) {
            Some(user) => user,
            None => return false,
        };

        if !user.is_handshake_complete() {
            self.held.push((id.clone(), message.to_string()));
            return true;
        }

        if user.send_frame(message.as_bytes(), Opcode::Text, false).has_failed() {
            debug!(self.log, "Send failed"; "user" => %id);
            self.disconnect(id);
            return false;
        }

        true
    }

    /// Schedules a disconnect. The handler's `closed` callback runs once the user is removed.
    pub fn disconnect(&mut self, id: &UserId) {
        if self.users.contains(id) && !self.doomed.contains(id) {
            self.doomed.push(id.clone());
        }
    }

    #[inline]
    pub fn is_disconnecting(&self, id: &UserId) -> bool {
        self.doomed.contains(id)
    }

    /// Closes the connection right away and hands back its record. The handler is not notified.
    pub fn close(&mut self, id: &UserId) -> Option<ConnectedUser<P>> {
        let mut user = self.users.remove(id)?;

        if user.is_handshake_complete() {
            drop(user.send_close(&NORMAL_CLOSURE));
        }

        drop(self.poll.deregister(user.transport().source()));
        user.shutdown();

        self.held.retain(|(held, _)| held != id);
        self.doomed.retain(|doomed| doomed != id);

        trace!(self.log, "Closed"; "user" => %id);
        Some(user)
    }

    /// Closes every connection and stops the endpoint.
    pub fn shutdown(&mut self) {
        for id in self.users.ids() {
            self.close(&id);
        }

        info!(self.log, "Shutting down");
        self.stop(StopReason::Shutdown);
    }

    /// Makes `Endpoint::run` return after the current event. The first reason wins.
    #[inline]
    pub fn stop(&mut self, reason: StopReason) {
        if self.stopped.is_none() {
            self.stopped = Some(reason);
        }
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    #[inline]
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stopped
    }

    fn deliver_held(&mut self) {
        if self.held.is_empty() {
            return;
        }

        for (id, message) in std::mem::take(&mut self.held) {
            match self.users.get(&id).map(ConnectedUser::is_handshake_complete) {
                Some(true) => {
                    self.send(&id, &message);
                }
                Some(false) => self.held.push((id, message)),
                // Gone before the handshake completed
                None => (),
            }
        }
    }

    fn flush(&mut self, token: Token) {
        let failed = match self.users.lookup_by_socket_mut(token) {
            Some(user) => choose!(user.flush().has_failed() => Some(user.id.clone()), None),
            None => None,
        };

        if let Some(id) = failed {
            self.disconnect(&id);
        }
    }

    fn flush_all(&mut self) {
        let failed: Vec<UserId> = self
            .users
            .iter_mut()
            .filter(|user| user.has_egress())
            .filter_map(|user| choose!(user.flush().has_failed() => Some(user.id.clone()), None))
            .collect();

        for id in failed {
            self.disconnect(&id);
        }
    }
}

/// Single-threaded WebSocket server. Owns the listener, the poll and every connection, and
/// drives the handler from `run`.
pub struct Endpoint<H: MessageHandler> {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    hub: Hub<H::Profile>,
    handler: H,
    settings: Settings,
    tick_time: Instant,
    housekeeping_time: Instant,
    log: Logger,
}

impl<H: MessageHandler> Endpoint<H> {
    const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new(settings: Settings, handler: H, log: &Logger) -> NetworkResult<Endpoint<H>> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(settings.address)?;

        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let log = log.new(o!("listen" => listener.local_addr()?.to_string()));
        info!(log, "Listening"; "tls" => settings.tls.is_some());

        let hub = Hub::new(poll.registry().try_clone()?, log.clone());
        let now = Instant::now();

        Ok(Endpoint {
            listener,
            poll,
            events: Events::with_capacity(1024),
            hub,
            handler,
            settings,
            tick_time: now,
            housekeeping_time: now,
            log,
        })
    }

    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    #[inline]
    pub fn handler(&self) -> &H {
        &self.handler
    }

    #[inline]
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    #[inline]
    pub fn into_handler(self) -> H {
        self.handler
    }

    #[inline]
    pub fn hub(&self) -> &Hub<H::Profile> {
        &self.hub
    }

    /// Serves connections until the hub is stopped.
    pub fn run(&mut self) -> NetworkResult<StopReason> {
        loop {
            if let Some(reason) = self.sync(Instant::now())? {
                info!(self.log, "Stopped"; "reason" => ?reason);
                return Ok(reason);
            }
        }
    }

    /// One pass of the event loop: held messages, periodic hooks, egress, then a poll bounded by
    /// the tick interval. Returns the stop reason once the hub has been stopped.
    pub fn sync(&mut self, now: Instant) -> NetworkResult<Option<StopReason>> {
        self.hub.deliver_held();

        if now.duration_since(self.tick_time) >= self.settings.tick_interval {
            self.handler.tick(&mut self.hub);
            self.tick_time = now;
        }

        if now.duration_since(self.housekeeping_time) >= Self::HOUSEKEEPING_INTERVAL {
            self.housekeeping(now);
            self.housekeeping_time = now;
        }

        self.hub.flush_all();
        self.reap();

        if self.hub.is_stopped() {
            return Ok(self.hub.stopped);
        }

        match self.poll.poll(&mut self.events, Some(self.settings.tick_interval)) {
            Ok(()) => (),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => return Ok(None),
            Err(err) => return Err(err.into()),
        }

        let ready: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|event| {
                (
                    event.token(),
                    event.is_readable() || event.is_read_closed() || event.is_error(),
                    event.is_writable(),
                )
            })
            .collect();

        for (token, readable, writable) in ready {
            if self.hub.is_stopped() {
                break;
            }

            if token == LISTENER_TOKEN {
                self.accept(now);
                continue;
            }

            if writable {
                self.hub.flush(token);
            }

            if readable {
                self.receive(token);
            }

            self.reap();
        }

        Ok(self.hub.stopped)
    }

    fn accept(&mut self, now: Instant) {
        loop {
            let (stream, address) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(self.log, "Accept failed"; "error" => %err);
                    return;
                }
            };

            drop(stream.set_nodelay(true));

            let transport = match &self.settings.tls {
                Some(config) => match Transport::tls(stream, config) {
                    Ok(transport) => transport,
                    Err(err) => {
                        warn!(self.log, "TLS session setup failed"; "addr" => %address, "error" => %err);
                        continue;
                    }
                },
                None => Transport::plain(stream),
            };

            let user = self
                .hub
                .users
                .accept(transport, address, self.settings.max_message_size, now);
            let (id, token) = (user.id.clone(), user.token);
            let registered = self
                .hub
                .poll
                .register(user.transport().source(), token, Interest::READABLE | Interest::WRITABLE);

            match registered {
                Ok(()) => debug!(self.log, "Accepted"; "user" => %id, "addr" => %address),
                Err(err) => {
                    warn!(self.log, "Registration failed"; "user" => %id, "error" => %err);
                    self.hub.close(&id);
                }
            }
        }
    }

    fn receive(&mut self, token: Token) {
        let (id, ingress) = match self.hub.users.lookup_by_socket_mut(token) {
            Some(user) => (user.id.clone(), user.receive()),
            None => return,
        };

        let closed = match ingress {
            Ok(Ingress::Drained(_)) | Err(NetworkError::Wait) => false,
            Ok(Ingress::Closed(_)) => true,
            Err(err) => {
                debug!(self.log, "Read failed"; "user" => %id, "error" => %err);
                self.hub.disconnect(&id);
                return;
            }
        };

        self.advance(&id);

        if closed {
            debug!(self.log, "Peer closed the connection"; "user" => %id);
            self.hub.disconnect(&id);
        }
    }

    /// Completes the handshake if needed, then dispatches every complete frame in the buffer.
    fn advance(&mut self, id: &UserId) {
        let pending = match self.hub.users.get(id) {
            Some(user) => !user.is_handshake_complete(),
            None => return,
        };

        if pending && !self.handshake(id) {
            return;
        }

        loop {
            if self.hub.is_stopped() || self.hub.is_disconnecting(id) {
                return;
            }

            let inbound = match self.hub.users.get_mut(id) {
                Some(user) => user.deframe(),
                None => return,
            };

            match inbound {
                Ok(Inbound::Message(payload)) => self.handler.process(&mut self.hub, id, &payload),
                Ok(Inbound::Ping(payload)) => {
                    let failed = self
                        .hub
                        .users
                        .get_mut(id)
                        .map_or(false, |user| user.send_frame(&payload, Opcode::Pong, false).has_failed());

                    if failed {
                        self.hub.disconnect(id);
                    }
                }
                Ok(Inbound::Pong(_)) => (),
                Ok(Inbound::Close(payload)) => {
                    if let Some(user) = self.hub.users.get_mut(id) {
                        drop(user.send_close(&payload));
                    }
                    debug!(self.log, "Close requested"; "user" => %id);
                    self.hub.disconnect(id);
                }
                Err(NetworkError::Wait) => return,
                Err(err) => {
                    debug!(self.log, "Protocol violation"; "user" => %id, "error" => %err);
                    self.hub.disconnect(id);
                }
            }
        }
    }

    /// Returns true once the handshake completed and the handler was notified.
    fn handshake(&mut self, id: &UserId) -> bool {
        let user = match self.hub.users.get_mut(id) {
            Some(user) => user,
            None => return false,
        };

        let request = match user.read_request() {
            Ok(request) => request,
            Err(NetworkError::Wait) => return false,
            Err(err) => {
                drop(user.write_raw(Rejection::BAD_REQUEST.response().as_bytes()));
                info!(self.log, "Malformed handshake"; "user" => %id, "error" => %err);
                self.hub.disconnect(id);
                return false;
            }
        };

        match handshake::negotiate(&request, &self.settings.policy) {
            Ok(response) => {
                if user.write_raw(response.as_bytes()).has_failed() {
                    self.hub.disconnect(id);
                    return false;
                }

                debug!(self.log, "Handshake complete"; "user" => %id, "path" => &request.path);
                user.complete_handshake(request);
            }
            Err(rejection) => {
                drop(user.write_raw(rejection.response().as_bytes()));
                info!(self.log, "Handshake rejected"; "user" => %id, "status" => rejection.status);
                self.hub.disconnect(id);
                return false;
            }
        }

        self.handler.connected(&mut self.hub, id);
        true
    }

    fn housekeeping(&mut self, now: Instant) {
        let timeout = self.settings.handshake_timeout;

        let expired: Vec<UserId> = self
            .hub
            .users
            .iter()
            .filter(|user| !user.is_handshake_complete() && now.duration_since(user.connected_at()) >= timeout)
            .map(|user| user.id.clone())
            .collect();

        for id in expired {
            debug!(self.log, "Handshake timed out"; "user" => %id);
            self.hub.disconnect(&id);
        }
    }

    /// Removes the users scheduled for disconnect and notifies the handler.
    fn reap(&mut self) {
        while !self.hub.doomed.is_empty() {
            let id = self.hub.doomed.remove(0);

            if let Some(user) = self.hub.close(&id) {
                debug!(self.log, "Disconnected"; "user" => %id);
                self.handler.closed(&mut self.hub, user);
            }
        }
    }
}
