use crate::net::transport::Transport;
use crate::net::user::{ConnectedUser, UserId};
use hashbrown::HashMap;
use mio::Token;
use std::net::SocketAddr;
use std::time::Instant;

/// Token reserved for the listening socket.
pub const LISTENER_TOKEN: Token = Token(0);

/// Owns every live connection, indexed by user id and by poll token.
pub struct ConnectionRegistry<P> {
    users: HashMap<UserId, ConnectedUser<P>>,
    sockets: HashMap<Token, UserId>,
    next_token: usize,
    sequence: u64,
}

impl<P> ConnectionRegistry<P> {
    #[inline]
    pub fn new() -> ConnectionRegistry<P> {
        ConnectionRegistry {
            users: HashMap::new(),
            sockets: HashMap::new(),
            next_token: LISTENER_TOKEN.0 + 1,
            sequence: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: &UserId) -> bool {
        self.users.contains_key(id)
    }

    #[inline]
    pub fn get(&self, id: &UserId) -> Option<&ConnectedUser<P>> {
        self.users.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: &UserId) -> Option<&mut ConnectedUser<P>> {
        self.users.get_mut(id)
    }

    /// Resolves the connection owning the socket registered under `token`.
    #[inline]
    pub fn lookup_by_socket(&self, token: Token) -> Option<&ConnectedUser<P>> {
        self.sockets.get(&token).and_then(|id| self.users.get(id))
    }

    #[inline]
    pub fn lookup_by_socket_mut(&mut self, token: Token) -> Option<&mut ConnectedUser<P>> {
        match self.sockets.get(&token) {
            Some(id) => self.users.get_mut(id),
            None => None,
        }
    }

    /// Ids of all live connections.
    #[inline]
    pub fn ids(&self) -> Vec<UserId> {
        self.users.keys().cloned().collect()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ConnectedUser<P>> + '_ {
        self.users.values()
    }

    #[inline]
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConnectedUser<P>> + '_ {
        self.users.values_mut()
    }

    /// Removes the connection from both indexes. Removing an unknown id is a no-op.
    #[inline]
    pub fn remove(&mut self, id: &UserId) -> Option<ConnectedUser<P>> {
        let user = self.users.remove(id)?;
        self.sockets.remove(&user.token);
        Some(user)
    }
}

impl<P: Default> ConnectionRegistry<P> {
    /// Tracks a freshly accepted connection under a new id and token.
    pub fn accept(
        &mut self,
        transport: Transport,
        address: SocketAddr,
        max_message_size: usize,
        now: Instant,
    ) -> &mut ConnectedUser<P> {
        self.sequence += 1;

        let id = UserId::generate(self.sequence);
        let token = Token(self.next_token);
        self.next_token += 1;

        self.sockets.insert(token, id.clone());
        self.users
            .entry(id.clone())
            .or_insert_with(|| ConnectedUser::new(id, token, address, transport, max_message_size, now))
    }
}
