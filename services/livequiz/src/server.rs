use crate::directory::{Audience, Departure, Role, SessionDirectory, SessionId};
use crate::protocol::{Arrival, Inbound, Outbound, StudentEntry};
use crate::store::SessionStore;
use flux::choose;
use flux::logging;
use relay::prelude::{ConnectedUser, Hub, MessageHandler, StopReason, UserId};

/// Application state of a quiz participant, filled in by `newuser`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Profile {
    pub name: String,
    pub picture: String,
    pub userid: Option<u64>,
    pub sid: Option<SessionId>,
    pub cmid: Option<u64>,
    pub is_teacher: bool,
}

/// Live quiz session server: tracks who is in which session and fans out roster changes.
pub struct QuizServer<S> {
    directory: SessionDirectory,
    store: S,
    // Set by the first teardown. From then on the server stops once its last connection is gone.
    torn_down: bool,
    log: logging::Logger,
}

impl<S: SessionStore> QuizServer<S> {
    pub fn new(store: S, log: &logging::Logger) -> QuizServer<S> {
        QuizServer {
            directory: SessionDirectory::new(),
            store,
            torn_down: false,
            log: log.new(logging::o!("handler" => "quiz")),
        }
    }

    #[inline]
    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// True once a teacher has ended a session on this server.
    #[inline]
    pub fn has_torn_down(&self) -> bool {
        self.torn_down
    }

    fn new_user(&mut self, hub: &mut Hub<Profile>, user: &UserId, arrival: Arrival) {
        let role = choose!(arrival.isteacher => Role::Teacher, Role::Student);
        let sid = arrival.sid;

        match self.directory.session_of(user) {
            // A session keeps its teacher until they disconnect
            Some((current, Role::Teacher)) if current == sid && role == Role::Student => {
                logging::info!(self.log, "teacher tried to rejoin as student"; "user" => %user, "sid" => sid);
                self.reply(hub, user, &Outbound::error("the teacher of a session cannot rejoin it as a student"));
                return;
            }
            // A connection moving to another session leaves the previous one first
            Some((previous, _)) if previous != sid => self.depart(hub, previous, user),
            _ => (),
        }

        let profile = Profile {
            name: arrival.name,
            picture: arrival.pic,
            userid: arrival.userid,
            sid: Some(sid),
            cmid: arrival.cmid,
            is_teacher: arrival.isteacher,
        };

        match hub.user_mut(user) {
            Some(connected) => connected.profile = profile.clone(),
            None => return,
        }

        self.directory.join(sid, user, role);

        logging::info!(
            self.log,
            "joined";
            "user" => %user,
            "sid" => sid,
            "role" => ?role,
            "name" => &profile.name
        );

        let announcement = match role {
            Role::Teacher => Outbound::NewTeacher {
                message: format!("{} joined the session", profile.name),
                name: profile.name,
                userid: profile.userid,
                count: self.directory.member_count(sid),
            },
            Role::Student => Outbound::NewUser {
                students: self.roster(hub, sid),
                count: self.directory.student_count(sid),
            },
        };

        self.broadcast(hub, sid, Audience::All, &announcement);
    }

    fn count_users(&mut self, hub: &mut Hub<Profile>, user: &UserId) {
        let sid = match self.directory.session_of(user) {
            Some((sid, _)) => sid,
            None => {
                logging::debug!(self.log, "countusers before newuser"; "user" => %user);
                return;
            }
        };

        // Goes to the whole session, not just the requester
        let count = Outbound::CountUsers {
            count: self.directory.student_count(sid),
        };
        self.broadcast(hub, sid, Audience::All, &count);
    }

    /// Removes the user from `sid`. A departing teacher ends the session for everyone in it.
    fn depart(&mut self, hub: &mut Hub<Profile>, sid: SessionId, user: &UserId) {
        match self.directory.leave(sid, user) {
            Departure::Left => {
                let name = hub
                    .user(user)
                    .map(|connected| connected.profile.name.clone())
                    .unwrap_or_default();
                self.announce_departure(hub, sid, user, &name);
            }
            Departure::Teardown => self.teardown(hub, sid, user),
            Departure::NotMember => (),
        }
    }

    fn announce_departure(&mut self, hub: &mut Hub<Profile>, sid: SessionId, user: &UserId, name: &str) {
        logging::info!(self.log, "left"; "user" => %user, "sid" => sid);

        let message = Outbound::UserDisconnected {
            usersocketid: user.clone(),
            message: format!("{} left the session", name),
            count: self.directory.student_count(sid),
        };
        self.broadcast(hub, sid, Audience::All, &message);
    }

    fn teardown(&mut self, hub: &mut Hub<Profile>, sid: SessionId, teacher: &UserId) {
        let members = self.directory.teardown(sid);
        self.torn_down = true;

        for member in members.iter().filter(|member| *member != teacher) {
            hub.close(member);
        }

        logging::info!(
            self.log,
            "session finished";
            "sid" => sid,
            "teacher" => %teacher,
            "closed" => members.len()
        );

        match self.store.mark_finished(sid) {
            Ok(true) => (),
            Ok(false) => logging::debug!(self.log, "session already finished"; "sid" => sid),
            Err(err) => logging::error!(self.log, "failed to mark session finished"; "sid" => sid, "error" => %err),
        }
    }

    fn roster(&self, hub: &Hub<Profile>, sid: SessionId) -> Vec<StudentEntry> {
        self.directory
            .members(sid, Audience::Students)
            .into_iter()
            .filter_map(|id| {
                hub.user(&id).map(|connected| StudentEntry {
                    picture: connected.profile.picture.clone(),
                    name: connected.profile.name.clone(),
                    usersocketid: id,
                })
            })
            .collect()
    }

    fn broadcast(&self, hub: &mut Hub<Profile>, sid: SessionId, audience: Audience, message: &Outbound) {
        match message.encode() {
            Ok(text) => {
                self.directory.broadcast(hub, sid, audience, &text);
            }
            Err(err) => logging::error!(self.log, "failed to encode message"; "sid" => sid, "error" => %err),
        }
    }

    fn reply(&self, hub: &mut Hub<Profile>, user: &UserId, message: &Outbound) {
        match message.encode() {
            Ok(text) => {
                hub.send(user, &text);
            }
            Err(err) => logging::error!(self.log, "failed to encode message"; "user" => %user, "error" => %err),
        }
    }
}

impl<S: SessionStore> MessageHandler for QuizServer<S> {
    type Profile = Profile;

    fn connected(&mut self, hub: &mut Hub<Profile>, user: &UserId) {
        logging::debug!(self.log, "connected"; "user" => %user);

        let message = Outbound::Connect {
            usersocketid: user.clone(),
        };
        self.reply(hub, user, &message);
    }

    fn process(&mut self, hub: &mut Hub<Profile>, user: &UserId, message: &[u8]) {
        match Inbound::decode(message) {
            Ok(Inbound::NewUser(arrival)) => self.new_user(hub, user, arrival),
            Ok(Inbound::CountUsers) => self.count_users(hub, user),
            Ok(Inbound::ShutdownTest) => {
                logging::warn!(self.log, "shutdown requested"; "user" => %user);
                hub.shutdown();
            }
            Ok(Inbound::Unknown) => logging::trace!(self.log, "unknown action"; "user" => %user),
            Err(err) => {
                logging::debug!(self.log, "malformed message"; "user" => %user, "error" => %err);
                self.reply(hub, user, &Outbound::error(format!("malformed message: {}", err)));
            }
        }
    }

    fn closed(&mut self, hub: &mut Hub<Profile>, user: ConnectedUser<Profile>) {
        if let Some((sid, _)) = self.directory.session_of(&user.id) {
            match self.directory.leave(sid, &user.id) {
                Departure::Left => self.announce_departure(hub, sid, &user.id, &user.profile.name),
                Departure::Teardown => self.teardown(hub, sid, &user.id),
                Departure::NotMember => (),
            }
        }

        if self.torn_down && hub.connection_count() == 0 {
            logging::info!(self.log, "no connections left");
            hub.stop(StopReason::Idle);
        }
    }
}
