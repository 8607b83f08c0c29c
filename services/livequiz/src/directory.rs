use flux::choose;
use hashbrown::HashMap;
use indexmap::IndexSet;
use relay::net::endpoint::Hub;
use relay::net::user::UserId;

pub type SessionId = u64;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Teacher,
    Student,
}

/// Which bucket of a session a broadcast goes to.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Audience {
    All,
    Students,
    Teacher,
}

/// Outcome of `SessionDirectory::leave`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Departure {
    /// A student left, the session goes on.
    Left,
    /// The teacher left, the session must be torn down.
    Teardown,
    /// The user was not a member of the session.
    NotMember,
}

#[derive(Debug, Default)]
struct Session {
    all: IndexSet<UserId>,
    students: IndexSet<UserId>,
    teachers: IndexSet<UserId>,
}

impl Session {
    #[inline]
    fn bucket(&self, audience: Audience) -> &IndexSet<UserId> {
        match audience {
            Audience::All => &self.all,
            Audience::Students => &self.students,
            Audience::Teacher => &self.teachers,
        }
    }
}

/// Session scoped membership of the connected users. Buckets keep join order.
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: HashMap<SessionId, Session>,
    memberships: HashMap<UserId, (SessionId, Role)>,
}

impl SessionDirectory {
    #[inline]
    pub fn new() -> SessionDirectory {
        SessionDirectory::default()
    }

    /// Adds the user to `sid` under `role`. A user is a member of at most one session under one
    /// role: joining again moves them and never duplicates.
    pub fn join(&mut self, sid: SessionId, user: &UserId, role: Role) {
        if let Some(&(current_sid, current_role)) = self.memberships.get(user) {
            if current_sid == sid && current_role == role {
                return;
            }
            self.remove(current_sid, user);
        }

        let session = self.sessions.entry(sid).or_insert_with(Session::default);
        session.all.insert(user.clone());

        match role {
            Role::Teacher => session.teachers.insert(user.clone()),
            Role::Student => session.students.insert(user.clone()),
        };

        self.memberships.insert(user.clone(), (sid, role));
    }

    /// Removes the user from every bucket of `sid`. Leaving as the teacher asks for a teardown.
    pub fn leave(&mut self, sid: SessionId, user: &UserId) -> Departure {
        match self.memberships.get(user) {
            Some(&(current_sid, role)) if current_sid == sid => {
                self.remove(sid, user);
                choose!(role == Role::Teacher => Departure::Teardown, Departure::Left)
            }
            _ => Departure::NotMember,
        }
    }

    /// Drops the session and returns its former members in join order.
    pub fn teardown(&mut self, sid: SessionId) -> Vec<UserId> {
        let session = match self.sessions.remove(&sid) {
            Some(session) => session,
            None => return Vec::new(),
        };

        for user in &session.all {
            self.memberships.remove(user);
        }

        session.all.into_iter().collect()
    }

    /// Session and role of the user, if they joined one.
    #[inline]
    pub fn session_of(&self, user: &UserId) -> Option<(SessionId, Role)> {
        self.memberships.get(user).copied()
    }

    #[inline]
    pub fn contains(&self, sid: SessionId) -> bool {
        self.sessions.contains_key(&sid)
    }

    #[inline]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn members(&self, sid: SessionId, audience: Audience) -> Vec<UserId> {
        self.sessions
            .get(&sid)
            .map_or_else(Vec::new, |session| session.bucket(audience).iter().cloned().collect())
    }

    #[inline]
    pub fn member_count(&self, sid: SessionId) -> usize {
        self.count(sid, Audience::All)
    }

    #[inline]
    pub fn student_count(&self, sid: SessionId) -> usize {
        self.count(sid, Audience::Students)
    }

    #[inline]
    pub fn teacher_count(&self, sid: SessionId) -> usize {
        self.count(sid, Audience::Teacher)
    }

    /// Sends `message` to every member of the selected bucket. A failed recipient does not stop
    /// the others. Returns the number of recipients the message was handed to.
    pub fn broadcast<P>(&self, hub: &mut Hub<P>, sid: SessionId, audience: Audience, message: &str) -> usize {
        let session = match self.sessions.get(&sid) {
            Some(session) => session,
            None => return 0,
        };

        session
            .bucket(audience)
            .iter()
            .filter(|user| hub.send(user, message))
            .count()
    }

    #[inline]
    fn count(&self, sid: SessionId, audience: Audience) -> usize {
        self.sessions
            .get(&sid)
            .map_or(0, |session| session.bucket(audience).len())
    }

    fn remove(&mut self, sid: SessionId, user: &UserId) {
        self.memberships.remove(user);

        let empty = match self.sessions.get_mut(&sid) {
            Some(session) => {
                session.all.shift_remove(user);
                session.students.shift_remove(user);
                session.teachers.shift_remove(user);
                session.all.is_empty()
            }
            None => false,
        };

        if empty {
            self.sessions.remove(&sid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::from(id)
    }

    #[test]
    fn test_join_partitions_roles() {
        let mut directory = SessionDirectory::new();

        directory.join(7, &user("t"), Role::Teacher);
        directory.join(7, &user("a"), Role::Student);
        directory.join(7, &user("b"), Role::Student);
        directory.join(8, &user("c"), Role::Student);

        assert_eq!(directory.member_count(7), 3);
        assert_eq!(directory.student_count(7), 2);
        assert_eq!(directory.teacher_count(7), 1);
        assert_eq!(directory.members(7, Audience::Students), vec![user("a"), user("b")]);
        assert_eq!(directory.members(7, Audience::Teacher), vec![user("t")]);
        assert_eq!(directory.session_of(&user("c")), Some((8, Role::Student)));
        assert_eq!(directory.session_count(), 2);
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut directory = SessionDirectory::new();

        directory.join(7, &user("a"), Role::Student);
        directory.join(7, &user("a"), Role::Student);

        assert_eq!(directory.member_count(7), 1);
        assert_eq!(directory.student_count(7), 1);
    }

    #[test]
    fn test_join_moves_between_roles_and_sessions() {
        let mut directory = SessionDirectory::new();

        directory.join(7, &user("a"), Role::Student);
        directory.join(7, &user("a"), Role::Teacher);

        assert_eq!(directory.student_count(7), 0);
        assert_eq!(directory.teacher_count(7), 1);
        assert_eq!(directory.member_count(7), 1);

        directory.join(9, &user("a"), Role::Teacher);

        assert!(!directory.contains(7));
        assert_eq!(directory.session_of(&user("a")), Some((9, Role::Teacher)));
    }

    #[test]
    fn test_leave() {
        let mut directory = SessionDirectory::new();

        directory.join(7, &user("t"), Role::Teacher);
        directory.join(7, &user("a"), Role::Student);

        assert_eq!(directory.leave(8, &user("a")), Departure::NotMember);
        assert_eq!(directory.leave(7, &user("a")), Departure::Left);
        assert_eq!(directory.leave(7, &user("a")), Departure::NotMember);
        assert_eq!(directory.session_of(&user("a")), None);
        assert_eq!(directory.member_count(7), 1);

        assert_eq!(directory.leave(7, &user("t")), Departure::Teardown);
        assert!(!directory.contains(7));
    }

    #[test]
    fn test_teardown_clears_session() {
        let mut directory = SessionDirectory::new();

        directory.join(7, &user("a"), Role::Student);
        directory.join(7, &user("b"), Role::Student);
        directory.join(8, &user("c"), Role::Student);

        assert_eq!(directory.teardown(7), vec![user("a"), user("b")]);
        assert!(!directory.contains(7));
        assert_eq!(directory.session_of(&user("a")), None);
        assert_eq!(directory.members(7, Audience::All), Vec::<UserId>::new());
        assert_eq!(directory.member_count(8), 1);
        assert!(directory.teardown(7).is_empty());
    }
}
