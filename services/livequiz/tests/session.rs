mod common;

use common::{spawn, Participant};
use flux::logging;
use livequiz::server::QuizServer;
use livequiz::store::{JournalStore, MemoryStore};
use relay::net::endpoint::StopReason;
use serde_json::json;
use std::fs;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

#[test]
fn test_teacher_and_students_end_to_end() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    let joined = teacher.receive();
    assert_eq!(joined["action"], "newteacher");
    assert_eq!(joined["name"], "T");
    assert_eq!(joined["count"], 1);

    let mut alice = Participant::join(address, 7, "A", false);
    for message in vec![alice.receive(), teacher.receive()] {
        assert_eq!(message["action"], "newuser");
        assert_eq!(message["count"], 1);
        assert_eq!(Participant::roster(&message), vec!["A"]);
        assert_eq!(message["students"][0]["usersocketid"], alice.id.as_str());
        assert_eq!(message["students"][0]["picture"], "A.png");
    }

    let mut bob = Participant::join(address, 7, "B", false);
    for message in vec![bob.receive(), alice.receive(), teacher.receive()] {
        assert_eq!(message["action"], "newuser");
        assert_eq!(message["count"], 2);
        assert_eq!(Participant::roster(&message), vec!["A", "B"]);
    }

    drop(teacher);

    assert!(alice.client.wait_closed());
    assert!(bob.client.wait_closed());

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Idle);
    assert_eq!(server.store().calls(), &[7]);
    assert!(!server.directory().contains(7));
}

#[test]
fn test_teardown_leaves_other_sessions_alone() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut other = Participant::join(address, 8, "O", true);
    assert_eq!(other.receive()["action"], "newteacher");

    let mut teacher = Participant::join(address, 7, "T", true);
    assert_eq!(teacher.receive()["count"], 1);

    let mut students: Vec<Participant> = (0..3)
        .map(|index| {
            let mut student = Participant::join(address, 7, &format!("S{}", index), false);
            assert_eq!(student.receive()["count"], index + 1);
            student
        })
        .collect();

    drop(teacher);

    for student in students.iter_mut() {
        assert!(student.client.wait_closed());
    }

    // The other session is still served
    other.send(json!({"action": "countusers"}));
    assert_eq!(other.receive(), json!({"action": "countusers", "count": 0}));

    other.send(json!({"action": "shutdownTest"}));
    assert!(other.client.wait_closed());

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Shutdown);
    assert_eq!(server.store().calls(), &[7]);
    assert!(!server.directory().contains(7));
    assert_eq!(server.directory().session_of(&students[0].id.as_str().into()), None);
}

#[test]
fn test_student_departure_is_announced() {
    let (address, _) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    let mut alice = Participant::join(address, 7, "A", false);
    alice.receive();
    teacher.receive();

    let mut bob = Participant::join(address, 7, "B", false);
    bob.receive();
    alice.receive();
    teacher.receive();

    let bob_id = bob.id.clone();
    drop(bob);

    for message in vec![teacher.receive(), alice.receive()] {
        assert_eq!(message["action"], "userdisconnected");
        assert_eq!(message["usersocketid"], bob_id.as_str());
        assert_eq!(message["count"], 1);
        assert_eq!(message["message"], "B left the session");
    }
}

#[test]
fn test_countusers_is_broadcast() {
    let (address, _) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    let mut alice = Participant::join(address, 7, "A", false);
    alice.receive();
    teacher.receive();

    alice.send(json!({"action": "countusers", "sid": 7, "cmid": 3}));

    let expected = json!({"action": "countusers", "count": 1});
    assert_eq!(alice.receive(), expected);
    assert_eq!(teacher.receive(), expected);
}

#[test]
fn test_malformed_and_unknown_messages() {
    let (address, _) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut client = Participant::connect(address);

    client.client.send_text("{not json").unwrap();
    let reply = client.receive();
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["reply_status"], false);

    client.send(json!({"action": "newuser", "sid": "seven"}));
    assert_eq!(client.receive()["action"], "error");

    // Neither of these produce a reply
    client.send(json!({"action": "countusers", "sid": 7}));
    client.send(json!({"action": "nextquestion", "sid": 7}));

    client.send(json!({"action": "newuser", "sid": "7", "name": "T", "isteacher": true}));
    let joined = client.receive();
    assert_eq!(joined["action"], "newteacher");
    assert_eq!(joined["count"], 1);
}

#[test]
fn test_rejoin_does_not_duplicate() {
    let (address, _) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    let mut alice = Participant::join(address, 7, "A", false);
    alice.receive();
    teacher.receive();

    alice.send(json!({"action": "newuser", "sid": 7, "name": "A", "isteacher": false}));

    let message = alice.receive();
    assert_eq!(message["count"], 1);
    assert_eq!(Participant::roster(&message), vec!["A"]);
}

#[test]
fn test_shutdown_closes_everyone() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    let mut alice = Participant::join(address, 7, "A", false);
    alice.receive();
    teacher.receive();

    alice.send(json!({"action": "shutdownTest"}));

    assert!(alice.client.wait_closed());
    assert!(teacher.client.wait_closed());

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Shutdown);
    assert!(server.store().calls().is_empty());
}

#[test]
fn test_finished_sessions_are_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.jsonl");
    let store = JournalStore::open(&path).unwrap();

    let (address, handle) = spawn(QuizServer::new(store, &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();
    drop(teacher);

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Idle);
    assert!(server.store().is_finished(7));

    let journal = fs::read_to_string(&path).unwrap();
    let entry: serde_json::Value = serde_json::from_str(journal.lines().next().unwrap()).unwrap();

    assert_eq!(journal.lines().count(), 1);
    assert_eq!(entry["sid"], 7);
    assert_eq!(entry["status"], "finished");
}

#[test]
fn test_idle_stop_waits_for_unfinished_handshake() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    // Never sends an upgrade request
    let raw = TcpStream::connect(address).unwrap();
    thread::sleep(Duration::from_millis(100));

    drop(teacher);
    thread::sleep(Duration::from_millis(100));
    assert!(!handle.is_finished());

    drop(raw);

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Idle);
    assert_eq!(server.store().calls(), &[7]);
}

#[test]
fn test_idle_stop_after_last_student_leaves() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut student = Participant::join(address, 8, "S", false);
    assert_eq!(student.receive()["count"], 1);

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();
    drop(teacher);
    thread::sleep(Duration::from_millis(100));

    // The other session is unaffected by the teardown
    student.send(json!({"action": "countusers"}));
    assert_eq!(student.receive(), json!({"action": "countusers", "count": 1}));

    drop(student);

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Idle);
    assert_eq!(server.store().calls(), &[7]);
    assert_eq!(server.directory().session_count(), 0);
}

#[test]
fn test_teacher_cannot_rejoin_as_student() {
    let (address, handle) = spawn(QuizServer::new(MemoryStore::new(), &logging::discard()));

    let mut teacher = Participant::join(address, 7, "T", true);
    teacher.receive();

    let mut alice = Participant::join(address, 7, "A", false);
    alice.receive();
    teacher.receive();

    teacher.send(json!({"action": "newuser", "sid": 7, "name": "T", "isteacher": false}));
    let reply = teacher.receive();
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["reply_status"], false);

    // Still the teacher: leaving ends the session
    drop(teacher);
    assert!(alice.client.wait_closed());

    let (reason, server) = handle.join().unwrap();

    assert_eq!(reason, StopReason::Idle);
    assert_eq!(server.store().calls(), &[7]);
}
