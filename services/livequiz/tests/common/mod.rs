#![allow(dead_code)]

use flux::logging;
use relay::net::client::Client;
use relay::net::endpoint::{Endpoint, Settings, StopReason};
use relay::net::handler::MessageHandler;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;

pub fn settings() -> Settings {
    Settings {
        address: "127.0.0.1:0".parse().unwrap(),
        ..Settings::default()
    }
}

/// Runs an endpoint on its own thread. The thread hands back the stop reason and the handler.
pub fn spawn<H>(handler: H) -> (SocketAddr, thread::JoinHandle<(StopReason, H)>)
where
    H: MessageHandler + Send + 'static,
{
    let (tx, rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let mut endpoint = Endpoint::new(settings(), handler, &logging::discard()).unwrap();
        tx.send(endpoint.local_addr().unwrap()).unwrap();
        let reason = endpoint.run().unwrap();
        (reason, endpoint.into_handler())
    });

    (rx.recv().unwrap(), handle)
}

pub fn receive_json(client: &mut Client) -> Value {
    serde_json::from_str(&client.receive_text().unwrap()).unwrap()
}

pub struct Participant {
    pub client: Client,
    pub id: String,
}

impl Participant {
    /// Connects and consumes the `connect` greeting.
    pub fn connect(address: SocketAddr) -> Participant {
        let mut client = Client::connect(address).unwrap();
        let greeting = receive_json(&mut client);

        assert_eq!(greeting["action"], "connect");

        let id = greeting["usersocketid"].as_str().unwrap().to_string();
        Participant { client, id }
    }

    /// Connects and announces itself with `newuser`.
    pub fn join(address: SocketAddr, sid: u64, name: &str, teacher: bool) -> Participant {
        let mut participant = Participant::connect(address);
        participant.send(json!({
            "action": "newuser",
            "sid": sid,
            "cmid": 3,
            "userid": 100,
            "name": name,
            "pic": format!("{}.png", name),
            "isteacher": teacher
        }));
        participant
    }

    pub fn send(&mut self, message: Value) {
        self.client.send_text(&message.to_string()).unwrap();
    }

    pub fn receive(&mut self) -> Value {
        receive_json(&mut self.client)
    }

    /// Names in the roster of a `newuser` broadcast.
    pub fn roster(message: &Value) -> Vec<String> {
        message["students"]
            .as_array()
            .unwrap()
            .iter()
            .map(|student| student["name"].as_str().unwrap().to_string())
            .collect()
    }
}
