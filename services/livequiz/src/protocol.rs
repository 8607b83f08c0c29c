//! JSON messages exchanged with the quiz clients. Every message is an object keyed by `action`.

use crate::directory::SessionId;
use relay::net::user::UserId;
use serde::de::{Deserializer, Error};
use serde::Deserialize as _;
use serde_derive::{Deserialize, Serialize};

/// Client to server messages.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "action")]
pub enum Inbound {
    #[serde(rename = "newuser")]
    NewUser(Arrival),
    #[serde(rename = "countusers")]
    CountUsers,
    #[serde(rename = "shutdownTest")]
    ShutdownTest,
    #[serde(other)]
    Unknown,
}

impl Inbound {
    #[inline]
    pub fn decode(message: &[u8]) -> serde_json::Result<Inbound> {
        serde_json::from_slice(message)
    }
}

/// Payload of `newuser`, the first message of every client.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Arrival {
    #[serde(deserialize_with = "numeric")]
    pub sid: SessionId,
    #[serde(default, deserialize_with = "optional_numeric")]
    pub cmid: Option<u64>,
    #[serde(default, deserialize_with = "optional_numeric")]
    pub userid: Option<u64>,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "picture")]
    pub pic: String,
    /// Only a literal `true` makes a teacher.
    #[serde(default, deserialize_with = "strict_flag")]
    pub isteacher: bool,
}

/// Server to client messages.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Outbound {
    Connect {
        usersocketid: UserId,
    },
    NewTeacher {
        name: String,
        userid: Option<u64>,
        message: String,
        count: usize,
    },
    NewUser {
        students: Vec<StudentEntry>,
        count: usize,
    },
    CountUsers {
        count: usize,
    },
    UserDisconnected {
        usersocketid: UserId,
        message: String,
        count: usize,
    },
    Error {
        reply_status: bool,
        message: String,
    },
}

impl Outbound {
    #[inline]
    pub fn error<M: Into<String>>(message: M) -> Outbound {
        Outbound::Error {
            reply_status: false,
            message: message.into(),
        }
    }

    #[inline]
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One row of the student roster.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StudentEntry {
    pub picture: String,
    pub usersocketid: UserId,
    pub name: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(u64),
    Text(String),
}

impl Numeric {
    fn resolve<E: Error>(self) -> Result<u64, E> {
        match self {
            Numeric::Number(number) => Ok(number),
            Numeric::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a numeric id, got {:?}", text))),
        }
    }
}

fn numeric<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Numeric::deserialize(deserializer)?.resolve()
}

fn optional_numeric<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<Numeric>::deserialize(deserializer)? {
        Some(value) => value.resolve().map(Some),
        None => Ok(None),
    }
}

fn strict_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value == serde_json::Value::Bool(true))
}
