//! Line commands of the `peerbook` binary.
//!
//! Each line read from stdin is parsed into a [`Command`] and run against the
//! node; the outcome is printed as one line of text.

use std::sync::Arc;

use peerbook_net::PeerSession;
use peerbook_shared::{Contact, Person};

use crate::contacts::ContactStore;
use crate::friends::FriendRequestProtocol;

pub const HELP: &str = "\
commands:
  add <username>              send a friend request
  accept <username>           accept an incoming request
  reject <username>           reject an incoming request
  group <name> <member>...    create a group of contacts
  list                        show contacts and pending requests
  status                      show session state and connected peers
  republish                   publish the presence record again
  help                        show this text
  quit                        stop the node";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Accept(String),
    Reject(String),
    Group { name: String, members: Vec<String> },
    List,
    Status,
    Republish,
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Empty lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<String> = words.map(str::to_string).collect();

        let one = |verb: &str| -> Result<String, String> {
            match args.as_slice() {
                [name] => Ok(name.clone()),
                _ => Err(format!("usage: {verb} <username>")),
            }
        };

        let command = match verb {
            "add" => Command::Add(one("add")?),
            "accept" => Command::Accept(one("accept")?),
            "reject" => Command::Reject(one("reject")?),
            "group" => match args.split_first() {
                Some((name, members)) if !members.is_empty() => Command::Group {
                    name: name.clone(),
                    members: members.to_vec(),
                },
                _ => return Err("usage: group <name> <member>...".to_string()),
            },
            "list" | "ls" => Command::List,
            "status" => Command::Status,
            "republish" => Command::Republish,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(command))
    }
}

/// Runs commands against a started node.
pub struct Console {
    pub session: Arc<PeerSession>,
    pub protocol: Arc<FriendRequestProtocol>,
    pub contacts: Arc<ContactStore>,
}

impl Console {
    /// Execute `command` and describe the outcome. `Quit` is left to the caller.
    pub async fn run(&self, command: Command) -> String {
        match command {
            Command::Add(username) => match self.protocol.send_request(&username).await {
                Ok(person) => format!("request sent to {person}"),
                Err(e) => format!("error: {e}"),
            },
            Command::Accept(username) => {
                match self.protocol.confirm_friend(&self.pending(&username)).await {
                    Ok(person) => format!("{person} is now a contact"),
                    Err(e) => format!("error: {e}"),
                }
            }
            Command::Reject(username) => {
                match self.protocol.reject_friend(&self.pending(&username)).await {
                    Ok(person) => format!("rejected {person}"),
                    Err(e) => format!("error: {e}"),
                }
            }
            Command::Group { name, members } => {
                let members: Vec<Person> = members
                    .into_iter()
                    .map(|username| Person::new(username, "", 0))
                    .collect();
                match self.contacts.create_group(&name, &members) {
                    Ok(group) => format!("group {} created with {} members", group.name, group.len()),
                    Err(e) => format!("error: {e}"),
                }
            }
            Command::List => self.listing(),
            Command::Status => {
                let peers = match self.session.connected_peers().await {
                    Ok(peers) => peers.len().to_string(),
                    Err(e) => format!("unknown ({e})"),
                };
                let record = self
                    .session
                    .published_record()
                    .map(|r| format!("{}:{}", r.address, r.port))
                    .unwrap_or_else(|| "not published".to_string());
                format!(
                    "state {:?}, presence {record}, {peers} connected peers",
                    self.session.state()
                )
            }
            Command::Republish => match self.session.republish().await {
                Ok(record) => format!("published {}:{}", record.address, record.port),
                Err(e) => format!("error: {e}"),
            },
            Command::Help | Command::Quit => HELP.to_string(),
        }
    }

    /// The pending incoming request of `username`, or a placeholder that the
    /// store will report as not pending.
    fn pending(&self, username: &str) -> Person {
        self.contacts
            .incoming_requests()
            .into_iter()
            .find(|p| p.username == username)
            .unwrap_or_else(|| Person::new(username, "", 0))
    }

    fn listing(&self) -> String {
        let mut out = Vec::new();
        for contact in self.contacts.contacts() {
            match contact {
                Contact::Person(p) => out.push(format!("  contact   {p}")),
                Contact::Group(g) => {
                    let names: Vec<&str> = g.members().iter().map(|m| m.username.as_str()).collect();
                    out.push(format!("  group     {} [{}]", g.name, names.join(", ")));
                }
            }
        }
        for p in self.contacts.outgoing_requests() {
            out.push(format!("  sent      {p}"));
        }
        for p in self.contacts.incoming_requests() {
            out.push(format!("  received  {p}"));
        }
        if out.is_empty() {
            "no contacts or pending requests".to_string()
        } else {
            out.join("\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("   "), Ok(None));
        assert_eq!(
            Command::parse("add bob"),
            Ok(Some(Command::Add("bob".to_string())))
        );
        assert_eq!(
            Command::parse("group Team alice bob"),
            Ok(Some(Command::Group {
                name: "Team".to_string(),
                members: vec!["alice".to_string(), "bob".to_string()],
            }))
        );
        assert_eq!(Command::parse("ls"), Ok(Some(Command::List)));
        assert_eq!(Command::parse("exit"), Ok(Some(Command::Quit)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("add").is_err());
        assert!(Command::parse("accept a b").is_err());
        assert!(Command::parse("group Team").is_err());
        assert!(Command::parse("dance").is_err());
    }
}
