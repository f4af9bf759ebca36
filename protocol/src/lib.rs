//! Out-of-band wire format spoken by the game servers.
//!
//! Every datagram starts with four `0xFF` bytes followed by an ASCII payload.
//! Requests are either `getstatus` or `rcon <password> <command>`. A status
//! response carries a marker line, a line of backslash-delimited key/value
//! pairs and one line per connected player.

use std::borrow::Cow;
use std::collections::BTreeMap;
use thiserror::Error;

/// Marks a datagram as a control message rather than in-game traffic.
pub const OOB_PREFIX: [u8; 4] = [0xFF; 4];

/// Port game servers listen on when none is configured.
pub const DEFAULT_PORT: u16 = 27960;

/// Largest datagram we expect to receive from a game server.
pub const MAX_PACKET_SIZE: usize = 16384;

const STATUS_MARKER: &str = "statusResponse";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("packet is missing the out-of-band prefix")]
    MissingPrefix,
    #[error("status response has no key/value line")]
    MissingInfoLine,
    #[error("rcon request is missing a password")]
    MissingPassword,
    #[error("unknown out-of-band command: {0}")]
    UnknownCommand(String),
}

/// A request sent to a game server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    GetStatus,
    Rcon { password: String, command: String },
}

impl Packet {
    /// Builds an `rcon <password> qsay "<text>"` request. The text is passed
    /// through [`escape_string`] so it cannot break out of the quotes.
    pub fn qsay(password: &str, text: &str) -> Self {
        Packet::Rcon {
            password: password.to_string(),
            command: format!("qsay \"{}\"", escape_string(text)),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload = match self {
            Packet::GetStatus => Cow::Borrowed("getstatus"),
            Packet::Rcon { password, command } => {
                Cow::Owned(format!("rcon {} {}", password, command))
            }
        };

        let mut data = Vec::with_capacity(OOB_PREFIX.len() + payload.len());
        data.extend_from_slice(&OOB_PREFIX);
        data.extend_from_slice(payload.as_bytes());
        data
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let payload = strip_prefix(bytes)?;
        let text = String::from_utf8_lossy(payload);
        let text = text.trim_end_matches(['\n', '\0']);

        if text == "getstatus" {
            return Ok(Packet::GetStatus);
        }

        match text.strip_prefix("rcon ") {
            Some(rest) => {
                let (password, command) = rest.split_once(' ').unwrap_or((rest, ""));
                if password.is_empty() {
                    return Err(ProtocolError::MissingPassword);
                }
                Ok(Packet::Rcon {
                    password: password.to_string(),
                    command: command.to_string(),
                })
            }
            None => Err(ProtocolError::UnknownCommand(text.to_string())),
        }
    }
}

/// Decoded answer to a `getstatus` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub keys: BTreeMap<String, String>,
    pub players: Vec<String>,
}

impl ServerStatus {
    /// The server's display name, taken from `sv_hostname`.
    pub fn hostname(&self) -> Option<&str> {
        self.keys.get("sv_hostname").map(String::as_str)
    }

    /// Parses a status response.
    ///
    /// Line 0 is the connection marker and is ignored. Line 1 holds the
    /// `\key\value` pairs. Every following line is one player whose name is
    /// the first double-quoted substring; lines without a quote are skipped.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(bytes);
        let mut lines = text.split('\n').skip(1);

        let info = lines.next().ok_or(ProtocolError::MissingInfoLine)?;
        let keys = parse_info_string(info.trim_end_matches('\r'));

        let players = lines
            .filter_map(|line| line.split('"').nth(1))
            .map(str::to_string)
            .collect();

        Ok(ServerStatus { keys, players })
    }

    /// Renders the response a game server would send for this status.
    pub fn encode(&self) -> Vec<u8> {
        let mut text = String::from(STATUS_MARKER);
        text.push('\n');
        for (key, value) in &self.keys {
            text.push('\\');
            text.push_str(key);
            text.push('\\');
            text.push_str(value);
        }
        text.push('\n');
        for player in &self.players {
            text.push_str(&format!("0 0 \"{}\"\n", player));
        }

        let mut data = OOB_PREFIX.to_vec();
        data.extend_from_slice(text.as_bytes());
        data
    }
}

fn strip_prefix(bytes: &[u8]) -> Result<&[u8], ProtocolError> {
    bytes
        .strip_prefix(&OOB_PREFIX[..])
        .ok_or(ProtocolError::MissingPrefix)
}

fn parse_info_string(info: &str) -> BTreeMap<String, String> {
    let mut keys = BTreeMap::new();
    let mut fields = info.strip_prefix('\\').unwrap_or(info).split('\\');

    while let Some(key) = fields.next() {
        let value = fields.next().unwrap_or_default();
        if !key.is_empty() {
            keys.insert(key.to_string(), value.to_string());
        }
    }

    keys
}

/// Drops every character that could break an RCON command line.
///
/// Only printable ASCII (32..=126) survives, minus `"`, `;` and `\`.
pub fn escape_string(text: &str) -> String {
    text.chars()
        .filter(|&c| matches!(c, ' '..='~') && !matches!(c, '"' | ';' | '\\'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_removes_command_separators() {
        assert_eq!(escape_string("He said \"hi\"; bye\\"), "He said hi bye");
    }

    #[test]
    fn test_escape_empty_input() {
        assert_eq!(escape_string(""), "");
    }

    #[test]
    fn test_escape_only_keeps_safe_printable_ascii() {
        let input: String = (0u32..0x300).filter_map(char::from_u32).collect();
        let escaped = escape_string(&input);

        assert_eq!(escaped.len(), 95 - 3);
        for c in escaped.chars() {
            let code = c as u32;
            assert!((32..=126).contains(&code), "unexpected char {:?}", c);
            assert!(![34, 59, 92].contains(&code), "unexpected char {:?}", c);
        }
    }

    #[test]
    fn test_escape_drops_non_ascii_and_control_chars() {
        assert_eq!(escape_string("héllo\twörld\n"), "hllowrld");
    }

    #[test]
    fn test_getstatus_encoding() {
        assert_eq!(Packet::GetStatus.encode(), b"\xff\xff\xff\xffgetstatus".to_vec());
    }

    #[test]
    fn test_qsay_encoding_escapes_text() {
        let packet = Packet::qsay("secret", "A@Alice: \"hi\"; quit");
        assert_eq!(
            packet.encode(),
            b"\xff\xff\xff\xffrcon secret qsay \"A@Alice: hi quit\"".to_vec()
        );
    }

    #[test]
    fn test_decode_rcon_request() {
        let packet = Packet::decode(b"\xff\xff\xff\xffrcon pw qsay \"hello there\"\n").unwrap();
        assert_eq!(
            packet,
            Packet::Rcon {
                password: "pw".to_string(),
                command: "qsay \"hello there\"".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_bad_requests() {
        assert_eq!(Packet::decode(b"getstatus"), Err(ProtocolError::MissingPrefix));
        assert_eq!(
            Packet::decode(b"\xff\xff\xff\xffrcon "),
            Err(ProtocolError::MissingPassword)
        );
        assert!(matches!(
            Packet::decode(b"\xff\xff\xff\xffgetinfo"),
            Err(ProtocolError::UnknownCommand(cmd)) if cmd == "getinfo"
        ));
    }

    #[test]
    fn test_status_response_parsing() {
        let response = b"\xff\xff\xff\xffstatusResponse\n\\sv_hostname\\^1Red Server\\mapname\\oasis\\g_gametype\\4\n12 50 \"Alice\"\n0 999 \"Bob the ^2Builder\"\n";
        let status = ServerStatus::decode(response).unwrap();

        assert_eq!(status.hostname(), Some("^1Red Server"));
        assert_eq!(status.keys.get("mapname").map(String::as_str), Some("oasis"));
        assert_eq!(status.keys.get("g_gametype").map(String::as_str), Some("4"));
        assert_eq!(status.players, vec!["Alice", "Bob the ^2Builder"]);
    }

    #[test]
    fn test_status_response_with_empty_value_and_no_players() {
        let status = ServerStatus::decode(b"statusResponse\n\\sv_hostname\\\\version\\1.0\n").unwrap();

        assert_eq!(status.hostname(), Some(""));
        assert_eq!(status.keys.get("version").map(String::as_str), Some("1.0"));
        assert!(status.players.is_empty());
    }

    #[test]
    fn test_status_response_skips_unquoted_player_lines() {
        let status = ServerStatus::decode(b"marker\n\\sv_hostname\\x\ngarbage\n1 2 \"Carol\"").unwrap();
        assert_eq!(status.players, vec!["Carol"]);
    }

    #[test]
    fn test_malformed_status_response() {
        assert_eq!(ServerStatus::decode(b""), Err(ProtocolError::MissingInfoLine));
        assert_eq!(
            ServerStatus::decode(b"\xff\xff\xff\xffstatusResponse"),
            Err(ProtocolError::MissingInfoLine)
        );
    }

    #[test]
    fn test_status_encoding_is_decodable() {
        let mut status = ServerStatus::default();
        status.keys.insert("sv_hostname".to_string(), "Blue".to_string());
        status.players.push("Dave".to_string());

        let decoded = ServerStatus::decode(&status.encode()).unwrap();
        assert_eq!(decoded, status);
    }
}
