use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;

use log::info;
use thiserror::Error;

use crate::protocol::{Reply, ADMIN_MAGIC, IMAGING_MAGIC};
use crate::session::Session;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach the queue server: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode the request: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("server closed the connection without replying")]
    NoReply,
}

/// Blocking client for the queue server. One connection per message.
pub struct Submitter {
    addr: String,
}

impl Submitter {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn submit(&self, session: &Session) -> Result<Reply, ClientError> {
        let mut message = serde_json::to_value(session)?;
        if let Some(fields) = message.as_object_mut() {
            fields.insert("magic".to_string(), IMAGING_MAGIC.into());
        }
        self.roundtrip(&message)
    }

    pub fn set_intake(&self, enable: bool) -> Result<Reply, ClientError> {
        let message = serde_json::json!({
            "magic": ADMIN_MAGIC,
            "type": "state",
            "action": if enable { "enable" } else { "disable" },
        });
        self.roundtrip(&message)
    }

    fn roundtrip(&self, message: &serde_json::Value) -> Result<Reply, ClientError> {
        info!("Connecting to {}", self.addr);
        let stream = TcpStream::connect(&self.addr)?;
        let mut writer = stream.try_clone()?;

        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        writer.write_all(line.as_bytes())?;
        writer.flush()?;

        let mut reply = String::new();
        if BufReader::new(stream).read_line(&mut reply)? == 0 {
            return Err(ClientError::NoReply);
        }
        Ok(serde_json::from_str(reply.trim())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{SocketAddr, TcpListener};
    use std::thread::JoinHandle;

    fn session() -> Session {
        Session {
            targets: vec!["m31".to_string()],
            exposure_time: 60.0,
            exposure_count: 1,
            filters: Vec::new(),
            rgb: false,
            binning: 2,
            user: "sam".to_string(),
            close_after: true,
            test_only: false,
            nodark: false,
            nobias: false,
        }
    }

    /// Accepts one connection, replies with the given line, and hands the
    /// received request back through the join handle.
    fn serve_once(reply: &'static str) -> (SocketAddr, JoinHandle<serde_json::Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut line)
                .unwrap();
            stream.write_all(reply.as_bytes()).unwrap();
            stream.write_all(b"\n").unwrap();
            serde_json::from_str(line.trim()).unwrap()
        });
        (addr, handle)
    }

    #[test]
    fn submit_wraps_the_session_with_the_imaging_magic() {
        let (addr, handle) = serve_once(r#"{"magic":32286}"#);
        let reply = Submitter::new(addr.to_string()).submit(&session()).unwrap();
        assert!(reply.is_ack());
        assert_eq!(reply.magic, IMAGING_MAGIC);

        let request = handle.join().unwrap();
        assert_eq!(request["magic"], IMAGING_MAGIC);
        assert_eq!(request["user"], "sam");
        assert_eq!(request["targets"][0], "m31");
    }

    #[test]
    fn set_intake_sends_a_state_message() {
        let (addr, handle) = serve_once(r#"{"magic":44401}"#);
        let reply = Submitter::new(addr.to_string()).set_intake(true).unwrap();
        assert!(reply.is_ack());

        let request = handle.join().unwrap();
        assert_eq!(request["magic"], ADMIN_MAGIC);
        assert_eq!(request["type"], "state");
        assert_eq!(request["action"], "enable");
    }

    #[test]
    fn a_silent_server_is_reported_as_such() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream).read_line(&mut line).unwrap();
        });

        let err = Submitter::new(addr.to_string())
            .submit(&session())
            .unwrap_err();
        assert!(matches!(err, ClientError::NoReply));
        handle.join().unwrap();
    }
}
