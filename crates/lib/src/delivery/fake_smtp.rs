//! Loopback SMTP server for strategy tests. Accepts any AUTH, records RCPT lines and
//! message data, and refuses one recipient when asked.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

#[derive(Default)]
struct Session {
    recipients: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

pub(crate) struct FakeSmtp {
    pub addr: SocketAddr,
    session: Arc<Session>,
}

impl FakeSmtp {
    /// `refuse` is an address whose RCPT gets a 550. `queued` is the reply to a completed DATA.
    pub async fn start(refuse: Option<&str>, queued: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let session = Arc::new(Session::default());
        let refuse = refuse.map(|a| format!("<{}>", a));
        let queued = format!("{}\r\n", queued);
        let shared = session.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let session = shared.clone();
                let refuse = refuse.clone();
                let queued = queued.clone();
                tokio::spawn(async move {
                    let _ = converse(stream, &session, refuse.as_deref(), &queued).await;
                });
            }
        });
        Self { addr, session }
    }

    pub fn recipients(&self) -> Vec<String> {
        self.session.recipients.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.session.messages.lock().unwrap().clone()
    }
}

async fn converse(
    stream: TcpStream,
    session: &Session,
    refuse: Option<&str>,
    queued: &str,
) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    write.write_all(b"220 fake.test ESMTP\r\n").await?;
    while let Some(line) = lines.next_line().await? {
        let verb = line.to_ascii_uppercase();
        let reply = if verb.starts_with("EHLO") {
            "250-fake.test\r\n250 AUTH PLAIN LOGIN\r\n".to_string()
        } else if verb.starts_with("AUTH") {
            "235 2.7.0 Authentication successful\r\n".to_string()
        } else if verb.starts_with("RCPT TO:") {
            session.recipients.lock().unwrap().push(line.clone());
            if refuse.is_some_and(|r| line.contains(r)) {
                "550 5.1.1 Mailbox unavailable\r\n".to_string()
            } else {
                "250 2.1.5 Ok\r\n".to_string()
            }
        } else if verb == "DATA" {
            write.write_all(b"354 End data with <CR><LF>.<CR><LF>\r\n").await?;
            let mut data = String::new();
            while let Some(l) = lines.next_line().await? {
                if l == "." {
                    break;
                }
                data.push_str(&l);
                data.push('\n');
            }
            session.messages.lock().unwrap().push(data);
            queued.to_string()
        } else if verb.starts_with("QUIT") {
            write.write_all(b"221 2.0.0 Bye\r\n").await?;
            return Ok(());
        } else {
            "250 2.0.0 Ok\r\n".to_string()
        };
        write.write_all(reply.as_bytes()).await?;
    }
    Ok(())
}
