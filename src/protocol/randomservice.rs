//! Random-service endpoint (spec §5.8, implicit in §2/§4.3): serves
//! handshake nonces by proxying `GET_RANDOM_BYTES` requests to the
//! out-of-process random-byte oracle.

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::error::WireError;
use crate::framing::{read_boxed, write_boxed};

const GET_RANDOM_BYTES: u32 = 0;

struct Request {
    count: u32,
    reply: oneshot::Sender<Result<Vec<u8>, WireError>>,
}

#[derive(Clone)]
pub struct Handle {
    tx: mpsc::Sender<Request>,
}

impl Handle {
    pub async fn get_random_bytes(&self, count: u32) -> Result<Vec<u8>, WireError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { count, reply })
            .await
            .map_err(|_| WireError::Fatal("random service endpoint gone"))?;
        rx.await.map_err(|_| WireError::Fatal("random service endpoint dropped reply"))?
    }
}

pub fn spawn(stream: TcpStream) -> Handle {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(stream, rx));
    Handle { tx }
}

async fn run(mut stream: TcpStream, mut inbox: mpsc::Receiver<Request>) {
    while let Some(req) = inbox.recv().await {
        let mut frame = Vec::with_capacity(8);
        frame.extend_from_slice(&GET_RANDOM_BYTES.to_be_bytes());
        frame.extend_from_slice(&req.count.to_be_bytes());

        let outcome = async {
            write_boxed(&mut stream, &frame).await?;
            read_boxed(&mut stream).await
        }
        .await;
        let _ = req.reply.send(outcome);
    }
}
