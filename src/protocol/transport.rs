use std::{
    io::{self, Read, Write},
    net::TcpStream,
};

use log::{debug, trace};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tungstenite::{
    Message, WebSocket,
    error::ProtocolError,
    protocol::frame::coding::CloseCode,
    stream::MaybeTlsStream,
};

use crate::connection::ConnConfig;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to decode message: {0}")]
    Deserialize(serde_json::Error),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("connection closed by peer (code {code}): {reason}")]
    Closed { code: u16, reason: String },
    #[error("received a binary frame that is not valid UTF-8")]
    NonUtf8,
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the peer went away without a closing handshake.
    pub fn is_abnormal_closure(&self) -> bool {
        let unexpected_eof = |e: &io::Error| e.kind() == io::ErrorKind::UnexpectedEof;

        match self {
            TransportError::WebSocket(tungstenite::Error::Protocol(
                ProtocolError::ResetWithoutClosingHandshake,
            )) => true,
            TransportError::WebSocket(tungstenite::Error::Io(e)) => unexpected_eof(e),
            TransportError::Io(e) => unexpected_eof(e),
            TransportError::Closed { code, .. } => *code == u16::from(CloseCode::Abnormal),
            _ => false,
        }
    }
}

/// A duplex message socket carrying one JSON document per message.
pub trait MessageSocket {
    fn write_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Blocks until the next text message arrives. Control frames are skipped.
    fn read_text(&mut self) -> Result<String, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;

    fn enable_write_compression(&mut self, enabled: bool);
}

impl<S: MessageSocket + ?Sized> MessageSocket for Box<S> {
    fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        (**self).write_text(text)
    }

    fn read_text(&mut self) -> Result<String, TransportError> {
        (**self).read_text()
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn enable_write_compression(&mut self, enabled: bool) {
        (**self).enable_write_compression(enabled)
    }
}

impl<S: Read + Write> MessageSocket for WebSocket<S> {
    fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(Message::Text(text.into()))?;
        Ok(())
    }

    fn read_text(&mut self) -> Result<String, TransportError> {
        loop {
            match self.read()? {
                Message::Text(text) => return Ok(text.as_str().to_owned()),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes.to_vec()).map_err(|_| TransportError::NonUtf8);
                }
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.as_str().to_owned()))
                        .unwrap_or((u16::from(CloseCode::Status), String::new()));
                    return Err(TransportError::Closed { code, reason });
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match WebSocket::close(self, None) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => return Err(e.into()),
        }

        // Drain until the peer acknowledges the close frame.
        loop {
            match self.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn enable_write_compression(&mut self, enabled: bool) {
        // tungstenite never negotiates permessage-deflate, outbound frames stay uncompressed.
        trace!("write compression requested: {enabled}, frames are sent uncompressed");
    }
}

/// Opens a plain `ws://host:port` socket with write compression disabled.
pub fn connect(
    conf: &ConnConfig,
) -> Result<WebSocket<MaybeTlsStream<TcpStream>>, TransportError> {
    let url = conf.url();
    debug!("connecting to {url}");

    let (mut ws, resp) = tungstenite::connect(url.as_str())?;
    trace!("handshake response: {:?}", resp.status());
    ws.enable_write_compression(false);
    Ok(ws)
}

/// JSON codec on top of a [`MessageSocket`].
pub struct ProtocolTransport<S: MessageSocket> {
    socket: S,
}

impl<S: MessageSocket> ProtocolTransport<S> {
    pub fn new(socket: S) -> Self {
        Self { socket }
    }

    pub fn write_request<Q: Serialize + ?Sized>(&mut self, req: &Q) -> Result<(), TransportError> {
        let text = serde_json::to_string(req).map_err(TransportError::Serialize)?;
        trace!("-> {text}");
        self.socket.write_text(text)
    }

    pub fn read_response<T: DeserializeOwned>(&mut self) -> Result<T, TransportError> {
        let text = self.socket.read_text()?;
        trace!("<- {text}");
        serde_json::from_str(&text).map_err(TransportError::Deserialize)
    }

    /// Reads one message without decoding it.
    pub fn skip_response(&mut self) -> Result<(), TransportError> {
        let text = self.socket.read_text()?;
        trace!("<- (discarded) {text}");
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), TransportError> {
        self.socket.close()
    }

    pub fn socket_mut(&mut self) -> &mut S {
        &mut self.socket
    }
}
