//! The request handler (C3): reads requests off a connection one at a time,
//! dispatches each against a [`RegisterStore`], and writes back a response.
//!
//! A failure raised by the store before a response is written is converted
//! into an `ERR` frame and the connection stays open; a failure writing the
//! response itself is fatal and closes the stream.

use sshclip_core::{Attributes, RegisterStore, ShutdownEvent};
use sshclip_proto::{OkBody, Op, ProtocolError, Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::error::HandlerError;

/// Name published on the shutdown/event bus when a peer sends `STOP`.
pub const STOP_REQUESTED: &str = "stop-requested";

/// Serve requests on `stream` until the peer disconnects or sends `STOP`.
///
/// # Errors
///
/// Returns [`HandlerError`] if a response cannot be written back to the
/// peer; the caller should treat this as the end of the connection.
pub async fn serve_connection<S, T>(
    mut stream: T,
    store: &S,
    events: &sshclip_core::EventBus,
) -> Result<(), HandlerError>
where
    S: RegisterStore,
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    loop {
        let request = match Request::read(&mut stream).await {
            Ok(request) => request,
            Err(ProtocolError::ShortRead { expected: 1, actual: 0 }) => {
                debug!("peer closed the connection");
                return Ok(());
            }
            Err(ProtocolError::UnknownOp(byte)) if byte == Op::Err.to_u8() => {
                debug!("peer sent an ERR frame as a request; ignoring");
                continue;
            }
            Err(ProtocolError::UnknownOp(byte)) => {
                warn!(op = format!("{byte:#04x}"), "rejecting unrecognized op");
                Response::Err("unknown op".to_owned()).write(&mut stream).await?;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let (response, stop_after) = dispatch(store, request).await;
        response.write(&mut stream).await?;

        if stop_after {
            events.publish(&ShutdownEvent::Custom(STOP_REQUESTED.into()));
            return Ok(());
        }
    }
}

async fn dispatch<S: RegisterStore>(store: &S, request: Request) -> (Response, bool) {
    match request {
        Request::Get { reg } => {
            let response = match store.get_notify(reg).await {
                Ok(item) => Response::Ok(OkBody::Get { attrs: item.attrs.bits(), payload: item.payload }),
                Err(err) => Response::Err(err.to_string()),
            };
            (response, false)
        }
        Request::Put { reg, attrs, payload } => {
            let attrs = Attributes::from_bits_truncate(attrs);
            let response = match store.put_notify(reg, attrs, payload).await {
                Ok(()) => Response::Ok(OkBody::Empty),
                Err(err) => Response::Err(err.to_string()),
            };
            (response, false)
        }
        Request::List => {
            let records = store.list().await;
            (Response::Ok(OkBody::List(records)), false)
        }
        Request::Stop => (Response::Ok(OkBody::Empty), true),
    }
}
